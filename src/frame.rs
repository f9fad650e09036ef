use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::ColorType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

/// Frame format enumeration supporting the formats camera backends deliver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    /// Motion JPEG format - compressed JPEG frames
    Mjpeg,
    /// RGB24 format - uncompressed RGB data
    Rgb24,
}

impl FrameFormat {
    /// Get bytes per pixel for the format
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            FrameFormat::Mjpeg => 0, // Variable size, compressed
            FrameFormat::Rgb24 => 3,
        }
    }

    /// Check if format is compressed
    pub fn is_compressed(&self) -> bool {
        matches!(self, FrameFormat::Mjpeg)
    }
}

/// Frame data structure containing raw frame data and metadata
#[derive(Debug, Clone)]
pub struct FrameData {
    /// Unique frame identifier
    pub id: u64,
    /// Timestamp when frame was captured
    pub timestamp: SystemTime,
    /// Raw frame data (shared ownership for efficiency)
    pub data: Arc<Vec<u8>>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frame format
    pub format: FrameFormat,
}

impl FrameData {
    /// Create a new frame data instance
    pub fn new(
        id: u64,
        timestamp: SystemTime,
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: FrameFormat,
    ) -> Self {
        Self {
            id,
            timestamp,
            data: Arc::new(data),
            width,
            height,
            format,
        }
    }

    /// Get the expected frame size for uncompressed formats
    pub fn expected_size(&self) -> Option<usize> {
        if self.format.is_compressed() {
            None
        } else {
            Some(self.width as usize * self.height as usize * self.format.bytes_per_pixel())
        }
    }

    /// Validate frame data size against expected size
    pub fn validate_size(&self) -> bool {
        match self.expected_size() {
            Some(expected) => self.data.len() == expected,
            None => true,
        }
    }
}

/// Frame processing utilities
pub struct FrameProcessor;

impl FrameProcessor {
    /// Encode a frame as a JPEG still. MJPEG frames are passed through untouched.
    pub fn encode_jpeg(frame: &FrameData, quality: u8) -> Result<Vec<u8>, String> {
        match frame.format {
            FrameFormat::Mjpeg => Ok(frame.data.as_ref().clone()),
            FrameFormat::Rgb24 => {
                if !frame.validate_size() {
                    return Err(format!(
                        "RGB frame {} has {} bytes, expected {:?}",
                        frame.id,
                        frame.data.len(),
                        frame.expected_size()
                    ));
                }

                let mut buf = Vec::new();
                let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
                encoder
                    .encode(&frame.data, frame.width, frame.height, ColorType::Rgb8)
                    .map_err(|e| format!("JPEG encoding failed: {}", e))?;
                Ok(buf)
            }
        }
    }
}

/// An image carried as a `data:` URL, the form the generation service and
/// messaging gateway exchange. The string is kept exactly as produced.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageData(String);

impl ImageData {
    /// Wrap encoded image bytes in a base64 data URL
    pub fn from_bytes(mime_type: &str, bytes: &[u8]) -> Self {
        Self(format!(
            "data:{};base64,{}",
            mime_type,
            BASE64_STANDARD.encode(bytes)
        ))
    }

    /// Accept a string only if it looks like a data URL with a payload
    pub fn from_data_url<S: Into<String>>(value: S) -> Option<Self> {
        let value = value.into();
        let (header, payload) = value.split_once(',')?;
        if !header.starts_with("data:") || payload.is_empty() {
            return None;
        }
        Some(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Length of the data URL in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// MIME type declared in the data URL header
    pub fn mime_type(&self) -> Option<&str> {
        let header = self.0.split_once(',')?.0.strip_prefix("data:")?;
        let mime = header.split(';').next()?;
        if mime.is_empty() {
            None
        } else {
            Some(mime)
        }
    }

    /// File extension matching the MIME type
    pub fn extension(&self) -> &'static str {
        match self.mime_type() {
            Some("image/png") => "png",
            Some("image/webp") => "webp",
            Some("image/gif") => "gif",
            _ => "jpg",
        }
    }

    /// Decode the payload into raw image bytes
    pub fn decode(&self) -> Result<Vec<u8>, String> {
        let (header, payload) = self
            .0
            .split_once(',')
            .ok_or_else(|| "data URL has no payload".to_string())?;
        if !header.ends_with(";base64") {
            return Err("only base64 data URLs can be decoded".to_string());
        }
        BASE64_STANDARD
            .decode(payload)
            .map_err(|e| format!("invalid base64 payload: {}", e))
    }
}

impl fmt::Debug for ImageData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Data URLs run to megabytes; show only the header
        let header = self.0.split(',').next().unwrap_or_default();
        write!(f, "ImageData({}, {} bytes)", header, self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_format_properties() {
        assert_eq!(FrameFormat::Mjpeg.bytes_per_pixel(), 0);
        assert_eq!(FrameFormat::Rgb24.bytes_per_pixel(), 3);
        assert!(FrameFormat::Mjpeg.is_compressed());
        assert!(!FrameFormat::Rgb24.is_compressed());
    }

    #[test]
    fn test_frame_size_validation() {
        let valid = FrameData::new(1, SystemTime::now(), vec![0u8; 4 * 4 * 3], 4, 4, FrameFormat::Rgb24);
        assert!(valid.validate_size());

        let invalid = FrameData::new(2, SystemTime::now(), vec![0u8; 10], 4, 4, FrameFormat::Rgb24);
        assert!(!invalid.validate_size());
        assert!(FrameProcessor::encode_jpeg(&invalid, 90).is_err());

        let mjpeg = FrameData::new(3, SystemTime::now(), vec![0u8; 5000], 640, 480, FrameFormat::Mjpeg);
        assert!(mjpeg.validate_size());
    }

    #[test]
    fn test_encode_rgb_frame() {
        let frame = FrameData::new(
            1,
            SystemTime::now(),
            vec![128u8; 64 * 48 * 3],
            64,
            48,
            FrameFormat::Rgb24,
        );
        let jpeg = FrameProcessor::encode_jpeg(&frame, 90).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_mjpeg_passthrough() {
        let bytes = vec![0xFF, 0xD8, 1, 2, 3, 0xFF, 0xD9];
        let frame = FrameData::new(1, SystemTime::now(), bytes.clone(), 2, 2, FrameFormat::Mjpeg);
        assert_eq!(FrameProcessor::encode_jpeg(&frame, 90).unwrap(), bytes);
    }

    #[test]
    fn test_image_data_from_bytes() {
        let image = ImageData::from_bytes("image/jpeg", &[1, 2, 3, 4]);
        assert!(image.as_str().starts_with("data:image/jpeg;base64,"));
        assert_eq!(image.mime_type(), Some("image/jpeg"));
        assert_eq!(image.extension(), "jpg");
        assert_eq!(image.decode().unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_image_data_parsing() {
        let image = ImageData::from_data_url("data:image/png;base64,AAA").unwrap();
        assert_eq!(image.as_str(), "data:image/png;base64,AAA");
        assert_eq!(image.extension(), "png");

        assert!(ImageData::from_data_url("https://example.com/a.png").is_none());
        assert!(ImageData::from_data_url("data:image/png;base64,").is_none());
        assert!(ImageData::from_data_url("").is_none());
    }

    #[test]
    fn test_image_data_debug_is_short() {
        let image = ImageData::from_bytes("image/jpeg", &vec![7u8; 10_000]);
        let debug = format!("{:?}", image);
        assert!(debug.starts_with("ImageData(data:image/jpeg;base64"));
        assert!(debug.len() < 80);
    }
}
