use super::device::{MediaDevice, MediaStream, StreamState};
use crate::config::StreamConstraints;
use crate::error::CameraError;
use crate::frame::{FrameData, FrameFormat};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, trace};

#[derive(Debug, Clone)]
struct MockBehavior {
    open_error: Option<CameraError>,
    max_resolution: Option<(u32, u32)>,
    default_resolution: (u32, u32),
    /// `None` means the stream never reports dimensions
    ready_after: Option<Duration>,
    frame_bytes: usize,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            open_error: None,
            max_resolution: None,
            default_resolution: (1280, 720),
            ready_after: Some(Duration::ZERO),
            frame_bytes: 4096,
        }
    }
}

#[derive(Default)]
struct MockShared {
    behavior: Mutex<MockBehavior>,
    paused: AtomicBool,
    dimensions_lost: AtomicBool,
    open_calls: AtomicUsize,
    live_streams: AtomicUsize,
    track_stops: AtomicUsize,
    frame_counter: AtomicU64,
}

/// Synthetic camera producing MJPEG-like frames. Clones share state so a
/// test can keep a handle while the engine owns another.
#[derive(Clone, Default)]
pub struct MockMediaDevice {
    shared: Arc<MockShared>,
}

impl MockMediaDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every open fails with this error
    pub fn with_open_error(self, error: CameraError) -> Self {
        self.set_open_error(Some(error));
        self
    }

    /// Requests above this resolution fail with `DeviceUnsupported`
    pub fn with_max_resolution(self, width: u32, height: u32) -> Self {
        {
            let mut behavior = self.shared.behavior.lock();
            behavior.max_resolution = Some((width, height));
            behavior.default_resolution = (width, height);
        }
        self
    }

    /// Streams report zero dimensions until this much time has passed
    pub fn with_ready_delay(self, delay: Duration) -> Self {
        self.shared.behavior.lock().ready_after = Some(delay);
        self
    }

    /// Streams never report usable dimensions
    pub fn never_ready(self) -> Self {
        self.shared.behavior.lock().ready_after = None;
        self
    }

    /// Payload size of each synthetic frame
    pub fn with_frame_bytes(self, bytes: usize) -> Self {
        self.set_frame_bytes(bytes);
        self
    }

    pub fn set_open_error(&self, error: Option<CameraError>) {
        self.shared.behavior.lock().open_error = error;
    }

    pub fn set_frame_bytes(&self, bytes: usize) {
        self.shared.behavior.lock().frame_bytes = bytes;
    }

    pub fn set_paused(&self, paused: bool) {
        self.shared.paused.store(paused, Ordering::SeqCst);
    }

    /// Live streams report `(0, 0)` as if the source lost its format
    pub fn set_dimensions_lost(&self, lost: bool) {
        self.shared.dimensions_lost.store(lost, Ordering::SeqCst);
    }

    /// Number of open requests received
    pub fn open_count(&self) -> usize {
        self.shared.open_calls.load(Ordering::SeqCst)
    }

    /// Streams opened and not yet stopped
    pub fn live_streams(&self) -> usize {
        self.shared.live_streams.load(Ordering::SeqCst)
    }

    /// Total number of stream stops performed
    pub fn stop_count(&self) -> usize {
        self.shared.track_stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaDevice for MockMediaDevice {
    fn name(&self) -> String {
        "mock camera".to_string()
    }

    async fn open(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn MediaStream>, CameraError> {
        self.shared.open_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.shared.behavior.lock().clone();

        if let Some(error) = behavior.open_error {
            return Err(error);
        }

        let resolution = match (constraints.resolution, behavior.max_resolution) {
            (Some((w, h)), Some((max_w, max_h))) if w > max_w || h > max_h => {
                return Err(CameraError::DeviceUnsupported {
                    details: format!("mock camera tops out at {}x{}", max_w, max_h),
                });
            }
            (Some(requested), _) => requested,
            (None, _) => behavior.default_resolution,
        };

        debug!(
            "Mock camera opened at {}x{}",
            resolution.0, resolution.1
        );
        self.shared.live_streams.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MockStream {
            shared: Arc::clone(&self.shared),
            resolution,
            opened_at: Instant::now(),
            ready_after: behavior.ready_after,
            frame_bytes: behavior.frame_bytes,
            stopped: false,
        }))
    }
}

struct MockStream {
    shared: Arc<MockShared>,
    resolution: (u32, u32),
    opened_at: Instant,
    ready_after: Option<Duration>,
    frame_bytes: usize,
    stopped: bool,
}

impl MockStream {
    fn is_ready(&self) -> bool {
        !self.stopped
            && self
                .ready_after
                .map(|delay| self.opened_at.elapsed() >= delay)
                .unwrap_or(false)
    }
}

impl MediaStream for MockStream {
    fn label(&self) -> String {
        format!("mock {}x{}", self.resolution.0, self.resolution.1)
    }

    fn dimensions(&self) -> (u32, u32) {
        if self.is_ready() && !self.shared.dimensions_lost.load(Ordering::SeqCst) {
            self.resolution
        } else {
            (0, 0)
        }
    }

    fn state(&self) -> StreamState {
        if self.stopped {
            StreamState::Ended
        } else if self.shared.paused.load(Ordering::SeqCst) {
            StreamState::Paused
        } else {
            StreamState::Live
        }
    }

    fn latest_frame(&self) -> Option<FrameData> {
        if !self.is_ready() {
            return None;
        }

        let frame_id = self.shared.frame_counter.fetch_add(1, Ordering::Relaxed);

        // JPEG SOI + JFIF header, a patterned body, then EOI
        let mut data = vec![
            0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0x00, 0x01, 0x01, 0x01,
            0x00, 0x48, 0x00, 0x48, 0x00, 0x00,
        ];
        data.extend(vec![(frame_id % 256) as u8; self.frame_bytes]);
        data.extend_from_slice(&[0xFF, 0xD9]);

        trace!("Generated mock frame {} ({} bytes)", frame_id, data.len());

        Some(FrameData::new(
            frame_id,
            SystemTime::now(),
            data,
            self.resolution.0,
            self.resolution.1,
            FrameFormat::Mjpeg,
        ))
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.shared.live_streams.fetch_sub(1, Ordering::SeqCst);
        self.shared.track_stops.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        self.stop();
    }
}
