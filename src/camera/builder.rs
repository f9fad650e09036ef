use super::device::MediaDevice;
use super::engine::CameraEngine;
use super::mock::MockMediaDevice;
use crate::config::{CameraBackend, CameraConfig};
use crate::error::{KioskError, Result};
use std::sync::Arc;

/// Builder for the camera acquisition engine
pub struct CameraEngineBuilder {
    config: Option<CameraConfig>,
    device: Option<Arc<dyn MediaDevice>>,
}

impl CameraEngineBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            device: None,
        }
    }

    pub fn config(mut self, config: CameraConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use this device instead of the one selected by the configured backend
    pub fn device(mut self, device: Arc<dyn MediaDevice>) -> Self {
        self.device = Some(device);
        self
    }

    pub fn build(self) -> Result<CameraEngine> {
        let config = self
            .config
            .ok_or_else(|| KioskError::system("Camera configuration must be specified"))?;

        let device = match self.device {
            Some(device) => device,
            None => create_device(&config)?,
        };

        Ok(CameraEngine::new(config, device))
    }
}

impl Default for CameraEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Instantiate the media device for the configured backend
pub fn create_device(config: &CameraConfig) -> Result<Arc<dyn MediaDevice>> {
    match config.backend {
        CameraBackend::Mock => Ok(Arc::new(MockMediaDevice::new())),
        #[cfg(all(feature = "camera", target_os = "linux"))]
        CameraBackend::Gstreamer => Ok(Arc::new(super::gst::GstMediaDevice::new(config.index)?)),
        #[cfg(not(all(feature = "camera", target_os = "linux")))]
        CameraBackend::Gstreamer => Err(KioskError::system(
            "GStreamer camera backend requires the `camera` feature on Linux",
        )),
    }
}
