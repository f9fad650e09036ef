mod builder;
mod device;
mod engine;
#[cfg(all(feature = "camera", target_os = "linux"))]
mod gst;
mod mock;

pub use builder::{create_device, CameraEngineBuilder};
pub use device::{MediaDevice, MediaStream, StreamState};
pub use engine::{CameraAcquisition, CameraEngine};
#[cfg(all(feature = "camera", target_os = "linux"))]
pub use gst::GstMediaDevice;
pub use mock::MockMediaDevice;
