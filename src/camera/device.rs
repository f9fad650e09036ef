use crate::config::StreamConstraints;
use crate::error::CameraError;
use crate::frame::FrameData;
use async_trait::async_trait;

/// Playback state reported by an open stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Live,
    Paused,
    Ended,
}

/// One open video stream. Owned exclusively by the camera engine.
/// Dropping a stream must release it like `stop` does.
pub trait MediaStream: Send + Sync {
    /// Human-readable label for logs
    fn label(&self) -> String;

    /// Frame dimensions; `(0, 0)` until the first real frame arrives
    fn dimensions(&self) -> (u32, u32);

    fn state(&self) -> StreamState;

    /// Most recent live frame, if any has arrived
    fn latest_frame(&self) -> Option<FrameData>;

    /// Stop every underlying track. Must be idempotent.
    fn stop(&mut self);
}

/// Host video device able to open streams under a set of constraints
#[async_trait]
pub trait MediaDevice: Send + Sync {
    fn name(&self) -> String;

    async fn open(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn MediaStream>, CameraError>;
}
