use super::device::{MediaDevice, MediaStream, StreamState};
use crate::config::{CameraConfig, StreamConstraints};
use crate::error::CameraError;
use crate::frame::{FrameProcessor, ImageData};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Outcome of a background acquisition issued by `request_start` or `request_retry`
pub struct CameraAcquisition {
    pub attempt_id: u64,
    pub result: Result<Box<dyn MediaStream>, CameraError>,
}

impl fmt::Debug for CameraAcquisition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match &self.result {
            Ok(stream) => format!("Ok({})", stream.label()),
            Err(e) => format!("Err({})", e),
        };
        f.debug_struct("CameraAcquisition")
            .field("attempt_id", &self.attempt_id)
            .field("result", &result)
            .finish()
    }
}

struct PendingStart {
    attempt_id: u64,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Camera acquisition engine. Holds at most one open stream and releases it
/// on every exit path: explicit `stop`, retry, failure during start, and drop.
pub struct CameraEngine {
    config: CameraConfig,
    device: Arc<dyn MediaDevice>,
    stream: Option<Box<dyn MediaStream>>,
    is_active: bool,
    last_error: Option<CameraError>,
    pending: Option<PendingStart>,
    next_attempt: u64,
}

impl CameraEngine {
    pub fn new(config: CameraConfig, device: Arc<dyn MediaDevice>) -> Self {
        Self {
            config,
            device,
            stream: None,
            is_active: false,
            last_error: None,
            pending: None,
            next_attempt: 0,
        }
    }

    /// Acquire a stream, walking the constraint ladder from best to most permissive
    pub async fn start(&mut self) -> Result<(), CameraError> {
        if self.is_active {
            debug!("Camera stream already active");
            return Ok(());
        }

        // Never hold two streams at once
        self.stop();

        match acquire(&self.config, self.device.as_ref()).await {
            Ok(stream) => {
                self.attach(stream);
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Start acquisition in the background. `report` receives the outcome
    /// unless the request is cancelled first by `stop` or a newer request.
    pub fn request_start<F>(&mut self, report: F) -> u64
    where
        F: FnOnce(CameraAcquisition) + Send + 'static,
    {
        self.spawn_acquisition(Duration::ZERO, report)
    }

    /// Background `retry`: release, wait for the device to settle, start again
    pub fn request_retry<F>(&mut self, report: F) -> u64
    where
        F: FnOnce(CameraAcquisition) + Send + 'static,
    {
        info!("Retrying camera acquisition");
        self.spawn_acquisition(self.config.settle_delay(), report)
    }

    fn spawn_acquisition<F>(&mut self, settle: Duration, report: F) -> u64
    where
        F: FnOnce(CameraAcquisition) + Send + 'static,
    {
        self.stop();
        self.next_attempt += 1;
        let attempt_id = self.next_attempt;

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let config = self.config.clone();
        let device = Arc::clone(&self.device);

        let handle = tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancelled.cancelled() => {
                    debug!("Camera request {} cancelled", attempt_id);
                    return;
                }
                result = async {
                    if !settle.is_zero() {
                        sleep(settle).await;
                    }
                    acquire(&config, device.as_ref()).await
                } => result,
            };

            report(CameraAcquisition { attempt_id, result });
        });

        debug!("Camera request {} issued", attempt_id);
        self.pending = Some(PendingStart {
            attempt_id,
            token,
            handle,
        });
        attempt_id
    }

    /// Apply a finished background acquisition. Streams from cancelled or
    /// superseded requests are released and `None` is returned.
    pub fn complete(&mut self, acquisition: CameraAcquisition) -> Option<Result<(), CameraError>> {
        let current = self.pending.as_ref().map(|pending| pending.attempt_id);
        if current != Some(acquisition.attempt_id) {
            if let Ok(mut stream) = acquisition.result {
                stream.stop();
                debug!(
                    "Released stream {} from stale camera request {}",
                    stream.label(),
                    acquisition.attempt_id
                );
            }
            return None;
        }

        self.pending = None;
        Some(match acquisition.result {
            Ok(stream) => {
                self.attach(stream);
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        })
    }

    fn attach(&mut self, stream: Box<dyn MediaStream>) {
        info!("Camera stream {} attached", stream.label());
        self.stream = Some(stream);
        self.is_active = true;
        self.last_error = None;
    }

    fn fail(&mut self, err: CameraError) -> CameraError {
        error!("Camera start failed: {}", err);
        self.stop();
        self.last_error = Some(err.clone());
        err
    }

    /// Sample the current live frame into a JPEG still
    pub fn capture(&self) -> Result<ImageData, CameraError> {
        let stream = match (&self.stream, self.is_active) {
            (Some(stream), true) => stream,
            _ => return Err(not_ready("camera is not active")),
        };

        if stream.state() != StreamState::Live {
            return Err(not_ready("stream is paused or ended"));
        }

        let (width, height) = stream.dimensions();
        if width == 0 || height == 0 {
            return Err(not_ready("stream reports no frame dimensions"));
        }

        let frame = stream
            .latest_frame()
            .ok_or_else(|| not_ready("no frame received yet"))?;
        if frame.width == 0 || frame.height == 0 || frame.data.is_empty() {
            return Err(not_ready("latest frame is empty"));
        }

        let jpeg =
            FrameProcessor::encode_jpeg(&frame, self.config.jpeg_quality).map_err(not_ready)?;

        if jpeg.len() < self.config.min_still_bytes {
            warn!(
                "Discarding implausibly small still ({} bytes < {})",
                jpeg.len(),
                self.config.min_still_bytes
            );
            return Err(not_ready("captured image is implausibly small"));
        }

        debug!(
            "Captured still from frame {} ({}x{}, {} bytes)",
            frame.id,
            frame.width,
            frame.height,
            jpeg.len()
        );

        Ok(ImageData::from_bytes("image/jpeg", &jpeg))
    }

    /// Stop every track, detach the stream and cancel a pending request.
    /// Safe to call any number of times.
    pub fn stop(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.token.cancel();
            pending.handle.abort();
            debug!("Pending camera request {} cancelled", pending.attempt_id);
        }
        if let Some(mut stream) = self.stream.take() {
            let label = stream.label();
            stream.stop();
            info!("Camera stream {} released", label);
        }
        self.is_active = false;
    }

    /// `stop`, then wait until a cancelled request has let go of its stream
    pub async fn shutdown(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.token.cancel();
            pending.handle.abort();
            let _ = pending.handle.await;
            debug!("Pending camera request {} drained", pending.attempt_id);
        }
        self.stop();
    }

    /// A background acquisition is in flight
    pub fn is_starting(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn last_error(&self) -> Option<&CameraError> {
        self.last_error.as_ref()
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.stream.as_ref().map(|stream| stream.dimensions())
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }
}

impl Drop for CameraEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn not_ready<S: Into<String>>(reason: S) -> CameraError {
    CameraError::CaptureNotReady {
        reason: reason.into(),
    }
}

/// Walk the constraint ladder until a stream reports usable dimensions.
/// Nothing stays open when this returns an error.
async fn acquire(
    config: &CameraConfig,
    device: &dyn MediaDevice,
) -> Result<Box<dyn MediaStream>, CameraError> {
    info!(
        "Starting camera on {} ({} constraint sets)",
        device.name(),
        config.constraints.len()
    );

    let mut last_error = None;

    for constraints in &config.constraints {
        debug!("Requesting camera stream with {}", constraints.describe());

        match device.open(constraints).await {
            Ok(stream) => {
                let stream = await_ready(config, stream).await?;
                log_ready(stream.as_ref(), constraints);
                return Ok(stream);
            }
            Err(e) if e.allows_fallback() => {
                debug!(
                    "Camera rejected {}: {}; trying next constraint set",
                    constraints.describe(),
                    e
                );
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or_else(|| CameraError::DeviceNotFound {
        details: "no constraint set could be satisfied".to_string(),
    }))
}

fn log_ready(stream: &dyn MediaStream, constraints: &StreamConstraints) {
    let (width, height) = stream.dimensions();
    info!(
        "Camera stream ready: {} ({}x{}, requested {})",
        stream.label(),
        width,
        height,
        constraints.describe()
    );
}

/// Wait, bounded, until the stream reports usable dimensions. The stream
/// is stopped before returning a timeout.
async fn await_ready(
    config: &CameraConfig,
    mut stream: Box<dyn MediaStream>,
) -> Result<Box<dyn MediaStream>, CameraError> {
    let readiness_timeout = config.readiness_timeout();
    let poll = config.readiness_poll();

    let ready = timeout(readiness_timeout, async {
        loop {
            let (width, height) = stream.dimensions();
            if width > 0 && height > 0 && stream.state() == StreamState::Live {
                return;
            }
            sleep(poll).await;
        }
    })
    .await;

    match ready {
        Ok(()) => Ok(stream),
        Err(_) => {
            warn!(
                "Camera stream {} did not become ready within {:?}",
                stream.label(),
                readiness_timeout
            );
            stream.stop();
            Err(CameraError::InitializationTimeout {
                timeout: readiness_timeout,
            })
        }
    }
}
