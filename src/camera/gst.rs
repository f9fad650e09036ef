use super::device::{MediaDevice, MediaStream, StreamState};
use crate::config::StreamConstraints;
use crate::error::CameraError;
use crate::frame::{FrameData, FrameFormat};
use async_trait::async_trait;
use gstreamer::prelude::*;
use gstreamer::{MessageType, MessageView, Pipeline};
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use parking_lot::Mutex;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, error, info, trace, warn};

/// Seconds to wait for the pipeline to preroll before declaring the
/// constraint set unsupported
const PREROLL_TIMEOUT_SECS: u64 = 3;

/// V4L2 camera opened through a GStreamer pipeline ending in an appsink
pub struct GstMediaDevice {
    index: u32,
}

impl GstMediaDevice {
    pub fn new(index: u32) -> Result<Self, CameraError> {
        gstreamer::init().map_err(|e| CameraError::DeviceUnsupported {
            details: format!("Failed to initialize GStreamer: {}", e),
        })?;
        Ok(Self { index })
    }

    fn device_path(&self) -> String {
        format!("/dev/video{}", self.index)
    }

    /// Map access problems on the device node to the camera error taxonomy
    fn probe_device(&self) -> Result<(), CameraError> {
        let path = self.device_path();
        match std::fs::OpenOptions::new().read(true).open(&path) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                Err(CameraError::PermissionDenied {
                    details: format!("{}: {}", path, e),
                })
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(CameraError::DeviceNotFound {
                details: path,
            }),
            Err(e) => Err(CameraError::DeviceUnsupported {
                details: format!("{}: {}", path, e),
            }),
        }
    }

    fn build_pipeline_string(&self, constraints: &StreamConstraints) -> String {
        let mut caps = "video/x-raw,format=RGB".to_string();
        if let Some((width, height)) = constraints.resolution {
            caps.push_str(&format!(",width={},height={}", width, height));
        }
        if let Some(fps) = constraints.fps {
            caps.push_str(&format!(",framerate={}/1", fps));
        }

        format!(
            "v4l2src device={} io-mode=mmap ! videoconvert ! {} ! \
             appsink name=sink sync=false max-buffers=1 drop=true emit-signals=false",
            self.device_path(),
            caps
        )
    }
}

#[async_trait]
impl MediaDevice for GstMediaDevice {
    fn name(&self) -> String {
        self.device_path()
    }

    async fn open(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn MediaStream>, CameraError> {
        self.probe_device()?;

        let pipeline_desc = self.build_pipeline_string(constraints);
        info!("Creating GStreamer pipeline: {}", pipeline_desc);

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| CameraError::DeviceUnsupported {
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<Pipeline>()
            .map_err(|_| CameraError::DeviceUnsupported {
                details: "Failed to downcast to Pipeline".to_string(),
            })?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| CameraError::DeviceUnsupported {
                details: "Pipeline has no appsink".to_string(),
            })?
            .downcast::<AppSink>()
            .map_err(|_| CameraError::DeviceUnsupported {
                details: "Failed to downcast to AppSink".to_string(),
            })?;

        let latest: Arc<Mutex<Option<FrameData>>> = Arc::new(Mutex::new(None));
        let frame_counter = Arc::new(AtomicU64::new(0));

        {
            let latest = Arc::clone(&latest);
            let frame_counter = Arc::clone(&frame_counter);
            appsink.set_callbacks(
                gstreamer_app::AppSinkCallbacks::builder()
                    .new_sample(move |appsink| {
                        let sample = appsink
                            .pull_sample()
                            .map_err(|_| gstreamer::FlowError::Eos)?;
                        match sample_to_frame(&sample, &frame_counter) {
                            Ok(frame) => *latest.lock() = Some(frame),
                            Err(e) => warn!("Dropping camera sample: {}", e),
                        }
                        Ok(gstreamer::FlowSuccess::Ok)
                    })
                    .build(),
            );
        }

        if let Err(e) = pipeline.set_state(gstreamer::State::Playing) {
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(CameraError::DeviceUnsupported {
                details: format!("Failed to start pipeline: {}", e),
            });
        }

        // Caps negotiation failures surface on the bus, not from set_state
        if let Some(bus) = pipeline.bus() {
            let message = tokio::task::spawn_blocking(move || {
                bus.timed_pop_filtered(
                    gstreamer::ClockTime::from_seconds(PREROLL_TIMEOUT_SECS),
                    &[MessageType::AsyncDone, MessageType::Error],
                )
            })
            .await
            .ok()
            .flatten();

            if let Some(message) = message {
                if let MessageView::Error(err) = message.view() {
                    let _ = pipeline.set_state(gstreamer::State::Null);
                    return Err(CameraError::DeviceUnsupported {
                        details: format!(
                            "{} rejected {}: {}",
                            self.device_path(),
                            constraints.describe(),
                            err.error()
                        ),
                    });
                }
            }
        }

        debug!("GStreamer pipeline playing for {}", constraints.describe());

        Ok(Box::new(GstStream {
            label: format!("{} ({})", self.device_path(), constraints.describe()),
            pipeline,
            latest,
            stopped: false,
        }))
    }
}

struct GstStream {
    label: String,
    pipeline: Pipeline,
    latest: Arc<Mutex<Option<FrameData>>>,
    stopped: bool,
}

impl MediaStream for GstStream {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn dimensions(&self) -> (u32, u32) {
        if self.stopped {
            return (0, 0);
        }
        self.latest
            .lock()
            .as_ref()
            .map(|frame| (frame.width, frame.height))
            .unwrap_or((0, 0))
    }

    fn state(&self) -> StreamState {
        if self.stopped {
            return StreamState::Ended;
        }
        match self.pipeline.current_state() {
            gstreamer::State::Playing => StreamState::Live,
            gstreamer::State::Paused => StreamState::Paused,
            _ => StreamState::Ended,
        }
    }

    fn latest_frame(&self) -> Option<FrameData> {
        if self.stopped {
            return None;
        }
        self.latest.lock().clone()
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            error!("Failed to stop GStreamer pipeline {}: {}", self.label, e);
        }
        self.latest.lock().take();
        debug!("GStreamer pipeline {} stopped", self.label);
    }
}

impl Drop for GstStream {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Copy a sample into a tightly packed RGB frame
fn sample_to_frame(
    sample: &gstreamer::Sample,
    frame_counter: &AtomicU64,
) -> Result<FrameData, String> {
    let buffer = sample.buffer().ok_or("No buffer in sample")?;
    let caps = sample.caps().ok_or("No caps in sample")?;
    let video_info =
        VideoInfo::from_caps(caps).map_err(|e| format!("Failed to get video info: {}", e))?;

    let width = video_info.width();
    let height = video_info.height();
    let stride = video_info.stride()[0] as usize;
    let row_bytes = width as usize * 3;

    let map = buffer
        .map_readable()
        .map_err(|e| format!("Failed to map buffer: {}", e))?;
    let src = map.as_slice();

    let data = if stride == row_bytes {
        src.to_vec()
    } else {
        let mut packed = Vec::with_capacity(row_bytes * height as usize);
        for row in src.chunks(stride).take(height as usize) {
            packed.extend_from_slice(&row[..row_bytes.min(row.len())]);
        }
        packed
    };

    let frame_id = frame_counter.fetch_add(1, Ordering::Relaxed);
    trace!(
        "Captured RGB frame {} ({}x{}, {} bytes)",
        frame_id,
        width,
        height,
        data.len()
    );

    Ok(FrameData::new(
        frame_id,
        SystemTime::now(),
        data,
        width,
        height,
        FrameFormat::Rgb24,
    ))
}
