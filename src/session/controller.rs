use super::state::{summary_line, Session, SessionView, Step};
use crate::artifacts::{ArtifactStore, ArtifactWriter, DeliveryRecord, SessionOutcome, SessionRecord};
use crate::camera::{CameraAcquisition, CameraEngine};
use crate::catalog::{AppearanceSource, StyleCatalog};
use crate::config::SessionMode;
use crate::countdown::{Countdown, CountdownEvent};
use crate::delivery::{DeliveryDispatcher, DeliveryReport};
use crate::error::{CameraError, DeliveryError, GenerationError};
use crate::events::{EventBus, KioskEvent};
use crate::generation::{GenerationAttempt, GenerationOrchestrator, GenerationOutcome};
use chrono::Utc;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// User intents fed to the controller. Commands whose guard does not hold
/// are ignored.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    SelectStyle(String),
    ConfirmStyle,
    Capture,
    /// Discard the photo and return to the live camera
    Retake,
    ConfirmPhoto,
    RetryGeneration,
    RetryCamera,
    Print,
    SendMessage {
        destination: String,
        caption: Option<String>,
    },
    /// Discard the session and start over at the style screen
    Reset,
    /// Show a screen without running it (preview mode only)
    Preview(Step),
    Shutdown,
}

/// Completions of spawned work, routed back into the control loop
#[derive(Debug)]
pub(crate) enum SessionSignal {
    Camera {
        session_id: Uuid,
        acquisition: CameraAcquisition,
    },
    Generation(GenerationAttempt),
    Delivery(DeliveryReport),
}

/// Everything the controller needs besides configuration values
pub struct SessionParts {
    pub camera: CameraEngine,
    pub generation: GenerationOrchestrator,
    pub delivery: DeliveryDispatcher,
    pub styles: Arc<dyn StyleCatalog>,
    pub appearance: Arc<dyn AppearanceSource>,
    pub events: EventBus,
    pub artifacts: Option<ArtifactStore>,
}

/// Owns the session and its engines, and serializes every state change.
///
/// Commands, countdown events and completions of spawned requests are all
/// applied on one task, so ordering follows session state rather than
/// completion time.
pub struct SessionController {
    mode: SessionMode,
    countdown_seconds: u32,
    session: Session,
    camera: CameraEngine,
    countdown: Countdown,
    generation: GenerationOrchestrator,
    delivery: DeliveryDispatcher,
    styles: Arc<dyn StyleCatalog>,
    appearance: Arc<dyn AppearanceSource>,
    events: EventBus,
    artifacts: Option<ArtifactWriter>,
    deliveries: Vec<DeliveryRecord>,
    delivery_error: Option<DeliveryError>,
    last_message_id: Option<String>,
    signal_tx: mpsc::UnboundedSender<SessionSignal>,
    signal_rx: mpsc::UnboundedReceiver<SessionSignal>,
}

impl SessionController {
    pub fn new(
        mode: SessionMode,
        countdown: Countdown,
        countdown_seconds: u32,
        parts: SessionParts,
    ) -> Self {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();

        Self {
            mode,
            countdown_seconds,
            session: Session::new(),
            camera: parts.camera,
            countdown,
            generation: parts.generation,
            delivery: parts.delivery,
            styles: parts.styles,
            appearance: parts.appearance,
            events: parts.events,
            artifacts: parts.artifacts.map(ArtifactWriter::new),
            deliveries: Vec::new(),
            delivery_error: None,
            last_message_id: None,
            signal_tx,
            signal_rx,
        }
    }

    /// Process commands until shutdown, then release everything
    pub async fn run(
        &mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        shutdown: CancellationToken,
    ) {
        info!(
            "Session controller running ({:?} mode, session {})",
            self.mode, self.session.id
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Session controller shutdown requested");
                    break;
                }
                command = commands.recv() => match command {
                    Some(command) => {
                        if !self.handle(command).await {
                            break;
                        }
                    }
                    None => {
                        debug!("Command channel closed");
                        break;
                    }
                },
                event = self.countdown.next_event() => self.on_countdown(event),
                Some(signal) = self.signal_rx.recv() => self.on_signal(signal),
            }
        }

        self.teardown().await;
    }

    /// Apply one command. Returns false when the controller should stop.
    pub async fn handle(&mut self, command: SessionCommand) -> bool {
        debug!("Command {:?} at step {}", command, self.session.step);

        if !self.mode.is_interactive() {
            match command {
                SessionCommand::Preview(step) => self.preview(step),
                SessionCommand::Shutdown => return false,
                other => debug!("Ignoring {:?} in preview mode", other),
            }
            return true;
        }

        match command {
            SessionCommand::SelectStyle(id) => self.select_style(id),
            SessionCommand::ConfirmStyle => self.confirm_style(),
            SessionCommand::Capture => self.capture(),
            SessionCommand::Retake => self.retake(),
            SessionCommand::ConfirmPhoto => self.confirm_photo(),
            SessionCommand::RetryGeneration => self.retry_generation(),
            SessionCommand::RetryCamera => self.retry_camera(),
            SessionCommand::Print => self.print(),
            SessionCommand::SendMessage {
                destination,
                caption,
            } => self.send_message(destination, caption),
            SessionCommand::Reset => self.reset(),
            SessionCommand::Preview(step) => {
                debug!("Ignoring preview of {} in kiosk mode", step)
            }
            SessionCommand::Shutdown => return false,
        }

        true
    }

    /// Wait for the next countdown event or request completion and apply it
    pub async fn process_next(&mut self) {
        tokio::select! {
            event = self.countdown.next_event() => self.on_countdown(event),
            Some(signal) = self.signal_rx.recv() => self.on_signal(signal),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn camera(&self) -> &CameraEngine {
        &self.camera
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn snapshot(&self) -> SessionView {
        let style_name = self
            .session
            .selected_style
            .as_deref()
            .and_then(|id| self.styles.find(id))
            .map(|style| style.display_name.clone());

        SessionView {
            session_id: self.session.id,
            mode: self.mode,
            step: self.session.step,
            style_id: self.session.selected_style.clone(),
            summary: summary_line(&self.session, style_name.as_deref()),
            style_name,
            countdown_value: self.session.countdown_value,
            has_photo: self.session.captured_photo.is_some(),
            has_avatar: self.session.generated_avatar.is_some(),
            is_generating: self.session.is_generating,
            is_sending_delivery: self.session.is_sending_delivery,
            camera_active: self.camera.is_active(),
            camera_starting: self.camera.is_starting(),
            camera_error: self.camera.last_error().map(CameraError::user_message),
            camera_retryable: self
                .camera
                .last_error()
                .map_or(false, CameraError::is_retryable),
            generation_error: self
                .session
                .generation_error
                .as_ref()
                .map(GenerationError::user_message),
            delivery_error: self.delivery_error.as_ref().map(DeliveryError::user_message),
            last_message_id: self.last_message_id.clone(),
            appearance: self.appearance.appearance(self.session.step.screen_key()),
        }
    }

    /// Cancel timers and requests, release the camera and flush pending
    /// session records
    pub async fn teardown(&mut self) {
        self.countdown.cancel();
        self.generation.cancel();
        self.delivery.cancel();
        self.camera.shutdown().await;
        self.session.is_generating = false;
        self.session.is_sending_delivery = false;
        if let Some(writer) = self.artifacts.as_mut() {
            writer.flush().await;
        }
        info!("Session controller stopped");
    }

    /// Move to `to`, releasing the camera when leaving a camera-bearing screen
    fn set_step(&mut self, to: Step) {
        let from = self.session.step;
        if from == to {
            return;
        }

        if from.is_camera_bearing() {
            self.camera.stop();
        }

        self.session.step = to;
        info!("Step {} -> {} (session {})", from, to, self.session.id);
        self.events.emit(KioskEvent::StepChanged {
            session_id: self.session.id.to_string(),
            from,
            to,
        });
    }

    /// Enter the camera screen and acquire the camera in the background
    fn enter_camera(&mut self) {
        self.set_step(Step::Camera);
        let report = self.camera_reporter();
        self.camera.request_start(report);
    }

    fn camera_reporter(&self) -> impl FnOnce(CameraAcquisition) + Send + 'static {
        let signals = self.signal_tx.clone();
        let session_id = self.session.id;
        move |acquisition| {
            let _ = signals.send(SessionSignal::Camera {
                session_id,
                acquisition,
            });
        }
    }

    pub(crate) fn apply_camera(&mut self, session_id: Uuid, acquisition: CameraAcquisition) {
        let attempt_id = acquisition.attempt_id;
        let Some(outcome) = self.camera.complete(acquisition) else {
            debug!("Discarding stale camera request {}", attempt_id);
            return;
        };

        if session_id != self.session.id || self.session.step != Step::Camera {
            debug!("Camera request {} finished after the camera screen was left", attempt_id);
            self.camera.stop();
            return;
        }

        self.events.emit(KioskEvent::CameraStatusChanged {
            active: self.camera.is_active(),
            error: outcome.err().map(|e| e.to_string()),
            timestamp: SystemTime::now(),
        });
    }

    fn select_style(&mut self, id: String) {
        if self.session.step != Step::Styles {
            debug!("Style selection ignored outside the style screen");
            return;
        }
        if self.styles.find(&id).is_none() {
            debug!("Unknown style '{}' ignored", id);
            return;
        }

        debug!("Style '{}' selected", id);
        self.session.selected_style = Some(id);
    }

    fn confirm_style(&mut self) {
        if self.session.step != Step::Styles || self.session.selected_style.is_none() {
            debug!("Style confirmation ignored: no style selected");
            return;
        }

        self.enter_camera();
    }

    fn capture(&mut self) {
        if self.session.step != Step::Camera {
            debug!("Capture ignored outside the camera screen");
            return;
        }

        match self.camera.capture() {
            Ok(photo) => {
                info!("Photo captured ({} bytes)", photo.len());
                self.session.captured_photo = Some(photo);
                self.set_step(Step::PhotoPreview);
            }
            Err(e) => {
                warn!("Capture failed: {}", e);
                self.events.emit(KioskEvent::CameraStatusChanged {
                    active: self.camera.is_active(),
                    error: Some(e.to_string()),
                    timestamp: SystemTime::now(),
                });
            }
        }
    }

    fn retake(&mut self) {
        match self.session.step {
            Step::PhotoPreview => {}
            Step::Countdown => {
                self.countdown.cancel();
                self.session.countdown_value = 0;
            }
            _ => {
                debug!("Retake ignored at step {}", self.session.step);
                return;
            }
        }

        info!("Retaking photo");
        self.session.captured_photo = None;
        self.enter_camera();
    }

    fn confirm_photo(&mut self) {
        if self.session.step != Step::PhotoPreview || self.session.captured_photo.is_none() {
            debug!("Photo confirmation ignored: no photo to confirm");
            return;
        }

        self.session.countdown_value = self.countdown_seconds;
        self.set_step(Step::Countdown);
        self.countdown.start(self.countdown_seconds);
    }

    fn on_countdown(&mut self, event: Option<CountdownEvent>) {
        if self.session.step != Step::Countdown {
            return;
        }

        match event {
            Some(CountdownEvent::Tick(value)) => {
                self.session.countdown_value = value;
                self.events.emit(KioskEvent::CountdownTick { value });
            }
            Some(CountdownEvent::Finished) => {
                self.session.countdown_value = 0;
                self.enter_loading();
            }
            None => warn!("Countdown ended without finishing"),
        }
    }

    /// Move to Loading and issue a generation attempt
    fn enter_loading(&mut self) {
        self.set_step(Step::Loading);
        self.session.generation_error = None;
        self.session.generated_avatar = None;

        let signals = self.signal_tx.clone();
        let result = self.generation.generate(
            self.session.id,
            self.session.captured_photo.as_ref(),
            self.session.selected_style.as_deref(),
            move |attempt| {
                let _ = signals.send(SessionSignal::Generation(attempt));
            },
        );

        match result {
            Ok(attempt_id) => {
                self.session.is_generating = true;
                self.session.generation_attempts += 1;
                self.events.emit(KioskEvent::GenerationStarted {
                    attempt_id,
                    style_id: self.session.selected_style.clone().unwrap_or_default(),
                });
            }
            Err(e) => {
                // Loading never stalls; the result screen shows the error
                warn!("Generation not started: {}", e);
                self.session.generation_error = Some(e);
                self.enter_result();
            }
        }
    }

    fn retry_generation(&mut self) {
        if self.session.step != Step::Result
            || self.session.generation_error.is_none()
            || self.session.is_generating
        {
            debug!("Generation retry ignored: previous attempt did not fail");
            return;
        }

        info!("Retrying generation");
        self.enter_loading();
    }

    fn retry_camera(&mut self) {
        if self.session.step != Step::Camera {
            debug!("Camera retry ignored outside the camera screen");
            return;
        }

        let report = self.camera_reporter();
        self.camera.request_retry(report);
    }

    fn on_signal(&mut self, signal: SessionSignal) {
        match signal {
            SessionSignal::Camera {
                session_id,
                acquisition,
            } => self.apply_camera(session_id, acquisition),
            SessionSignal::Generation(attempt) => self.apply_generation(attempt),
            SessionSignal::Delivery(report) => self.apply_delivery(report),
        }
    }

    pub(crate) fn apply_generation(&mut self, attempt: GenerationAttempt) {
        if attempt.session_id != self.session.id {
            debug!(
                "Discarding generation attempt {} from previous session {}",
                attempt.id, attempt.session_id
            );
            return;
        }
        if !self.generation.settle(&attempt) || self.session.step != Step::Loading {
            debug!("Discarding stale generation attempt {}", attempt.id);
            return;
        }

        self.session.is_generating = false;

        match attempt.outcome {
            GenerationOutcome::Success(avatar) => {
                info!("Avatar generated (attempt {})", attempt.id);
                self.session.generated_avatar = Some(avatar);
                self.session.generation_error = None;
                self.events.emit(KioskEvent::GenerationSucceeded {
                    attempt_id: attempt.id,
                });
                self.events.emit(KioskEvent::Celebrate {
                    timestamp: SystemTime::now(),
                });
            }
            GenerationOutcome::Failure(error) => {
                self.events.emit(KioskEvent::GenerationFailed {
                    attempt_id: attempt.id,
                    reason: error.to_string(),
                });
                self.session.generated_avatar = None;
                self.session.generation_error = Some(error);
            }
        }

        self.enter_result();
    }

    fn enter_result(&mut self) {
        self.session.is_generating = false;
        self.set_step(Step::Result);
        self.save_record();
    }

    fn print(&mut self) {
        if self.session.step != Step::Result {
            debug!("Print ignored outside the result screen");
            return;
        }

        match self.delivery.print(self.session.result_image()) {
            Ok(()) => {
                self.delivery_error = None;
                self.events.emit(KioskEvent::PrintCompleted {
                    timestamp: SystemTime::now(),
                });
                self.deliveries.push(DeliveryRecord {
                    channel: "print".to_string(),
                    destination: None,
                    message_id: None,
                    delivered_at: Utc::now(),
                });
                self.save_record();
            }
            Err(e) => self.delivery_failed("print", e),
        }
    }

    fn send_message(&mut self, destination: String, caption: Option<String>) {
        if self.session.step != Step::Result {
            debug!("Message send ignored outside the result screen");
            return;
        }
        if self.session.is_sending_delivery {
            debug!("Message send ignored: another send is in flight");
            return;
        }

        let signals = self.signal_tx.clone();
        let result = self.delivery.send_message(
            self.session.id,
            &destination,
            self.session.result_image(),
            caption,
            move |report| {
                let _ = signals.send(SessionSignal::Delivery(report));
            },
        );

        match result {
            Ok(_) => {
                self.session.is_sending_delivery = true;
                self.delivery_error = None;
            }
            Err(e) => self.delivery_failed("message", e),
        }
    }

    pub(crate) fn apply_delivery(&mut self, report: DeliveryReport) {
        if report.session_id != self.session.id || !self.delivery.settle(&report) {
            debug!("Discarding stale delivery report {}", report.send_id);
            return;
        }

        self.session.is_sending_delivery = false;

        match report.outcome {
            Ok(message_id) => {
                info!("Message delivered to {}", report.destination);
                self.delivery_error = None;
                self.last_message_id = message_id.clone();
                self.events.emit(KioskEvent::MessageSent {
                    message_id: message_id.clone(),
                });
                self.deliveries.push(DeliveryRecord {
                    channel: "message".to_string(),
                    destination: Some(report.destination),
                    message_id,
                    delivered_at: Utc::now(),
                });
                self.save_record();
            }
            Err(e) => self.delivery_failed("message", e),
        }
    }

    fn delivery_failed(&mut self, channel: &str, error: DeliveryError) {
        self.events.emit(KioskEvent::DeliveryFailed {
            channel: channel.to_string(),
            reason: error.user_message(),
        });
        self.delivery_error = Some(error);
    }

    fn reset(&mut self) {
        let interrupted = self.countdown.cancel() | self.generation.cancel() | self.delivery.cancel();
        if interrupted {
            debug!("Reset interrupted pending work");
        }
        self.camera.stop();

        let previous = std::mem::take(&mut self.session);
        self.deliveries.clear();
        self.delivery_error = None;
        self.last_message_id = None;

        info!("Session {} reset, new session {}", previous.id, self.session.id);
        self.events.emit(KioskEvent::SessionReset {
            previous_session_id: previous.id.to_string(),
            session_id: self.session.id.to_string(),
        });
        if previous.step != Step::Styles {
            self.events.emit(KioskEvent::StepChanged {
                session_id: self.session.id.to_string(),
                from: previous.step,
                to: Step::Styles,
            });
        }
    }

    fn preview(&mut self, step: Step) {
        debug!("Previewing {} screen", step);
        self.set_step(step);
    }

    fn save_record(&mut self) {
        if self.artifacts.is_none() {
            return;
        }

        let outcome = match (&self.session.generated_avatar, &self.session.generation_error) {
            (Some(_), _) => SessionOutcome::Generated,
            (None, Some(error)) => SessionOutcome::Fallback {
                reason: error.to_string(),
            },
            (None, None) => SessionOutcome::Fallback {
                reason: "no avatar generated".to_string(),
            },
        };

        let record = SessionRecord {
            session_id: self.session.id,
            style_id: self.session.selected_style.clone(),
            style_name: self
                .session
                .selected_style
                .as_deref()
                .and_then(|id| self.styles.find(id))
                .map(|style| style.display_name.clone()),
            started_at: self.session.started_at,
            completed_at: Utc::now(),
            generation_attempts: self.session.generation_attempts,
            outcome,
            deliveries: self.deliveries.clone(),
        };

        if let Some(writer) = self.artifacts.as_mut() {
            writer.submit(record);
        }
    }
}
