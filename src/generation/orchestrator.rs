use super::service::{AvatarRequest, AvatarService};
use crate::error::GenerationError;
use crate::frame::ImageData;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome of one request/response cycle against the avatar service
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Success(ImageData),
    Failure(GenerationError),
}

/// One settled generation attempt, tagged with what it was issued for
#[derive(Debug, Clone)]
pub struct GenerationAttempt {
    pub id: u64,
    pub session_id: Uuid,
    pub style_id: String,
    pub outcome: GenerationOutcome,
}

struct InFlight {
    attempt_id: u64,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Issues generation requests and tracks the single live attempt.
///
/// Attempt ids increase monotonically. Only the most recent attempt is
/// accepted by [`settle`](Self::settle); anything older is stale.
pub struct GenerationOrchestrator {
    service: Arc<dyn AvatarService>,
    next_attempt: u64,
    in_flight: Option<InFlight>,
}

impl GenerationOrchestrator {
    pub fn new(service: Arc<dyn AvatarService>) -> Self {
        Self {
            service,
            next_attempt: 1,
            in_flight: None,
        }
    }

    /// Start a new attempt, superseding any attempt still in flight.
    ///
    /// Fails with `MissingInput` before contacting the service when either
    /// the photo or the style is absent. `report` runs on the spawned task
    /// once the service answers; it never runs for a cancelled attempt.
    pub fn generate<F>(
        &mut self,
        session_id: Uuid,
        photo: Option<&ImageData>,
        style: Option<&str>,
        report: F,
    ) -> Result<u64, GenerationError>
    where
        F: FnOnce(GenerationAttempt) + Send + 'static,
    {
        let (photo, style) = match (photo, style) {
            (Some(photo), Some(style)) if !style.is_empty() => (photo, style),
            _ => return Err(GenerationError::MissingInput),
        };

        if self.cancel() {
            debug!("Superseding in-flight generation attempt");
        }

        let attempt_id = self.next_attempt;
        self.next_attempt += 1;

        let request = AvatarRequest {
            image: photo.clone(),
            style: style.to_string(),
        };
        let style_id = request.style.clone();
        let service = Arc::clone(&self.service);
        let token = CancellationToken::new();
        let cancelled = token.clone();

        info!(
            "Generation attempt {} started (style: {}, session: {})",
            attempt_id, style_id, session_id
        );

        let handle = tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancelled.cancelled() => {
                    debug!("Generation attempt {} cancelled", attempt_id);
                    return;
                }
                result = service.generate(&request) => result,
            };

            let outcome = match result {
                Ok(image) => GenerationOutcome::Success(image),
                Err(e) => {
                    warn!("Generation attempt {} failed: {}", attempt_id, e);
                    GenerationOutcome::Failure(e)
                }
            };

            report(GenerationAttempt {
                id: attempt_id,
                session_id,
                style_id,
                outcome,
            });
        });

        self.in_flight = Some(InFlight {
            attempt_id,
            token,
            handle,
        });

        Ok(attempt_id)
    }

    /// Accept a reported attempt if it is the live one.
    pub fn settle(&mut self, attempt: &GenerationAttempt) -> bool {
        match &self.in_flight {
            Some(live) if live.attempt_id == attempt.id => {
                self.in_flight = None;
                true
            }
            _ => {
                debug!("Discarding stale generation attempt {}", attempt.id);
                false
            }
        }
    }

    /// Cancel the in-flight attempt. Returns whether one was running.
    pub fn cancel(&mut self) -> bool {
        match self.in_flight.take() {
            Some(live) => {
                live.token.cancel();
                live.handle.abort();
                info!("Generation attempt {} cancelled", live.attempt_id);
                true
            }
            None => false,
        }
    }

    pub fn is_generating(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn current_attempt(&self) -> Option<u64> {
        self.in_flight.as_ref().map(|live| live.attempt_id)
    }
}

impl Drop for GenerationOrchestrator {
    fn drop(&mut self) {
        self.cancel();
    }
}
