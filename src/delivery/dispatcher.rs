use super::gateway::{MessageRequest, MessagingGateway};
use super::print::PrintSurface;
use crate::error::DeliveryError;
use crate::frame::ImageData;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome of one message send, tagged with what it was issued for
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub session_id: Uuid,
    pub send_id: u64,
    pub destination: String,
    /// Gateway delivery id on success
    pub outcome: Result<Option<String>, DeliveryError>,
}

struct InFlight {
    send_id: u64,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Print and message delivery for the result screen.
///
/// Printing is synchronous and repeatable. Message sends run on a spawned
/// task and at most one may be in flight; nothing is retried automatically.
pub struct DeliveryDispatcher {
    gateway: Arc<dyn MessagingGateway>,
    printer: Arc<dyn PrintSurface>,
    channel_id: String,
    next_send: u64,
    in_flight: Option<InFlight>,
}

impl DeliveryDispatcher {
    pub fn new(
        gateway: Arc<dyn MessagingGateway>,
        printer: Arc<dyn PrintSurface>,
        channel_id: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            printer,
            channel_id: channel_id.into(),
            next_send: 1,
            in_flight: None,
        }
    }

    pub fn print(&self, image: Option<&ImageData>) -> Result<(), DeliveryError> {
        let image = image.ok_or(DeliveryError::NoImage)?;
        self.printer.print(image).map_err(|e| {
            warn!("Print failed: {}", e);
            e
        })
    }

    /// Validate and start a message send. `report` runs on the spawned task
    /// once the gateway answers; it never runs for a cancelled send.
    pub fn send_message<F>(
        &mut self,
        session_id: Uuid,
        destination: &str,
        image: Option<&ImageData>,
        caption: Option<String>,
        report: F,
    ) -> Result<u64, DeliveryError>
    where
        F: FnOnce(DeliveryReport) + Send + 'static,
    {
        let destination = destination.trim();
        if destination.is_empty() {
            return Err(DeliveryError::InvalidDestination {
                destination: destination.to_string(),
            });
        }
        let image = image.ok_or(DeliveryError::NoImage)?;
        if self.in_flight.is_some() {
            debug!("Ignoring send while another is in flight");
            return Err(DeliveryError::Busy);
        }

        let send_id = self.next_send;
        self.next_send += 1;

        let request = MessageRequest {
            destination: destination.to_string(),
            image: image.clone(),
            caption: caption.filter(|c| !c.is_empty()),
            channel_id: self.channel_id.clone(),
        };
        let gateway = Arc::clone(&self.gateway);
        let token = CancellationToken::new();
        let cancelled = token.clone();

        info!("Message send {} to {} started", send_id, request.destination);

        let handle = tokio::spawn(async move {
            let outcome = tokio::select! {
                _ = cancelled.cancelled() => {
                    debug!("Message send {} cancelled", send_id);
                    return;
                }
                outcome = gateway.send(&request) => outcome,
            };

            report(DeliveryReport {
                session_id,
                send_id,
                destination: request.destination,
                outcome,
            });
        });

        self.in_flight = Some(InFlight {
            send_id,
            token,
            handle,
        });

        Ok(send_id)
    }

    /// Accept a report if it belongs to the live send
    pub fn settle(&mut self, report: &DeliveryReport) -> bool {
        match &self.in_flight {
            Some(live) if live.send_id == report.send_id => {
                self.in_flight = None;
                true
            }
            _ => {
                debug!("Discarding stale delivery report {}", report.send_id);
                false
            }
        }
    }

    pub fn cancel(&mut self) -> bool {
        match self.in_flight.take() {
            Some(live) => {
                live.token.cancel();
                live.handle.abort();
                info!("Message send {} cancelled", live.send_id);
                true
            }
            None => false,
        }
    }

    pub fn is_sending(&self) -> bool {
        self.in_flight.is_some()
    }
}

impl Drop for DeliveryDispatcher {
    fn drop(&mut self) {
        self.cancel();
    }
}
