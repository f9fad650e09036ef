use crate::error::EventBusError;
use crate::session::Step;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

/// Events published by the session controller for rendering and reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum KioskEvent {
    /// The session moved to another screen
    StepChanged {
        session_id: String,
        from: Step,
        to: Step,
    },
    /// Countdown value after a decrement
    CountdownTick { value: u32 },
    /// Camera acquisition status changed
    CameraStatusChanged {
        active: bool,
        error: Option<String>,
        timestamp: SystemTime,
    },
    /// A generation attempt was issued
    GenerationStarted { attempt_id: u64, style_id: String },
    /// A generation attempt produced an avatar
    GenerationSucceeded { attempt_id: u64 },
    /// A generation attempt failed; the result screen falls back to the photo
    GenerationFailed { attempt_id: u64, reason: String },
    /// One-shot celebratory effect on a successful generation
    Celebrate { timestamp: SystemTime },
    /// A print job was handed to the print surface
    PrintCompleted { timestamp: SystemTime },
    /// The messaging gateway accepted a message
    MessageSent { message_id: Option<String> },
    /// A print or message delivery failed
    DeliveryFailed { channel: String, reason: String },
    /// The session was discarded and a fresh one started
    SessionReset {
        previous_session_id: String,
        session_id: String,
    },
    /// System shutdown requested
    ShutdownRequested {
        timestamp: SystemTime,
        reason: String,
    },
}

impl KioskEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            KioskEvent::StepChanged { from, to, .. } => {
                format!("Step changed: {:?} -> {:?}", from, to)
            }
            KioskEvent::CountdownTick { value } => format!("Countdown: {}", value),
            KioskEvent::CameraStatusChanged { active, error, .. } => match error {
                Some(error) => format!("Camera failed: {}", error),
                None => format!("Camera {}", if *active { "active" } else { "stopped" }),
            },
            KioskEvent::GenerationStarted {
                attempt_id,
                style_id,
            } => format!("Generation {} started (style: {})", attempt_id, style_id),
            KioskEvent::GenerationSucceeded { attempt_id } => {
                format!("Generation {} succeeded", attempt_id)
            }
            KioskEvent::GenerationFailed { attempt_id, reason } => {
                format!("Generation {} failed: {}", attempt_id, reason)
            }
            KioskEvent::Celebrate { .. } => "Celebrate".to_string(),
            KioskEvent::PrintCompleted { .. } => "Print completed".to_string(),
            KioskEvent::MessageSent { message_id } => match message_id {
                Some(id) => format!("Message sent ({})", id),
                None => "Message sent".to_string(),
            },
            KioskEvent::DeliveryFailed { channel, reason } => {
                format!("{} delivery failed: {}", channel, reason)
            }
            KioskEvent::SessionReset { session_id, .. } => {
                format!("Session reset, new session {}", session_id)
            }
            KioskEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            KioskEvent::StepChanged { .. } => "step_changed",
            KioskEvent::CountdownTick { .. } => "countdown_tick",
            KioskEvent::CameraStatusChanged { .. } => "camera_status_changed",
            KioskEvent::GenerationStarted { .. } => "generation_started",
            KioskEvent::GenerationSucceeded { .. } => "generation_succeeded",
            KioskEvent::GenerationFailed { .. } => "generation_failed",
            KioskEvent::Celebrate { .. } => "celebrate",
            KioskEvent::PrintCompleted { .. } => "print_completed",
            KioskEvent::MessageSent { .. } => "message_sent",
            KioskEvent::DeliveryFailed { .. } => "delivery_failed",
            KioskEvent::SessionReset { .. } => "session_reset",
            KioskEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Async event bus for component coordination using broadcast channels
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<KioskEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<KioskEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: KioskEvent) -> Result<usize, EventBusError> {
        trace!("Publishing event: {}", event.description());

        match &event {
            KioskEvent::GenerationFailed { reason, .. } => {
                warn!("Generation failed: {}", reason);
            }
            KioskEvent::DeliveryFailed { channel, reason } => {
                error!("{} delivery failed: {}", channel, reason);
            }
            KioskEvent::CameraStatusChanged {
                error: Some(error), ..
            } => {
                warn!("Camera unavailable: {}", error);
            }
            KioskEvent::ShutdownRequested { reason, .. } => {
                info!("Shutdown requested: {}", reason);
            }
            _ => {}
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Publish without caring whether anyone is listening
    pub fn emit(&self, event: KioskEvent) {
        let event_type = event.event_type();
        if self.publish(event).is_err() {
            trace!("No subscribers for {} event", event_type);
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if there are any active subscribers
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
    /// Custom filter function
    Custom(fn(&KioskEvent) -> bool),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &KioskEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<KioskEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(
        receiver: broadcast::Receiver<KioskEvent>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event
    pub async fn recv(&mut self) -> Result<KioskEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        trace!(
                            "Receiver '{}' received event: {}",
                            self.name,
                            event.description()
                        );
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { skipped: n });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::Closed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<KioskEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { skipped: n });
                }
                Err(broadcast::error::TryRecvError::Closed) => return Err(EventBusError::Closed),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_event_bus_basic_operations() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let subscriber_count = event_bus
            .publish(KioskEvent::CountdownTick { value: 2 })
            .unwrap();
        assert_eq!(subscriber_count, 1);

        match receiver.recv().await.unwrap() {
            KioskEvent::CountdownTick { value } => assert_eq!(value, 2),
            _ => panic!("Unexpected event type"),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let event_bus = EventBus::new(10);
        assert!(!event_bus.has_subscribers());
        assert!(event_bus
            .publish(KioskEvent::Celebrate {
                timestamp: SystemTime::now()
            })
            .is_err());

        // emit swallows the missing-subscriber error
        event_bus.emit(KioskEvent::Celebrate {
            timestamp: SystemTime::now(),
        });
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let event_bus = EventBus::new(10);
        let filter = EventFilter::EventTypes(vec!["generation_failed"]);
        let mut filtered = EventReceiver::new(event_bus.subscribe(), filter, "test".to_string());

        event_bus.emit(KioskEvent::CountdownTick { value: 1 });
        event_bus.emit(KioskEvent::GenerationFailed {
            attempt_id: 7,
            reason: "HTTP 500".to_string(),
        });

        let event = timeout(Duration::from_millis(100), filtered.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.event_type(), "generation_failed");
        assert!(filtered.try_recv().unwrap().is_none());
    }

    #[test]
    fn test_event_descriptions() {
        let event = KioskEvent::StepChanged {
            session_id: "abc".to_string(),
            from: Step::Countdown,
            to: Step::Loading,
        };
        assert_eq!(event.description(), "Step changed: Countdown -> Loading");
        assert_eq!(event.event_type(), "step_changed");
    }
}
