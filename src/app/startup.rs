use super::{ComponentState, KioskApp};
use crate::error::{EventBusError, KioskError, Result};
use crate::events::{EventFilter, EventReceiver, KioskEvent};
use tracing::{debug, error, info};

impl KioskApp {
    /// Register components before starting them
    pub fn initialize(&mut self) -> Result<()> {
        info!("Initializing kiosk components");

        self.set_component_state("events", ComponentState::Stopped);
        self.set_component_state("controller", ComponentState::Stopped);
        if self.keyboard_enabled {
            self.set_component_state("keyboard", ComponentState::Stopped);
        }

        info!(
            "Kiosk initialized ({:?} mode, {} styles, camera backend {:?})",
            self.config.session.mode,
            self.config.styles.len(),
            self.config.camera.backend
        );
        Ok(())
    }

    /// Start the event logger, the session controller and the console
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting kiosk");

        let mut controller = self
            .controller
            .take()
            .ok_or_else(|| KioskError::system("Session controller already started"))?;
        let commands = self
            .command_receiver
            .take()
            .ok_or_else(|| KioskError::system("Command receiver already taken"))?;

        self.start_event_logger();

        self.set_component_state("controller", ComponentState::Starting);
        let token = self.cancellation_token.child_token();
        let exited = self.controller_exited.clone();

        self.controller_task = Some(tokio::spawn(async move {
            controller.run(commands, token).await;
            exited.cancel();
            controller
        }));
        self.set_component_state("controller", ComponentState::Running);

        if self.keyboard_enabled {
            if let Some(keyboard_handler) = &self.keyboard_handler {
                self.set_component_state("keyboard", ComponentState::Starting);
                match keyboard_handler.start().await {
                    Ok(()) => self.set_component_state("keyboard", ComponentState::Running),
                    Err(e) => {
                        error!("Failed to start keyboard input: {}", e);
                        self.set_component_state("keyboard", ComponentState::Failed);
                    }
                }
            }
        }

        info!("Kiosk started");
        Ok(())
    }

    fn start_event_logger(&mut self) {
        let mut events = EventReceiver::new(
            self.event_bus.subscribe(),
            EventFilter::All,
            "event-logger".to_string(),
        );
        let token = self.cancellation_token.clone();

        self.logger_task = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(KioskEvent::CountdownTick { value }) => debug!("Countdown: {}", value),
                        Ok(event) => info!("Event: {}", event.description()),
                        Err(EventBusError::Lagged { .. }) => {}
                        Err(_) => break,
                    },
                }
            }
            debug!("Event logger stopped");
        }));

        self.set_component_state("events", ComponentState::Running);
    }
}
