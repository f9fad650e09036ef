use super::keyboard_input::{KeyBindings, KeyboardInputHandler};
use super::types::{ComponentState, ShutdownReason};
use crate::config::KioskConfig;
use crate::error::Result;
use crate::events::EventBus;
use crate::session::{SessionCommand, SessionController, SessionControllerBuilder};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Runs one session controller with its operator console, signal handling
/// and event logging
pub struct KioskApp {
    pub(super) config: KioskConfig,
    pub(super) event_bus: EventBus,
    pub(super) controller: Option<SessionController>,
    pub(super) controller_task: Option<JoinHandle<SessionController>>,
    pub(super) controller_exited: CancellationToken,
    pub(super) logger_task: Option<JoinHandle<()>>,
    pub(super) command_sender: mpsc::Sender<SessionCommand>,
    pub(super) command_receiver: Option<mpsc::Receiver<SessionCommand>>,
    pub(super) keyboard_handler: Option<KeyboardInputHandler>,
    pub(super) keyboard_enabled: bool,

    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) shutdown_sender: Option<oneshot::Sender<ShutdownReason>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl KioskApp {
    /// Build the controller and its collaborators from configuration
    pub fn new(config: KioskConfig) -> Result<Self> {
        let controller = SessionControllerBuilder::new()
            .config(config.clone())
            .event_bus(EventBus::new(100))
            .build()?;
        Ok(Self::with_controller(config, controller))
    }

    /// Wrap an already assembled controller
    pub fn with_controller(config: KioskConfig, controller: SessionController) -> Self {
        let event_bus = controller.events().clone();
        let (command_sender, command_receiver) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        let bindings = KeyBindings {
            styles: config.styles.clone(),
            default_destination: config.delivery.default_destination.clone(),
            default_caption: config.delivery.default_caption.clone(),
        };
        let keyboard_handler = Some(KeyboardInputHandler::new(
            event_bus.clone(),
            command_sender.clone(),
            bindings,
        ));

        Self {
            config,
            event_bus,
            controller: Some(controller),
            controller_task: None,
            controller_exited: CancellationToken::new(),
            logger_task: None,
            command_sender,
            command_receiver: Some(command_receiver),
            keyboard_handler,
            keyboard_enabled: false,
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_sender: Some(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Enable or disable the operator console
    pub fn set_keyboard_enabled(&mut self, enabled: bool) {
        self.keyboard_enabled = enabled;
    }

    /// Sender for feeding commands to the running controller
    pub fn commands(&self) -> mpsc::Sender<SessionCommand> {
        self.command_sender.clone()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn config(&self) -> &KioskConfig {
        &self.config
    }

    /// The controller, while it is not running
    pub fn controller(&self) -> Option<&SessionController> {
        self.controller.as_ref()
    }

    pub(super) fn set_component_state(&self, component: &str, state: ComponentState) {
        self.component_states
            .lock()
            .insert(component.to_string(), state);
        debug!("Component '{}' state changed to: {:?}", component, state);
    }

    pub fn component_state(&self, component: &str) -> Option<ComponentState> {
        self.component_states.lock().get(component).copied()
    }

    pub fn component_states(&self) -> HashMap<String, ComponentState> {
        self.component_states.lock().clone()
    }
}
