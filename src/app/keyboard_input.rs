use crate::catalog::Style;
use crate::error::Result;
use crate::events::{EventBus, KioskEvent};
use crate::session::{SessionCommand, Step};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::time::{Duration, SystemTime};
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::mpsc;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What a key press asks for
#[derive(Debug, Clone, PartialEq)]
pub enum KeyAction {
    Commands(Vec<SessionCommand>),
    Quit,
    Ignore,
}

/// Values the key bindings need from the kiosk configuration
#[derive(Debug, Clone, Default)]
pub struct KeyBindings {
    pub styles: Vec<Style>,
    pub default_destination: Option<String>,
    pub default_caption: Option<String>,
}

impl KeyBindings {
    /// Translate a key press at the given step
    pub fn action_for(&self, code: KeyCode, step: Step) -> KeyAction {
        let command = match code {
            KeyCode::Char(digit @ '1'..='9') => {
                let index = digit as usize - '1' as usize;
                return match self.styles.get(index) {
                    Some(style) => KeyAction::Commands(vec![
                        SessionCommand::SelectStyle(style.id.clone()),
                        SessionCommand::ConfirmStyle,
                    ]),
                    None => KeyAction::Ignore,
                };
            }
            KeyCode::Char(' ') | KeyCode::Enter => match step {
                Step::Styles => SessionCommand::ConfirmStyle,
                Step::Camera => SessionCommand::Capture,
                Step::PhotoPreview => SessionCommand::ConfirmPhoto,
                _ => return KeyAction::Ignore,
            },
            KeyCode::Char('r') => SessionCommand::Retake,
            KeyCode::Char('g') => SessionCommand::RetryGeneration,
            KeyCode::Char('c') => SessionCommand::RetryCamera,
            KeyCode::Char('p') => SessionCommand::Print,
            KeyCode::Char('m') => match &self.default_destination {
                Some(destination) => SessionCommand::SendMessage {
                    destination: destination.clone(),
                    caption: self.default_caption.clone(),
                },
                None => {
                    warn!("No default destination configured for message delivery");
                    return KeyAction::Ignore;
                }
            },
            KeyCode::Char('x') => SessionCommand::Reset,
            KeyCode::Char('q') | KeyCode::Esc => return KeyAction::Quit,
            _ => return KeyAction::Ignore,
        };

        KeyAction::Commands(vec![command])
    }
}

/// Operator console: raw-mode key presses mapped to session commands
pub struct KeyboardInputHandler {
    event_bus: EventBus,
    commands: mpsc::Sender<SessionCommand>,
    bindings: KeyBindings,
    cancellation_token: CancellationToken,
}

impl KeyboardInputHandler {
    pub fn new(
        event_bus: EventBus,
        commands: mpsc::Sender<SessionCommand>,
        bindings: KeyBindings,
    ) -> Self {
        Self {
            event_bus,
            commands,
            bindings,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start listening for keyboard input
    pub async fn start(&self) -> Result<()> {
        info!("Starting keyboard input - digits pick a style, SPACE captures, q quits");

        let event_bus = self.event_bus.clone();
        let commands = self.commands.clone();
        let bindings = self.bindings.clone();
        let cancellation_token = self.cancellation_token.clone();
        let mut steps = self.event_bus.subscribe();

        task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }

            let mut step = Step::Styles;

            loop {
                if cancellation_token.is_cancelled() {
                    debug!("Keyboard input handler stopping");
                    break;
                }

                // Track the current screen so SPACE means the right thing
                loop {
                    match steps.try_recv() {
                        Ok(KioskEvent::StepChanged { to, .. }) => step = to,
                        Ok(_) | Err(TryRecvError::Lagged(_)) => {}
                        Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                    }
                }

                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        let key_event = match event::read() {
                            Ok(Event::Key(key_event)) if key_event.kind == KeyEventKind::Press => {
                                key_event
                            }
                            _ => continue,
                        };

                        match bindings.action_for(key_event.code, step) {
                            KeyAction::Commands(batch) => {
                                for command in batch {
                                    debug!("Key {:?} -> {:?}", key_event.code, command);
                                    if let Err(e) = commands.try_send(command) {
                                        warn!("Dropping key command: {}", e);
                                    }
                                }
                            }
                            KeyAction::Quit => {
                                info!("Quit key pressed - requesting shutdown");
                                event_bus.emit(KioskEvent::ShutdownRequested {
                                    timestamp: SystemTime::now(),
                                    reason: "User requested via keyboard".to_string(),
                                });
                                break;
                            }
                            KeyAction::Ignore => {
                                debug!("Key pressed: {:?}", key_event.code);
                            }
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for keyboard events: {}", e);
                    }
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            } else {
                debug!("Raw mode disabled");
            }
        });

        Ok(())
    }

    /// Stop the keyboard input handler
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping keyboard input handler");
        self.cancellation_token.cancel();

        // Let the blocking loop notice and restore the terminal
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = disable_raw_mode();

        Ok(())
    }
}
