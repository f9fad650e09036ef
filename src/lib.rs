pub mod app;
pub mod artifacts;
pub mod camera;
pub mod catalog;
pub mod config;
pub mod countdown;
pub mod delivery;
pub mod error;
pub mod events;
pub mod frame;
pub mod generation;
pub mod session;

pub use app::{ComponentState, KioskApp, ShutdownReason};
pub use artifacts::{ArtifactStore, ArtifactWriter, DeliveryRecord, SessionOutcome, SessionRecord};
pub use camera::{
    CameraAcquisition, CameraEngine, CameraEngineBuilder, MediaDevice, MediaStream, MockMediaDevice,
};
pub use catalog::{AppearanceSource, ScreenAppearance, ScreenKey, StaticCatalog, Style, StyleCatalog};
pub use config::{KioskConfig, SessionMode};
pub use countdown::{Countdown, CountdownEvent};
pub use delivery::{
    DeliveryDispatcher, DeliveryReport, HttpMessagingGateway, MessagingGateway,
    MockMessagingGateway, MockPrintSurface, PrintSurface, SpoolPrintSurface,
};
pub use error::{CameraError, DeliveryError, GenerationError, KioskError, Result};
pub use events::{EventBus, EventFilter, EventReceiver, KioskEvent};
pub use frame::{FrameData, FrameFormat, ImageData};
pub use generation::{
    AvatarRequest, AvatarService, GenerationAttempt, GenerationOrchestrator, GenerationOutcome,
    HttpAvatarService, MockAvatarService,
};
pub use session::{
    Session, SessionCommand, SessionController, SessionControllerBuilder, SessionView, Step,
};
