use super::controller::{SessionController, SessionParts};
use crate::artifacts::ArtifactStore;
use crate::camera::{CameraEngineBuilder, MediaDevice};
use crate::catalog::StaticCatalog;
use crate::config::KioskConfig;
use crate::countdown::Countdown;
use crate::delivery::{
    DeliveryDispatcher, HttpMessagingGateway, MessagingGateway, PrintSurface, SpoolPrintSurface,
};
use crate::error::{KioskError, Result};
use crate::events::EventBus;
use crate::generation::{AvatarService, GenerationOrchestrator, HttpAvatarService};
use std::sync::Arc;

/// Assembles a controller from configuration. Collaborators not supplied
/// explicitly are created from the configured backends and endpoints.
pub struct SessionControllerBuilder {
    config: Option<KioskConfig>,
    device: Option<Arc<dyn MediaDevice>>,
    service: Option<Arc<dyn AvatarService>>,
    gateway: Option<Arc<dyn MessagingGateway>>,
    printer: Option<Arc<dyn PrintSurface>>,
    events: Option<EventBus>,
}

impl SessionControllerBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            device: None,
            service: None,
            gateway: None,
            printer: None,
            events: None,
        }
    }

    pub fn config(mut self, config: KioskConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn media_device(mut self, device: Arc<dyn MediaDevice>) -> Self {
        self.device = Some(device);
        self
    }

    pub fn avatar_service(mut self, service: Arc<dyn AvatarService>) -> Self {
        self.service = Some(service);
        self
    }

    pub fn gateway(mut self, gateway: Arc<dyn MessagingGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn printer(mut self, printer: Arc<dyn PrintSurface>) -> Self {
        self.printer = Some(printer);
        self
    }

    pub fn event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> Result<SessionController> {
        let config = self
            .config
            .ok_or_else(|| KioskError::system("Kiosk configuration must be specified"))?;

        let mut camera = CameraEngineBuilder::new().config(config.camera.clone());
        if let Some(device) = self.device {
            camera = camera.device(device);
        }
        let camera = camera.build()?;

        let service: Arc<dyn AvatarService> = match self.service {
            Some(service) => service,
            None => Arc::new(HttpAvatarService::new(&config.generation)?),
        };
        let gateway: Arc<dyn MessagingGateway> = match self.gateway {
            Some(gateway) => gateway,
            None => Arc::new(HttpMessagingGateway::new(&config.delivery)?),
        };
        let printer: Arc<dyn PrintSurface> = match self.printer {
            Some(printer) => printer,
            None => Arc::new(SpoolPrintSurface::new(
                &config.delivery.print_spool_dir,
                config.delivery.print_command.clone(),
            )),
        };

        let catalog = Arc::new(StaticCatalog::new(
            config.styles.clone(),
            config.screens.clone(),
        ));

        let parts = SessionParts {
            camera,
            generation: GenerationOrchestrator::new(service),
            delivery: DeliveryDispatcher::new(gateway, printer, config.delivery.channel_id.clone()),
            styles: catalog.clone(),
            appearance: catalog,
            events: self.events.unwrap_or_else(|| EventBus::new(100)),
            artifacts: ArtifactStore::from_config(&config.artifacts),
        };

        Ok(SessionController::new(
            config.session.mode,
            Countdown::new(config.countdown.tick_interval()),
            config.countdown.seconds,
            parts,
        ))
    }
}

impl Default for SessionControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
