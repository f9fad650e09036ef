use kiosk::{
    GenerationError, ImageData, KioskConfig, KioskEvent, MockAvatarService, MockMediaDevice,
    MockMessagingGateway, MockPrintSurface, SessionCommand, SessionController,
    SessionControllerBuilder, Step,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

struct Kiosk {
    commands: mpsc::Sender<SessionCommand>,
    events: broadcast::Receiver<KioskEvent>,
    shutdown: CancellationToken,
    task: JoinHandle<SessionController>,
    device: MockMediaDevice,
    service: MockAvatarService,
    gateway: MockMessagingGateway,
}

impl Kiosk {
    fn start(service: MockAvatarService) -> Self {
        Self::with_tick_interval(service, 10)
    }

    fn with_tick_interval(service: MockAvatarService, tick_interval_ms: u64) -> Self {
        let mut config = KioskConfig::default();
        config.camera.readiness_timeout_ms = 300;
        config.camera.readiness_poll_ms = 5;
        config.camera.settle_delay_ms = 10;
        config.countdown.tick_interval_ms = tick_interval_ms;

        let device = MockMediaDevice::new();
        let gateway = MockMessagingGateway::new();
        let mut controller = SessionControllerBuilder::new()
            .config(config)
            .media_device(Arc::new(device.clone()))
            .avatar_service(Arc::new(service.clone()))
            .gateway(Arc::new(gateway.clone()))
            .printer(Arc::new(MockPrintSurface::new()))
            .build()
            .unwrap();

        let events = controller.events().subscribe();
        let (commands, receiver) = mpsc::channel(16);
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let task = tokio::spawn(async move {
            controller.run(receiver, token).await;
            controller
        });

        Self {
            commands,
            events,
            shutdown,
            task,
            device,
            service,
            gateway,
        }
    }

    async fn send(&self, command: SessionCommand) {
        self.commands.send(command).await.unwrap();
    }

    async fn photo_to_countdown(&mut self, style: &str) {
        self.send(SessionCommand::SelectStyle(style.to_string())).await;
        self.send(SessionCommand::ConfirmStyle).await;
        self.wait_for(|event| {
            matches!(event, KioskEvent::CameraStatusChanged { active: true, .. })
        })
        .await;
        self.send(SessionCommand::Capture).await;
        self.send(SessionCommand::ConfirmPhoto).await;
    }

    /// Wait for the first event matching the predicate
    async fn wait_for<F>(&mut self, predicate: F) -> KioskEvent
    where
        F: Fn(&KioskEvent) -> bool,
    {
        timeout(Duration::from_secs(3), async {
            loop {
                match self.events.recv().await {
                    Ok(event) if predicate(&event) => return event,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
                }
            }
        })
        .await
        .expect("expected event was not emitted")
    }

    async fn wait_for_step(&mut self, step: Step) {
        self.wait_for(|event| matches!(event, KioskEvent::StepChanged { to, .. } if *to == step))
            .await;
    }

    async fn stop(self) -> SessionController {
        self.shutdown.cancel();
        timeout(Duration::from_secs(3), self.task)
            .await
            .expect("controller did not stop")
            .unwrap()
    }
}

fn avatar() -> ImageData {
    ImageData::from_data_url("data:image/png;base64,AAA").unwrap()
}

#[tokio::test]
async fn test_walk_up_session_produces_avatar() {
    let mut kiosk = Kiosk::start(MockAvatarService::new().returning(avatar()));

    kiosk.photo_to_countdown("pixar").await;

    let mut ticks = Vec::new();
    loop {
        match kiosk
            .wait_for(|event| {
                matches!(
                    event,
                    KioskEvent::CountdownTick { .. } | KioskEvent::Celebrate { .. }
                )
            })
            .await
        {
            KioskEvent::CountdownTick { value } => ticks.push(value),
            _ => break,
        }
    }
    assert_eq!(ticks, vec![2, 1, 0]);

    let requests = kiosk.service.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].style, "pixar");

    let controller = kiosk.stop().await;
    let view = controller.snapshot();
    assert_eq!(view.step, Step::Result);
    assert!(view.has_avatar);
    assert!(!view.camera_active);
    assert_eq!(
        controller.session().generated_avatar.as_ref().map(ImageData::as_str),
        Some("data:image/png;base64,AAA")
    );
    assert_eq!(view.summary, "Your Pixar avatar is ready!");
}

#[tokio::test]
async fn test_service_failure_shows_original_photo() {
    let mut kiosk = Kiosk::start(
        MockAvatarService::new().failing(GenerationError::service("HTTP 500")),
    );

    kiosk.photo_to_countdown("anime").await;
    kiosk.wait_for_step(Step::Result).await;

    let controller = kiosk.stop().await;
    let session = controller.session();
    assert!(session.generated_avatar.is_none());
    assert_eq!(
        session.generation_error,
        Some(GenerationError::service("HTTP 500"))
    );
    assert_eq!(session.result_image(), session.captured_photo.as_ref());
    assert_eq!(controller.snapshot().summary, "Showing your original photo");
}

#[tokio::test]
async fn test_reset_discards_in_flight_generation() {
    let service = MockAvatarService::new().returning(avatar());
    service.hold();
    let mut kiosk = Kiosk::start(service);

    kiosk.photo_to_countdown("pixar").await;
    kiosk
        .wait_for(|event| matches!(event, KioskEvent::GenerationStarted { .. }))
        .await;

    kiosk.send(SessionCommand::Reset).await;
    kiosk
        .wait_for(|event| matches!(event, KioskEvent::SessionReset { .. }))
        .await;
    kiosk.service.release(1);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let device = kiosk.device.clone();
    let controller = kiosk.stop().await;
    let session = controller.session();
    assert_eq!(session.step, Step::Styles);
    assert!(session.selected_style.is_none());
    assert!(session.captured_photo.is_none());
    assert!(session.generated_avatar.is_none());
    assert!(!session.is_generating);
    assert_eq!(device.live_streams(), 0);
}

#[tokio::test]
async fn test_retake_during_countdown_returns_to_camera() {
    let mut kiosk = Kiosk::with_tick_interval(MockAvatarService::new().returning(avatar()), 200);

    kiosk.photo_to_countdown("pixar").await;
    kiosk.wait_for_step(Step::Countdown).await;
    kiosk.send(SessionCommand::Retake).await;
    kiosk.wait_for_step(Step::Camera).await;

    // Cancelled countdown never reaches Loading
    tokio::time::sleep(Duration::from_millis(700)).await;

    let service = kiosk.service.clone();
    let controller = kiosk.stop().await;
    assert_eq!(controller.session().step, Step::Camera);
    assert!(controller.session().captured_photo.is_none());
    assert_eq!(service.calls(), 0);
}

#[tokio::test]
async fn test_message_delivery_from_result() {
    let mut kiosk = Kiosk::start(MockAvatarService::new().returning(avatar()));

    kiosk.photo_to_countdown("pixar").await;
    kiosk.wait_for_step(Step::Result).await;

    kiosk
        .send(SessionCommand::SendMessage {
            destination: "@guest".to_string(),
            caption: Some("Greetings from the booth".to_string()),
        })
        .await;
    let sent = kiosk
        .wait_for(|event| matches!(event, KioskEvent::MessageSent { .. }))
        .await;
    assert!(matches!(
        sent,
        KioskEvent::MessageSent { message_id: Some(ref id) } if id == "mock-message"
    ));

    let requests = kiosk.gateway.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].destination, "@guest");
    assert_eq!(requests[0].image.as_str(), "data:image/png;base64,AAA");

    let controller = kiosk.stop().await;
    assert_eq!(
        controller.snapshot().last_message_id.as_deref(),
        Some("mock-message")
    );
    assert!(!controller.session().is_sending_delivery);
}
