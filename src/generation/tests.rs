use super::*;
use crate::error::GenerationError;
use crate::frame::ImageData;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

fn photo() -> ImageData {
    ImageData::from_bytes("image/jpeg", &[0xFF, 0xD8, 0xFF, 0xD9])
}

fn orchestrator_with(
    service: &MockAvatarService,
) -> (
    GenerationOrchestrator,
    mpsc::UnboundedSender<GenerationAttempt>,
    mpsc::UnboundedReceiver<GenerationAttempt>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        GenerationOrchestrator::new(Arc::new(service.clone())),
        tx,
        rx,
    )
}

fn reporter(tx: &mpsc::UnboundedSender<GenerationAttempt>) -> impl FnOnce(GenerationAttempt) + Send + 'static {
    let tx = tx.clone();
    move |attempt| {
        let _ = tx.send(attempt);
    }
}

#[tokio::test]
async fn test_missing_input_never_calls_service() {
    let service = MockAvatarService::new();
    let (mut orchestrator, tx, _rx) = orchestrator_with(&service);
    let session = Uuid::new_v4();

    let result = orchestrator.generate(session, None, Some("pixar"), reporter(&tx));
    assert_eq!(result, Err(GenerationError::MissingInput));

    let image = photo();
    let result = orchestrator.generate(session, Some(&image), None, reporter(&tx));
    assert_eq!(result, Err(GenerationError::MissingInput));

    let result = orchestrator.generate(session, Some(&image), Some(""), reporter(&tx));
    assert_eq!(result, Err(GenerationError::MissingInput));

    tokio::task::yield_now().await;
    assert_eq!(service.calls(), 0);
    assert!(!orchestrator.is_generating());
}

#[tokio::test]
async fn test_success_reports_avatar() {
    let avatar = ImageData::from_data_url("data:image/png;base64,AAA").unwrap();
    let service = MockAvatarService::new().returning(avatar.clone());
    let (mut orchestrator, tx, mut rx) = orchestrator_with(&service);
    let session = Uuid::new_v4();
    let image = photo();

    let id = orchestrator
        .generate(session, Some(&image), Some("pixar"), reporter(&tx))
        .unwrap();
    assert!(orchestrator.is_generating());
    assert_eq!(orchestrator.current_attempt(), Some(id));

    let attempt = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    assert_eq!(attempt.id, id);
    assert_eq!(attempt.session_id, session);
    assert_eq!(attempt.style_id, "pixar");
    assert_eq!(attempt.outcome, GenerationOutcome::Success(avatar));

    assert!(orchestrator.settle(&attempt));
    assert!(!orchestrator.is_generating());

    // The photo is forwarded exactly as captured
    let requests = service.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].image, image);
    assert_eq!(requests[0].style, "pixar");
}

#[tokio::test]
async fn test_failure_reports_reason() {
    let service = MockAvatarService::new().failing(GenerationError::service("HTTP 500"));
    let (mut orchestrator, tx, mut rx) = orchestrator_with(&service);
    let image = photo();

    orchestrator
        .generate(Uuid::new_v4(), Some(&image), Some("anime"), reporter(&tx))
        .unwrap();

    let attempt = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    assert_eq!(
        attempt.outcome,
        GenerationOutcome::Failure(GenerationError::service("HTTP 500"))
    );
}

#[tokio::test]
async fn test_new_attempt_supersedes_previous() {
    let service = MockAvatarService::new();
    service.hold();
    let (mut orchestrator, tx, mut rx) = orchestrator_with(&service);
    let session = Uuid::new_v4();
    let image = photo();

    let first = orchestrator
        .generate(session, Some(&image), Some("pixar"), reporter(&tx))
        .unwrap();
    let second = orchestrator
        .generate(session, Some(&image), Some("pixar"), reporter(&tx))
        .unwrap();
    assert!(second > first);
    assert_eq!(orchestrator.current_attempt(), Some(second));

    service.release(2);

    let attempt = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    assert_eq!(attempt.id, second);
    assert!(orchestrator.settle(&attempt));

    // The superseded attempt was cancelled and never reports
    assert!(timeout(Duration::from_millis(50), rx.recv()).await.is_err());
}

#[tokio::test]
async fn test_stale_attempt_is_not_settled() {
    let service = MockAvatarService::new();
    let (mut orchestrator, _tx, _rx) = orchestrator_with(&service);

    let stale = GenerationAttempt {
        id: 42,
        session_id: Uuid::new_v4(),
        style_id: "pixar".to_string(),
        outcome: GenerationOutcome::Failure(GenerationError::EmptyResponse),
    };

    assert!(!orchestrator.settle(&stale));
}

#[tokio::test]
async fn test_cancel_suppresses_report() {
    let service = MockAvatarService::new();
    service.hold();
    let (mut orchestrator, tx, mut rx) = orchestrator_with(&service);
    let image = photo();

    orchestrator
        .generate(Uuid::new_v4(), Some(&image), Some("comic"), reporter(&tx))
        .unwrap();
    tokio::task::yield_now().await;

    assert!(orchestrator.cancel());
    assert!(!orchestrator.is_generating());
    service.release(1);

    assert!(timeout(Duration::from_millis(50), rx.recv()).await.is_err());
    assert_eq!(service.completed(), 0);
    assert!(!orchestrator.cancel());
}
