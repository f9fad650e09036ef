use super::service::{AvatarRequest, AvatarService};
use crate::error::GenerationError;
use crate::frame::ImageData;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

const DEFAULT_AVATAR: &str = "data:image/png;base64,iVBORw0KGgo=";

struct MockShared {
    response: Mutex<Result<ImageData, GenerationError>>,
    calls: AtomicUsize,
    completed: AtomicUsize,
    requests: Mutex<Vec<AvatarRequest>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

/// Scriptable avatar service for tests and dry runs.
///
/// Clones share state, so a test can keep a handle after passing one to the
/// controller. While held, requests park until [`release`](Self::release).
#[derive(Clone)]
pub struct MockAvatarService {
    shared: Arc<MockShared>,
}

impl MockAvatarService {
    pub fn new() -> Self {
        let avatar = ImageData::from_data_url(DEFAULT_AVATAR);
        Self {
            shared: Arc::new(MockShared {
                response: Mutex::new(avatar.ok_or(GenerationError::EmptyResponse)),
                calls: AtomicUsize::new(0),
                completed: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
                gate: Mutex::new(None),
            }),
        }
    }

    pub fn returning(self, image: ImageData) -> Self {
        self.set_response(Ok(image));
        self
    }

    pub fn failing(self, error: GenerationError) -> Self {
        self.set_response(Err(error));
        self
    }

    pub fn set_response(&self, response: Result<ImageData, GenerationError>) {
        *self.shared.response.lock() = response;
    }

    /// Park subsequent requests until released
    pub fn hold(&self) {
        *self.shared.gate.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    /// Let `count` parked or future requests through
    pub fn release(&self, count: usize) {
        if let Some(gate) = self.shared.gate.lock().as_ref() {
            gate.add_permits(count);
        }
    }

    /// Number of requests received
    pub fn calls(&self) -> usize {
        self.shared.calls.load(Ordering::SeqCst)
    }

    /// Number of requests that produced an answer
    pub fn completed(&self) -> usize {
        self.shared.completed.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<AvatarRequest> {
        self.shared.requests.lock().clone()
    }
}

impl Default for MockAvatarService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AvatarService for MockAvatarService {
    async fn generate(&self, request: &AvatarRequest) -> Result<ImageData, GenerationError> {
        self.shared.calls.fetch_add(1, Ordering::SeqCst);
        self.shared.requests.lock().push(request.clone());

        let gate = self.shared.gate.lock().clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        self.shared.completed.fetch_add(1, Ordering::SeqCst);
        self.shared.response.lock().clone()
    }
}
