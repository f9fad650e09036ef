use super::gateway::{MessageRequest, MessagingGateway};
use super::print::PrintSurface;
use crate::error::DeliveryError;
use crate::frame::ImageData;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Semaphore;

struct GatewayShared {
    response: Mutex<Result<Option<String>, DeliveryError>>,
    requests: Mutex<Vec<MessageRequest>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

/// Scriptable messaging gateway; clones share state
#[derive(Clone)]
pub struct MockMessagingGateway {
    shared: Arc<GatewayShared>,
}

impl MockMessagingGateway {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(GatewayShared {
                response: Mutex::new(Ok(Some("mock-message".to_string()))),
                requests: Mutex::new(Vec::new()),
                gate: Mutex::new(None),
            }),
        }
    }

    pub fn set_response(&self, response: Result<Option<String>, DeliveryError>) {
        *self.shared.response.lock() = response;
    }

    pub fn hold(&self) {
        *self.shared.gate.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, count: usize) {
        if let Some(gate) = self.shared.gate.lock().as_ref() {
            gate.add_permits(count);
        }
    }

    pub fn calls(&self) -> usize {
        self.shared.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<MessageRequest> {
        self.shared.requests.lock().clone()
    }
}

impl Default for MockMessagingGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessagingGateway for MockMessagingGateway {
    async fn send(&self, request: &MessageRequest) -> Result<Option<String>, DeliveryError> {
        self.shared.requests.lock().push(request.clone());

        let gate = self.shared.gate.lock().clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        self.shared.response.lock().clone()
    }
}

/// Print surface that records jobs in memory
#[derive(Clone, Default)]
pub struct MockPrintSurface {
    jobs: Arc<Mutex<Vec<ImageData>>>,
    failure: Arc<Mutex<Option<DeliveryError>>>,
}

impl MockPrintSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failure(&self, failure: Option<DeliveryError>) {
        *self.failure.lock() = failure;
    }

    pub fn jobs(&self) -> Vec<ImageData> {
        self.jobs.lock().clone()
    }
}

impl PrintSurface for MockPrintSurface {
    fn print(&self, image: &ImageData) -> Result<(), DeliveryError> {
        if let Some(failure) = self.failure.lock().clone() {
            return Err(failure);
        }
        self.jobs.lock().push(image.clone());
        Ok(())
    }
}
