use crate::config::DeliveryConfig;
use crate::error::{DeliveryError, KioskError, Result};
use crate::frame::ImageData;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Body of a message send request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRequest {
    pub destination: String,
    pub image: ImageData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    pub channel_id: String,
}

/// External messaging gateway. Resolves to the gateway's delivery id, if any.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    async fn send(&self, request: &MessageRequest)
        -> std::result::Result<Option<String>, DeliveryError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GatewayResponse {
    #[serde(default, alias = "sent")]
    success: bool,
    #[serde(default)]
    message_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client for the messaging gateway
pub struct HttpMessagingGateway {
    endpoint: String,
    client: Client,
}

impl HttpMessagingGateway {
    pub fn new(config: &DeliveryConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build().map_err(|e| {
            KioskError::component("delivery".to_string(), format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(Self {
            endpoint: config.gateway_endpoint.clone(),
            client,
        })
    }
}

#[async_trait]
impl MessagingGateway for HttpMessagingGateway {
    async fn send(
        &self,
        request: &MessageRequest,
    ) -> std::result::Result<Option<String>, DeliveryError> {
        info!("Sending message to {} via {}", request.destination, request.channel_id);

        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| DeliveryError::gateway(format!("Failed to reach messaging gateway: {}", e)))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            DeliveryError::gateway(format!("Failed to read messaging gateway response: {}", e))
        })?;

        debug!("Messaging gateway answered {}", status);
        parse_gateway_response(status, &body)
    }
}

/// Interpret a messaging gateway reply. Gateway-reported errors are passed
/// through verbatim.
pub(crate) fn parse_gateway_response(
    status: StatusCode,
    body: &str,
) -> std::result::Result<Option<String>, DeliveryError> {
    let parsed = serde_json::from_str::<GatewayResponse>(body).ok();

    match parsed {
        Some(response) if status.is_success() && response.success => Ok(response.message_id),
        Some(GatewayResponse {
            error: Some(error), ..
        }) => Err(DeliveryError::gateway(error)),
        _ if status.is_success() => Err(DeliveryError::gateway("Message was not sent")),
        _ => Err(DeliveryError::gateway(format!("HTTP {}", status))),
    }
}
