use crate::config::GenerationConfig;
use crate::error::{GenerationError, KioskError, Result};
use crate::frame::ImageData;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Body of a generation request. The photo is sent exactly as captured.
#[derive(Debug, Clone, Serialize)]
pub struct AvatarRequest {
    pub image: ImageData,
    pub style: String,
}

/// External avatar generation service
#[async_trait]
pub trait AvatarService: Send + Sync {
    async fn generate(&self, request: &AvatarRequest) -> std::result::Result<ImageData, GenerationError>;
}

#[derive(Debug, Deserialize)]
struct AvatarResponse {
    #[serde(rename = "generatedImage", default)]
    generated_image: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// HTTP client for the avatar generation endpoint
pub struct HttpAvatarService {
    endpoint: String,
    client: Client,
    timeout: Option<Duration>,
}

impl HttpAvatarService {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let timeout = config.request_timeout_secs.map(Duration::from_secs);

        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            KioskError::component("generation".to_string(), format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(Self {
            endpoint: config.endpoint.clone(),
            client,
            timeout,
        })
    }
}

#[async_trait]
impl AvatarService for HttpAvatarService {
    async fn generate(&self, request: &AvatarRequest) -> std::result::Result<ImageData, GenerationError> {
        info!(
            "Requesting avatar (style: {}, photo: {} bytes)",
            request.style,
            request.image.len()
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::service(format!(
                        "request timed out after {:?}",
                        self.timeout.unwrap_or_default()
                    ))
                } else if e.is_connect() {
                    GenerationError::service(format!("connection failed: {}", e))
                } else {
                    GenerationError::service(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GenerationError::service(format!("failed to read response: {}", e)))?;

        debug!("Avatar service answered {} ({} bytes)", status, body.len());
        parse_avatar_response(status, &body)
    }
}

/// Interpret an avatar service reply
pub(crate) fn parse_avatar_response(
    status: StatusCode,
    body: &str,
) -> std::result::Result<ImageData, GenerationError> {
    let parsed = serde_json::from_str::<AvatarResponse>(body).ok();

    if !status.is_success() {
        let reason = parsed
            .and_then(|r| r.error.or(r.message))
            .unwrap_or_else(|| format!("HTTP {}", status));
        return Err(GenerationError::ServiceError { reason });
    }

    let response = parsed.ok_or(GenerationError::EmptyResponse)?;

    match response.generated_image {
        Some(image) if !image.is_empty() => {
            ImageData::from_data_url(image).ok_or(GenerationError::EmptyResponse)
        }
        _ => match response.error.or(response.message) {
            Some(reason) => Err(GenerationError::ServiceError { reason }),
            None => Err(GenerationError::EmptyResponse),
        },
    }
}
