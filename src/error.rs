use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KioskError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl KioskError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Failures of the camera acquisition engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("Camera permission denied: {details}")]
    PermissionDenied { details: String },

    #[error("No camera device found: {details}")]
    DeviceNotFound { details: String },

    #[error("Camera device does not support the requested stream: {details}")]
    DeviceUnsupported { details: String },

    #[error("Camera did not report usable frame dimensions within {timeout:?}")]
    InitializationTimeout { timeout: Duration },

    #[error("Camera not ready for capture: {reason}")]
    CaptureNotReady { reason: String },
}

impl CameraError {
    /// Text shown on the camera screen next to the retry affordance
    pub fn user_message(&self) -> String {
        match self {
            CameraError::PermissionDenied { .. } => {
                "Camera access was denied. Please allow camera access and try again.".to_string()
            }
            CameraError::DeviceNotFound { .. } => {
                "No camera was found. Please connect a camera and try again.".to_string()
            }
            CameraError::DeviceUnsupported { .. } => {
                "This camera is not supported.".to_string()
            }
            CameraError::InitializationTimeout { .. } => {
                "The camera took too long to start. Please try again.".to_string()
            }
            CameraError::CaptureNotReady { .. } => {
                "The camera is not ready yet. Please try again in a moment.".to_string()
            }
        }
    }

    /// Whether a later constraint in the fallback ladder may still succeed
    pub fn allows_fallback(&self) -> bool {
        matches!(
            self,
            CameraError::DeviceUnsupported { .. } | CameraError::DeviceNotFound { .. }
        )
    }

    /// Denied access needs an operator to change permissions before a retry
    /// can succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, CameraError::PermissionDenied { .. })
    }
}

/// Failures of a generation attempt
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Generation requires both a photo and a style")]
    MissingInput,

    #[error("Avatar service error: {reason}")]
    ServiceError { reason: String },

    #[error("Avatar service returned no image")]
    EmptyResponse,
}

impl GenerationError {
    pub fn service<S: Into<String>>(reason: S) -> Self {
        Self::ServiceError {
            reason: reason.into(),
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            GenerationError::MissingInput => {
                "A photo and a style are needed before we can create your avatar.".to_string()
            }
            GenerationError::ServiceError { reason } => {
                format!("We couldn't create your avatar: {}", reason)
            }
            GenerationError::EmptyResponse => {
                "We couldn't create your avatar. Showing your original photo instead.".to_string()
            }
        }
    }
}

/// Failures of print or message delivery
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("No image available to deliver")]
    NoImage,

    #[error("Invalid delivery destination: {destination:?}")]
    InvalidDestination { destination: String },

    #[error("Messaging gateway error: {message}")]
    GatewayError { message: String },

    #[error("Printing failed: {details}")]
    PrintFailed { details: String },

    #[error("A delivery is already in progress")]
    Busy,
}

impl DeliveryError {
    pub fn gateway<S: Into<String>>(message: S) -> Self {
        Self::GatewayError {
            message: message.into(),
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            DeliveryError::NoImage => "There is no picture to deliver yet.".to_string(),
            DeliveryError::InvalidDestination { .. } => {
                "Please enter a valid destination.".to_string()
            }
            DeliveryError::GatewayError { message } => message.clone(),
            DeliveryError::PrintFailed { .. } => "Printing failed. Please try again.".to_string(),
            DeliveryError::Busy => "Still sending, please wait.".to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Event receiver lagged behind by {skipped} events")]
    Lagged { skipped: u64 },

    #[error("Event bus closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, KioskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_error_fallback_policy() {
        assert!(CameraError::DeviceUnsupported {
            details: "1080p".to_string()
        }
        .allows_fallback());
        assert!(!CameraError::PermissionDenied {
            details: "denied".to_string()
        }
        .allows_fallback());
        assert!(!CameraError::InitializationTimeout {
            timeout: Duration::from_secs(10)
        }
        .allows_fallback());
    }

    #[test]
    fn test_denied_camera_is_not_retryable() {
        assert!(!CameraError::PermissionDenied {
            details: "denied".to_string()
        }
        .is_retryable());
        assert!(CameraError::InitializationTimeout {
            timeout: Duration::from_secs(10)
        }
        .is_retryable());
        assert!(CameraError::DeviceNotFound {
            details: "unplugged".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn test_gateway_message_is_verbatim() {
        let err = DeliveryError::gateway("Recipient blocked the bot");
        assert_eq!(err.user_message(), "Recipient blocked the bot");
    }

    #[test]
    fn test_error_conversion() {
        let err: KioskError = GenerationError::MissingInput.into();
        assert!(matches!(
            err,
            KioskError::Generation(GenerationError::MissingInput)
        ));
        assert!(err.to_string().contains("photo and a style"));
    }
}
