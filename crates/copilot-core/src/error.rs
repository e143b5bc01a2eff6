//! Error types for the Copilot workspace.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A failure reported by the backend HTTP client.
///
/// Every variant carries enough information (status, message) for the
/// presentation layer to render a user-facing banner.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApiError {
    /// Transport failure (DNS, connection refused, reset) after retries ran out.
    #[error("Network error: {message}")]
    Network { message: String },

    /// 502/503/504 that persisted through every retry.
    #[error("HTTP {status}: {message}")]
    TransientHttp { status: u16, message: String },

    /// Any other non-2xx status. Never retried.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// A 2xx response that announced JSON but could not be parsed.
    #[error("Failed to decode response: {message}")]
    Decode { message: String },
}

impl ApiError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates a Network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates an Http error, promoting gateway statuses to `TransientHttp`
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if is_transient_status(status) {
            Self::TransientHttp { status, message }
        } else {
            Self::Http { status, message }
        }
    }

    /// Creates a Decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    // ============================================================================
    // Accessors
    // ============================================================================

    /// HTTP status, if the failure came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::TransientHttp { status, .. } | Self::Http { status, .. } => Some(*status),
            Self::Network { .. } | Self::Decode { .. } => None,
        }
    }

    /// The text shown to the user in the error banner.
    ///
    /// For HTTP failures this is the backend's `detail` (or its fallback),
    /// without the status prefix used by `Display`.
    pub fn user_message(&self) -> &str {
        match self {
            Self::Network { message }
            | Self::TransientHttp { message, .. }
            | Self::Http { message, .. }
            | Self::Decode { message } => message,
        }
    }

    /// Check if the failure class is eligible for backoff-and-retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::TransientHttp { .. })
    }

    /// Check if this is a transport-level failure
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }
}

/// Statuses treated as transient gateway failures.
///
/// 500 is deliberately absent: it is terminal.
pub fn is_transient_status(status: u16) -> bool {
    matches!(status, 502..=504)
}

/// A shared error type for the Copilot workspace.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum CopilotError {
    /// Configuration error (invalid config file, bad retry policy)
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization {
        format: String, // "TOML", "JSON"
        message: String,
    },

    /// Backend call failed
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl CopilotError {
    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Check if this is a config error
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

impl From<std::io::Error> for CopilotError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for CopilotError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for CopilotError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

/// A type alias for `Result<T, CopilotError>`.
pub type Result<T> = std::result::Result<T, CopilotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_promotes_gateway_statuses() {
        assert!(matches!(
            ApiError::http(503, "down"),
            ApiError::TransientHttp { status: 503, .. }
        ));
        assert!(matches!(
            ApiError::http(500, "boom"),
            ApiError::Http { status: 500, .. }
        ));
        assert!(!ApiError::http(500, "boom").is_retryable());
        assert!(ApiError::http(504, "slow").is_retryable());
    }

    #[test]
    fn test_user_message_omits_status_prefix() {
        let err = ApiError::http(500, "Internal error");
        assert_eq!(err.user_message(), "Internal error");
        assert_eq!(err.to_string(), "HTTP 500: Internal error");
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn test_network_error_has_no_status() {
        let err = ApiError::network("connection refused");
        assert!(err.is_network());
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_api_error_converts_into_copilot_error() {
        let err: CopilotError = ApiError::decode("bad json").into();
        assert!(matches!(err, CopilotError::Api(ApiError::Decode { .. })));
        assert!(!err.is_config());
    }
}
