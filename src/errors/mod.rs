//! Error types for the FastGPT client.
//!
//! The taxonomy separates failures that must reach the caller (configuration
//! problems, errors reported by the upstream workflow) from transport-class
//! failures, which the streaming client retries and finally absorbs into a
//! degraded answer.

use thiserror::Error;

use crate::transport::TransportError;

/// Result type alias for FastGPT operations.
pub type FastGptResult<T> = Result<T, FastGptError>;

/// Error type for FastGPT client operations.
#[derive(Debug, Clone, Error)]
pub enum FastGptError {
    /// Configuration error (missing endpoint, API key or app id).
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message describing the configuration issue.
        message: String,
    },

    /// Non-success HTTP status.
    #[error("Server error (HTTP {status_code}): {message}")]
    Server {
        /// Error message.
        message: String,
        /// HTTP status code.
        status_code: u16,
    },

    /// A streaming response that is not an event stream.
    #[error("Expected event stream but got: {content_type}")]
    ContentType {
        /// The content type the server returned.
        content_type: String,
    },

    /// Network/connection error.
    #[error("Network error: {message}")]
    Network {
        /// Error message.
        message: String,
    },

    /// Timeout error.
    #[error("Request timeout: {message}")]
    Timeout {
        /// Error message.
        message: String,
    },

    /// Read failure while consuming a response body.
    #[error("Stream error: {message}")]
    Stream {
        /// Error message.
        message: String,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message.
        message: String,
    },

    /// Error reported by the upstream workflow in an `error` frame.
    #[error("{message}")]
    Upstream {
        /// Message extracted from the frame payload.
        message: String,
    },

    /// The caller canceled the exchange.
    #[error("Request canceled")]
    Canceled,
}

impl FastGptError {
    /// Returns true if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FastGptError::Server { .. }
                | FastGptError::ContentType { .. }
                | FastGptError::Network { .. }
                | FastGptError::Timeout { .. }
                | FastGptError::Stream { .. }
        )
    }

    /// Returns true for transport-class failures, the ones a streaming call
    /// absorbs into a degraded answer once retries are exhausted.
    pub fn is_transport(&self) -> bool {
        self.is_retryable()
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        FastGptError::Configuration {
            message: message.into(),
        }
    }

    /// Creates a server error.
    pub fn server(status_code: u16, message: impl Into<String>) -> Self {
        FastGptError::Server {
            message: message.into(),
            status_code,
        }
    }

    /// Creates an upstream-reported error.
    pub fn upstream(message: impl Into<String>) -> Self {
        FastGptError::Upstream {
            message: message.into(),
        }
    }

    /// Short machine-friendly label, used as a metrics key.
    pub fn kind(&self) -> &'static str {
        match self {
            FastGptError::Configuration { .. } => "configuration",
            FastGptError::Server { .. } => "server",
            FastGptError::ContentType { .. } => "content_type",
            FastGptError::Network { .. } => "network",
            FastGptError::Timeout { .. } => "timeout",
            FastGptError::Stream { .. } => "stream",
            FastGptError::Serialization { .. } => "serialization",
            FastGptError::Upstream { .. } => "upstream",
            FastGptError::Canceled => "canceled",
        }
    }
}

impl From<TransportError> for FastGptError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout { timeout } => FastGptError::Timeout {
                message: format!("no response within {timeout:?}"),
            },
            TransportError::Connection { message } | TransportError::Tls { message } => {
                FastGptError::Network { message }
            }
            TransportError::InvalidResponse { message } => FastGptError::Stream { message },
        }
    }
}

impl From<reqwest::Error> for FastGptError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FastGptError::Timeout {
                message: err.to_string(),
            }
        } else if err.is_connect() {
            FastGptError::Network {
                message: err.to_string(),
            }
        } else if let Some(status) = err.status() {
            FastGptError::server(status.as_u16(), err.to_string())
        } else {
            FastGptError::Stream {
                message: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for FastGptError {
    fn from(err: serde_json::Error) -> Self {
        FastGptError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<url::ParseError> for FastGptError {
    fn from(err: url::ParseError) -> Self {
        FastGptError::Configuration {
            message: format!("Invalid URL: {err}"),
        }
    }
}
