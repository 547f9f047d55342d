//! Error types for configuration and transport failures.
//!
//! None of these errors ever escapes the public operations of
//! [`Marku`](crate::Marku): batchers convert them into element state and
//! notifications. They are still typed so that custom [`Transport`]
//! implementations and embedders can report and match on them.
//!
//! # Example
//!
//! ```rust
//! use marku::error::{ConfigError, TransportError};
//!
//! let err = TransportError::from(ConfigError::MissingSiteId);
//! assert_eq!(err.to_string(), "configuration error: siteId is required");
//! ```
//!
//! [`Transport`]: crate::transport::Transport

use std::time::Duration;
use thiserror::Error;

/// A required configuration field is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The site identifier is empty.
    #[error("siteId is required")]
    MissingSiteId,

    /// The API base URL is empty.
    #[error("apiBaseUrl is required")]
    MissingApiBaseUrl,
}

/// Failure of a single batch exchange with the backend.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The call was refused locally because the configuration is incomplete.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The endpoint URL could not be built from the API base URL.
    #[error("invalid endpoint url: {0}")]
    Url(#[from] url::ParseError),

    /// The request could not be sent or the connection failed.
    #[error("request failed: {0}")]
    Request(String),

    /// The server answered with a non-success HTTP status.
    #[error("http error: status {0}")]
    Status(u16),

    /// The response body is not a valid envelope.
    #[error("malformed response: {0}")]
    Decode(String),

    /// No response arrived in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The envelope was decoded but carries a non-success code.
    #[error(
        "server rejected batch with code {code}: {}",
        .message.as_deref().unwrap_or("(no message)")
    )]
    Rejected {
        /// Application-level status code from the envelope.
        code: i64,
        /// Optional message from the envelope.
        message: Option<String>,
    },
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::Decode(err.to_string())
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            TransportError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            TransportError::Status(status.as_u16())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
