//! Error types for hostsync
//!
//! This module defines the error types used throughout the crate. Object
//! admission failures are a separate, non-fatal type ([`Rejection`]) because
//! they carry the identity needed for cleanup.

use thiserror::Error;

/// Result type alias for hostsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for hostsync
#[derive(Error, Debug)]
pub enum Error {
    /// Snapshot sink errors (write or reload failed)
    #[error("Sink error: {0}")]
    Sink(String),

    /// Resource subscription errors (setup failed or stream ended)
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors (files, child processes)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Sink-specific error
    #[error("Sink error ({sink}): {message}")]
    SinkFailed {
        /// Sink name
        sink: String,
        /// Error message
        message: String,
    },

    /// Plugin not found in the registry
    #[error("Not found: {0}")]
    NotFound(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a sink error
    pub fn sink(msg: impl Into<String>) -> Self {
        Self::Sink(msg.into())
    }

    /// Create a subscription error
    pub fn subscription(msg: impl Into<String>) -> Self {
        Self::Subscription(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a sink-specific error
    pub fn sink_failed(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkFailed {
            sink: sink.into(),
            message: message.into(),
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

/// An object was not admitted by a projector
///
/// Rejections are never fatal. When the identity of the object could still
/// be computed it is carried along, so the caller can remove an entry that
/// was accepted earlier and has since become inadmissible.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct Rejection {
    /// Identity of the rejected object, if it could be computed
    pub identity: Option<String>,
    /// Human-readable rejection reason
    pub reason: String,
}

impl Rejection {
    /// Rejection for an object whose identity is known
    pub fn of(identity: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            identity: Some(identity.into()),
            reason: reason.into(),
        }
    }

    /// Rejection for an object of the wrong kind (no identity)
    pub fn type_mismatch(reason: impl Into<String>) -> Self {
        Self {
            identity: None,
            reason: reason.into(),
        }
    }
}
