//! Error handling for the gateway.

use std::{string::FromUtf8Error, time::Duration};

use thiserror::Error;

/// The main result type used throughout the gateway.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Every failure the gateway can produce.
///
/// Only the request-level variants (`NotConnected`, `ConnectionLost`,
/// `Remote`, `CapacityExceeded`) ever reach application code through
/// [`Gateway::send_message`](crate::Gateway::send_message). Transport and
/// frame errors are recovered internally and only show up in logs and in
/// the `CLOSED` event.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// A request was issued while the connection was not open.
    #[error("Not connected to the backend")]
    NotConnected,

    /// The connection dropped before the request was acknowledged.
    #[error("Connection lost: {reason}")]
    ConnectionLost { reason: String },

    /// The server acknowledged the action with an error status.
    #[error("Action {action} failed: {message}")]
    Remote { action: String, message: String },

    /// Too many requests are awaiting acknowledgement.
    #[error("Too many pending requests (limit {limit})")]
    CapacityExceeded { limit: usize },

    /// Underlying socket error or closure.
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Inbound data that could not be parsed into a message.
    #[error("Malformed frame: {message}")]
    MalformedFrame { message: String },

    /// Inbound message whose type is not recognized.
    #[error("Unknown message type: {message_type}")]
    UnknownMessageType { message_type: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Timeout errors
    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Internal errors (should not happen in normal operation)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl From<FromUtf8Error> for GatewayError {
    fn from(e: FromUtf8Error) -> Self {
        Self::MalformedFrame {
            message: e.to_string(),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for GatewayError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport {
            message: e.to_string(),
        }
    }
}

impl GatewayError {
    /// Create a connection-lost error.
    pub fn connection_lost(reason: impl Into<String>) -> Self {
        Self::ConnectionLost {
            reason: reason.into(),
        }
    }

    /// Create a remote (acknowledged with error) failure.
    pub fn remote(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            action: action.into(),
            message: message.into(),
        }
    }

    /// Create a capacity error.
    pub fn capacity_exceeded(limit: usize) -> Self {
        Self::CapacityExceeded { limit }
    }

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a malformed-frame error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedFrame {
            message: message.into(),
        }
    }

    /// Create an unknown-message-type error.
    pub fn unknown_message_type(message_type: impl Into<String>) -> Self {
        Self::UnknownMessageType {
            message_type: message_type.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { duration }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the caller may reasonably re-issue the request once the
    /// connection is open again.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::ConnectionLost { .. } | Self::CapacityExceeded { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = GatewayError::config("URL cannot be empty");
        assert!(matches!(err, GatewayError::Config { .. }));

        let err = GatewayError::timeout(Duration::from_secs(5));
        assert!(matches!(err, GatewayError::Timeout { .. }));

        let err = GatewayError::remote("TAG_NEW", "tag exists");
        assert_eq!(err.to_string(), "Action TAG_NEW failed: tag exists");
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(GatewayError::NotConnected.is_recoverable());
        assert!(GatewayError::connection_lost("closed").is_recoverable());
        assert!(GatewayError::capacity_exceeded(10).is_recoverable());
        assert!(!GatewayError::remote("TAG_NEW", "bad color").is_recoverable());
        assert!(!GatewayError::malformed("eof").is_recoverable());
    }

    #[test]
    fn test_utf8_error_is_malformed_frame() {
        let err: GatewayError = String::from_utf8(vec![0xff, 0xfe]).unwrap_err().into();
        assert!(matches!(err, GatewayError::MalformedFrame { .. }));
    }
}
