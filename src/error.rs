//! Error types for the chat client
//!
//! Defines application-level errors, the consumer-visible connection
//! error state, and command send errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Returned by fallible operations (connecting, encoding, configuration).
/// None of these are fatal to the containing application: the session
/// actor logs them and folds them into the state machine.
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol or handshake error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Base URL could not be parsed
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Base URL uses a scheme that cannot carry a WebSocket
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    /// Base URL cannot have path segments appended
    #[error("URL cannot be used as a base: {0}")]
    CannotBeABase(String),

    /// Frame has no wire representation (the `Unknown` fallback)
    #[error("Frame cannot be encoded: {0}")]
    Unencodable(&'static str),
}

/// Consumer-visible connection error state
///
/// Published in the connection snapshot. Terminal variants persist until
/// the consumer intervenes; `ConnectFailed` is cleared by the next
/// successful open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// Server closed with the authorization-denied code
    #[error("Authorization denied")]
    Unauthorized,

    /// Server closed with the forbidden code
    #[error("Forbidden")]
    Forbidden,

    /// Transport could not even be constructed
    #[error("Connect failed: {0}")]
    ConnectFailed(String),
}

impl ConnectionError {
    /// Whether this error ends the connection for good
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionError::Unauthorized | ConnectionError::Forbidden)
    }
}

/// Command send errors
///
/// Occurs when attempting to send commands to a session that has ended.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_errors() {
        assert!(ConnectionError::Unauthorized.is_terminal());
        assert!(ConnectionError::Forbidden.is_terminal());
        assert!(!ConnectionError::ConnectFailed("refused".to_string()).is_terminal());
    }

    #[test]
    fn test_json_error_converts() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let app: AppError = err.into();
        assert!(app.to_string().starts_with("JSON serialization error"));
    }

    #[test]
    fn test_url_error_converts() {
        let err = url::Url::parse("not a url").unwrap_err();
        let app: AppError = err.into();
        assert!(matches!(app, AppError::InvalidUrl(_)));
    }
}
