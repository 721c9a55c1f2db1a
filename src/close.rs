//! Close classification
//!
//! Maps a transport close code to terminal or retryable. Two reserved
//! application codes end the connection for good; everything else,
//! including no code at all, is retried identically.

use crate::error::ConnectionError;

/// Reserved close code: authorization denied
pub const CLOSE_UNAUTHORIZED: u16 = 4001;

/// Reserved close code: forbidden
pub const CLOSE_FORBIDDEN: u16 = 4003;

/// Outcome of inspecting a close code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseClass {
    /// Go to Closed, never reconnect, surface the error
    Terminal(ConnectionError),
    /// Hand over to the reconnect policy
    Retryable,
}

/// Classify a close code (`None` for network-level closes and errors)
pub fn classify(code: Option<u16>) -> CloseClass {
    match code {
        Some(CLOSE_UNAUTHORIZED) => CloseClass::Terminal(ConnectionError::Unauthorized),
        Some(CLOSE_FORBIDDEN) => CloseClass::Terminal(ConnectionError::Forbidden),
        _ => CloseClass::Retryable,
    }
}
