//! Error types for the EasyShifts link.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use easyshifts_link::{Client, RequestKind, Result};
//!
//! async fn example(client: &Client) -> Result<()> {
//!     let jobs = client.request(RequestKind::ListJobs, None).await?;
//!     println!("{jobs}");
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Transport | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::NotConnected`], [`Error::ReconnectExhausted`] |
//! | Protocol | [`Error::Protocol`], [`Error::Json`] |
//! | Correlation | [`Error::RequestTimeout`], [`Error::TooManyPending`] |
//! | Business | [`Error::Server`] |
//! | Authentication | [`Error::NoCredentials`], [`Error::AuthRejected`], [`Error::AuthInProgress`], [`Error::AuthTimeout`] |
//! | External | [`Error::Io`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::RequestId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when client configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// WebSocket connection failed.
    ///
    /// Returned when the socket cannot be opened or a frame cannot be written.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Opening the socket took longer than the connect timeout.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// The transport closed while a request was waiting on it.
    #[error("Connection closed")]
    ConnectionClosed,

    /// No open transport exists. Requests are never queued.
    #[error("Not connected")]
    NotConnected,

    /// Automatic reconnection gave up.
    ///
    /// Only a manual reconnect recovers from this state.
    #[error("Reconnection failed after {attempts} attempts")]
    ReconnectExhausted {
        /// Number of attempts made.
        attempts: u32,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation or unexpected payload shape.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Correlation Errors
    // ========================================================================
    /// No matching response arrived in time.
    ///
    /// Distinct from [`Error::Server`]: the server never answered.
    #[error("Request {request_id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The request ID that timed out.
        request_id: RequestId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Too many listeners are already attached to the transport.
    #[error("Too many pending requests: {pending}/{max}")]
    TooManyPending {
        /// Listeners currently attached.
        pending: usize,
        /// Configured maximum.
        max: usize,
    },

    // ========================================================================
    // Business Errors
    // ========================================================================
    /// The server answered with `success: false`.
    ///
    /// The message is passed through verbatim for display.
    #[error("Request {request_id} failed: {message}")]
    Server {
        /// The request ID the server answered.
        request_id: RequestId,
        /// Server-provided error text.
        message: String,
    },

    // ========================================================================
    // Authentication Errors
    // ========================================================================
    /// No stored session to authenticate with.
    #[error("No stored credentials, login required")]
    NoCredentials,

    /// The server rejected the login.
    #[error("Authentication rejected: {message}")]
    AuthRejected {
        /// Reason reported by the server, or a local description.
        message: String,
    },

    /// A handshake is already running.
    #[error("Authentication already in progress")]
    AuthInProgress,

    /// The login response did not arrive within the auth window.
    #[error("Authentication timed out after {timeout_ms}ms")]
    AuthTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(request_id: RequestId, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            request_id,
            timeout_ms,
        }
    }

    /// Creates a server-reported business error.
    #[inline]
    pub fn server(request_id: RequestId, message: impl Into<String>) -> Self {
        Self::Server {
            request_id,
            message: message.into(),
        }
    }

    /// Creates an authentication rejection.
    #[inline]
    pub fn auth_rejected(message: impl Into<String>) -> Self {
        Self::AuthRejected {
            message: message.into(),
        }
    }

    /// Creates an authentication timeout error.
    #[inline]
    pub fn auth_timeout(timeout_ms: u64) -> Self {
        Self::AuthTimeout { timeout_ms }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::RequestTimeout { .. } | Self::AuthTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::NotConnected
                | Self::ReconnectExhausted { .. }
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if the server answered and reported failure.
    #[inline]
    #[must_use]
    pub fn is_business_error(&self) -> bool {
        matches!(self, Self::Server { .. })
    }

    /// Returns `true` if this is an authentication error.
    #[inline]
    #[must_use]
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            Self::NoCredentials
                | Self::AuthRejected { .. }
                | Self::AuthInProgress
                | Self::AuthTimeout { .. }
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::NotConnected
                | Self::RequestTimeout { .. }
                | Self::AuthTimeout { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::connection("refused");
        assert_eq!(err.to_string(), "Connection failed: refused");
    }

    #[test]
    fn test_server_error_passes_message_verbatim() {
        let err = Error::server(RequestId::new(40), "Shift already taken");
        assert_eq!(err.to_string(), "Request 40 failed: Shift already taken");
        assert!(err.is_business_error());
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_timeout_distinct_from_business_error() {
        let timeout = Error::request_timeout(RequestId::new(40), 100);
        let business = Error::server(RequestId::new(40), "nope");

        assert!(timeout.is_timeout());
        assert!(!timeout.is_business_error());
        assert!(business.is_business_error());
        assert!(!business.is_timeout());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::NotConnected.is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(Error::ReconnectExhausted { attempts: 5 }.is_connection_error());
        assert!(!Error::config("x").is_connection_error());
    }

    #[test]
    fn test_is_auth_error() {
        assert!(Error::NoCredentials.is_auth_error());
        assert!(Error::auth_rejected("bad password").is_auth_error());
        assert!(Error::auth_timeout(30_000).is_auth_error());
        assert!(!Error::NotConnected.is_auth_error());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::request_timeout(RequestId::new(1), 10).is_recoverable());
        assert!(!Error::server(RequestId::new(1), "x").is_recoverable());
        assert!(!Error::NoCredentials.is_recoverable());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
