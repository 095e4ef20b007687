//! EasyShifts link - Multiplexed WebSocket client for the EasyShifts backend.
//!
//! Every business operation of the EasyShifts staffing application travels
//! over one shared WebSocket. Requests carry an integer `request_id`; the
//! backend echoes it on the response, and this crate routes each response
//! to whoever is waiting on that ID.
//!
//! # Architecture
//!
//! - **Connection Manager**: owns the single socket, reconnects after
//!   abnormal closes, gives up after a bounded number of attempts
//! - **Status Publisher**: broadcasts connection status to any number of
//!   independent subscribers
//! - **Correlator**: attaches a listener before each send, delivers only
//!   frames whose `request_id` matches, detaches exactly once
//! - **Authentication Handshake**: replays the stored session on every
//!   freshly opened socket
//!
//! # Quick Start
//!
//! ```no_run
//! use easyshifts_link::{Client, RequestKind, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::builder().url("ws://localhost:8080").build()?;
//!
//!     let mut status = client.start();
//!     status.wait_for(|s| s.is_open()).await?;
//!     client.auth().settled().await?;
//!
//!     let jobs = client.request(RequestKind::ListJobs, None).await?;
//!     println!("{jobs}");
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`auth`] | Login handshake and session persistence |
//! | [`client`] | [`Client`] facade and configuration |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Request kinds and message envelopes |
//! | [`transport`] | Socket, correlation and reconnect handling |

// ============================================================================
// Modules
// ============================================================================

/// Login handshake and session persistence.
pub mod auth;

/// Client facade and configuration.
///
/// Use [`Client::builder()`] to create a configured client.
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
///
/// Newtype wrappers keep wire IDs, listener handles and transport IDs apart.
pub mod identifiers;

/// Request kinds and message envelopes.
pub mod protocol;

/// WebSocket transport layer.
///
/// Shared connection, reconnect state machine and response correlation.
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Re-exports
// ============================================================================

// Auth types
pub use auth::{
    AuthHandshake, AuthState, AuthenticatedUser, FileSessionStore, MemorySessionStore, Session,
    SessionStore,
};

// Client types
pub use client::{Client, ClientBuilder, ClientOptions, ReconnectPolicy};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ConnectionId, ListenerId, RequestId};

// Protocol types
pub use protocol::{Inbound, Request, RequestKind, Response};

// Transport types
pub use transport::{
    Connection, ConnectionManager, ConnectionSnapshot, ConnectionStatus, PendingRequest,
    Subscription,
};
