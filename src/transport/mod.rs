//! WebSocket transport layer.
//!
//! This module owns the one socket to the backend and correlates responses
//! to the requests that caused them.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                              ┌─────────────────┐
//! │ ConnectionManager│                              │  Backend        │
//! │   StatusPublisher│         WebSocket            │                 │
//! │   → Connection   │◄────────────────────────────►│  /ws            │
//! │     Correlator   │     {"request_id": N, ...}   │                 │
//! └──────────────────┘                              └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `ConnectionManager::subscribe` - First subscriber opens the socket
//! 2. `Connection::dispatch` - Attach a listener, then write the request
//! 3. `Correlator::dispatch` - Route each response to its listeners
//! 4. Abnormal close - Pending requests fail, the manager reconnects
//! 5. `ConnectionManager::close` - Close with 1000, no reconnect
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | WebSocket connection and event loop |
//! | `correlator` | Listener registry keyed by request ID |
//! | `manager` | Shared connection and reconnect state machine |
//! | `status` | Status broadcasting and subscriptions |

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket connection and event loop.
pub mod connection;

/// Listener registry keyed by request ID.
pub mod correlator;

/// Shared connection lifecycle.
pub mod manager;

/// Status broadcasting.
pub mod status;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{CloseInfo, Connection, MessageHandler, PendingRequest, TransportEvent};
pub use correlator::Correlator;
pub use manager::{ConnectionManager, ConnectionSnapshot};
pub use status::{ConnectionStatus, StatusPublisher, Subscription};
