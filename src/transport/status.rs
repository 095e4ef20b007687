//! Connection status publishing.
//!
//! [`StatusPublisher`] is the single place that holds the current
//! [`ConnectionStatus`] and the live [`Connection`]. Any number of
//! [`Subscription`]s read from it without knowing about each other.
//!
//! A subscription sees the latest status and may skip intermediate ones.
//! [`StatusPublisher::transitions`] yields every change in order, for
//! consumers that log or audit the lifecycle.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::error::{Error, Result};

use super::Connection;

// ============================================================================
// Constants
// ============================================================================

/// Transitions buffered per lagging [`StatusPublisher::transitions`] receiver.
const TRANSITION_BUFFER: usize = 64;

// ============================================================================
// ConnectionStatus
// ============================================================================

/// Lifecycle state of the shared transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// A socket is being opened.
    Connecting,
    /// The socket is open.
    Connected,
    /// Waiting out the delay before the next attempt.
    Reconnecting,
    /// Closed normally, or never opened.
    Disconnected,
    /// Retries exhausted; needs a manual reconnect.
    Failed,
    /// The socket reported an error. Transient; a close usually follows.
    Error,
}

impl ConnectionStatus {
    /// Returns `true` if requests can be sent.
    #[inline]
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns `true` if only a manual reconnect leaves this state.
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Returns the lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// StatusPublisher
// ============================================================================

/// Broadcasts status changes and hands out the live transport.
pub struct StatusPublisher {
    status: watch::Sender<ConnectionStatus>,
    transitions: broadcast::Sender<ConnectionStatus>,
    live: RwLock<Option<Connection>>,
}

impl StatusPublisher {
    /// Creates a publisher in the given state with no transport.
    #[must_use]
    pub fn new(initial: ConnectionStatus) -> Self {
        let (status, _) = watch::channel(initial);
        let (transitions, _) = broadcast::channel(TRANSITION_BUFFER);
        Self {
            status,
            transitions,
            live: RwLock::new(None),
        }
    }

    /// Returns the current status.
    #[inline]
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Publishes a status. Returns `true` if it changed.
    pub fn publish(&self, next: ConnectionStatus) -> bool {
        let changed = self.status.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            debug!(from = %current, to = %next, "Connection status changed");
            *current = next;
            true
        });
        if changed {
            // No receivers is fine.
            let _ = self.transitions.send(next);
        }
        changed
    }

    /// Returns a receiver that observes every later change.
    #[inline]
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Returns a receiver that yields every later change, in order.
    ///
    /// Unlike [`watch`](Self::watch), nothing is coalesced. A receiver that
    /// falls more than 64 changes behind gets
    /// [`RecvError::Lagged`](broadcast::error::RecvError::Lagged).
    #[inline]
    #[must_use]
    pub fn transitions(&self) -> broadcast::Receiver<ConnectionStatus> {
        self.transitions.subscribe()
    }

    /// Returns the live transport, if one is open.
    #[must_use]
    pub fn connection(&self) -> Option<Connection> {
        self.live
            .read()
            .as_ref()
            .filter(|connection| connection.is_open())
            .cloned()
    }

    /// Installs a new transport, returning the one it replaced.
    pub(crate) fn install(&self, connection: Connection) -> Option<Connection> {
        self.live.write().replace(connection)
    }

    /// Removes the transport.
    pub(crate) fn take(&self) -> Option<Connection> {
        self.live.write().take()
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// A consumer's view of the shared connection.
///
/// Cheap to create; dropping it has no effect on the transport.
pub struct Subscription {
    publisher: Arc<StatusPublisher>,
    updates: watch::Receiver<ConnectionStatus>,
}

impl Subscription {
    pub(crate) fn new(publisher: Arc<StatusPublisher>) -> Self {
        let updates = publisher.watch();
        Self { publisher, updates }
    }

    /// Returns the current status.
    #[inline]
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        *self.updates.borrow()
    }

    /// Returns the live transport, if one is open.
    #[inline]
    #[must_use]
    pub fn connection(&self) -> Option<Connection> {
        self.publisher.connection()
    }

    /// Waits for the next status change.
    ///
    /// The subscription keeps the publisher alive, so this only resolves
    /// once the status actually changes. Pending forever is possible if
    /// nothing ever publishes again; wrap in a timeout when that matters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] only if the status channel closed,
    /// which cannot happen while this subscription exists.
    pub async fn changed(&mut self) -> Result<ConnectionStatus> {
        self.updates
            .changed()
            .await
            .map_err(|_| Error::connection("status channel closed"))?;
        Ok(*self.updates.borrow_and_update())
    }

    /// Waits until the status satisfies `predicate`.
    ///
    /// Returns immediately if it already does. Dropping the manager does
    /// not end the wait, since the subscription keeps the publisher alive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] only if the status channel closed,
    /// which cannot happen while this subscription exists.
    pub async fn wait_for(
        &mut self,
        mut predicate: impl FnMut(ConnectionStatus) -> bool,
    ) -> Result<ConnectionStatus> {
        let status = self
            .updates
            .wait_for(|status| predicate(*status))
            .await
            .map_err(|_| Error::connection("status channel closed"))?;
        Ok(*status)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
