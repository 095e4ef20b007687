//! Shared connection lifecycle.
//!
//! [`ConnectionManager`] owns the one transport every consumer shares. It
//! opens the socket on first subscription, replaces it after abnormal
//! closes, and gives up after a bounded number of attempts.
//!
//! # State Machine
//!
//! ```text
//! Disconnected ──subscribe──► Connecting ──open──► Connected
//!                                  ▲                   │
//!                                  │ delay      close != 1000
//!                                  │                   ▼
//!                             Reconnecting ◄─── attempts < max
//!                                                      │ attempts == max
//!                                                      ▼
//!                                                   Failed ──reconnect()──► Connecting
//!
//! Connected ──close 1000──► Disconnected
//! any ──socket error──► Error (transient)
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::client::ClientOptions;
use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;

use super::connection::{CLOSE_NORMAL, CloseInfo, Connection, TransportEvent};
use super::status::{ConnectionStatus, StatusPublisher, Subscription};

// ============================================================================
// ConnectionSnapshot
// ============================================================================

/// Point-in-time view of the manager, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    /// Current status.
    pub status: ConnectionStatus,
    /// Most recent transport error.
    pub last_error: Option<String>,
    /// Reconnect attempts since the last successful open.
    pub reconnect_attempts: u32,
    /// ID of the live transport, if one is open.
    pub connection_id: Option<ConnectionId>,
}

// ============================================================================
// Types
// ============================================================================

/// Mutable lifecycle state. Never held across an await.
#[derive(Default)]
struct ManagerState {
    /// Reconnect attempts since the last successful open.
    attempts: u32,
    /// Most recent transport error.
    last_error: Option<String>,
    /// Running supervisor task.
    supervisor: Option<JoinHandle<()>>,
    /// Bumped on every manual reconnect or close; stale supervisors exit.
    generation: u64,
}

/// Shared state behind every clone of a [`ConnectionManager`].
struct ManagerInner {
    options: ClientOptions,
    publisher: Arc<StatusPublisher>,
    state: Mutex<ManagerState>,
}

// ============================================================================
// ConnectionManager
// ============================================================================

/// Owner of the single shared transport.
///
/// Clones share the same transport. Only the manager opens, closes or
/// replaces it; consumers get [`Connection`] handles that can send but not
/// close.
///
/// # Example
///
/// ```no_run
/// use easyshifts_link::{ClientOptions, ConnectionManager, ConnectionStatus};
///
/// # async fn example() -> easyshifts_link::Result<()> {
/// let manager = ConnectionManager::new(ClientOptions::new("ws://localhost:8080")?);
/// let mut subscription = manager.subscribe();
/// subscription.wait_for(ConnectionStatus::is_open).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.inner.options.url.as_str())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ConnectionManager - Public API
// ============================================================================

impl ConnectionManager {
    /// Creates a manager. Nothing is opened until the first subscription.
    #[must_use]
    pub fn new(options: ClientOptions) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                options,
                publisher: Arc::new(StatusPublisher::new(ConnectionStatus::Disconnected)),
                state: Mutex::new(ManagerState::default()),
            }),
        }
    }

    /// Returns the configuration in use.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    /// Subscribes to the shared connection, opening it if needed.
    ///
    /// Idempotent: concurrent callers share one transport, and nothing new
    /// is started while an attempt is in flight or after retries ran out.
    /// Must be called from within a tokio runtime.
    pub fn subscribe(&self) -> Subscription {
        self.ensure_started();
        Subscription::new(Arc::clone(&self.inner.publisher))
    }

    /// Returns the current status.
    #[inline]
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.inner.publisher.status()
    }

    /// Returns the live transport, if one is open.
    #[inline]
    #[must_use]
    pub fn connection(&self) -> Option<Connection> {
        self.inner.publisher.connection()
    }

    /// Returns every later status change, in order. Starts nothing.
    #[inline]
    #[must_use]
    pub fn transitions(&self) -> broadcast::Receiver<ConnectionStatus> {
        self.inner.publisher.transitions()
    }

    /// Returns the live transport or fails without queueing.
    ///
    /// # Errors
    ///
    /// - [`Error::ReconnectExhausted`] after retries ran out
    /// - [`Error::NotConnected`] otherwise
    pub fn require_connection(&self) -> Result<Connection> {
        if let Some(connection) = self.connection() {
            return Ok(connection);
        }
        if self.status() == ConnectionStatus::Failed {
            return Err(Error::ReconnectExhausted {
                attempts: self.reconnect_attempts(),
            });
        }
        Err(Error::NotConnected)
    }

    /// Returns reconnect attempts since the last successful open.
    #[inline]
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.state.lock().attempts
    }

    /// Returns the most recent transport error.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.inner.state.lock().last_error.clone()
    }

    /// Returns a point-in-time view of the manager.
    #[must_use]
    pub fn snapshot(&self) -> ConnectionSnapshot {
        let (attempts, last_error) = {
            let state = self.inner.state.lock();
            (state.attempts, state.last_error.clone())
        };
        ConnectionSnapshot {
            status: self.status(),
            last_error,
            reconnect_attempts: attempts,
            connection_id: self.connection().map(|c| c.id()),
        }
    }

    /// Drops the current transport and connects again immediately.
    ///
    /// Cancels any scheduled retry and resets the attempt counter. This is
    /// the only way out of [`ConnectionStatus::Failed`].
    pub fn reconnect(&self) {
        info!("Manual reconnect requested");
        let generation = self.stop(CLOSE_NORMAL);
        self.spawn_supervisor(generation);
    }

    /// Closes the transport for good and stops reconnecting.
    pub fn close(&self) {
        info!("Closing shared connection");
        self.stop(CLOSE_NORMAL);
        self.inner.publisher.publish(ConnectionStatus::Disconnected);
    }
}

// ============================================================================
// ConnectionManager - Lifecycle
// ============================================================================

impl ConnectionManager {
    /// Starts the supervisor unless one is running or retries ran out.
    fn ensure_started(&self) {
        let mut state = self.inner.state.lock();

        if let Some(task) = &state.supervisor
            && !task.is_finished()
        {
            return;
        }
        if self.inner.publisher.status() == ConnectionStatus::Failed {
            debug!("Not reconnecting automatically from failed state");
            return;
        }

        let generation = state.generation;
        state.supervisor = Some(tokio::spawn(Self::supervise(
            Arc::clone(&self.inner),
            generation,
        )));
    }

    /// Stops the supervisor and closes the transport.
    ///
    /// Returns the new generation.
    fn stop(&self, code: u16) -> u64 {
        let (task, connection, generation) = {
            let mut state = self.inner.state.lock();
            state.generation += 1;
            state.attempts = 0;
            state.last_error = None;
            (
                state.supervisor.take(),
                self.inner.publisher.take(),
                state.generation,
            )
        };

        if let Some(task) = task {
            task.abort();
        }
        if let Some(connection) = connection {
            debug!(connection = %connection.id(), "Closing transport");
            connection.shutdown(code);
        }
        generation
    }

    fn spawn_supervisor(&self, generation: u64) {
        let task = tokio::spawn(Self::supervise(Arc::clone(&self.inner), generation));

        let mut state = self.inner.state.lock();
        if state.generation == generation {
            state.supervisor = Some(task);
        } else {
            task.abort();
        }
    }

    /// Drives connect, watch, retry until a normal close or retries run out.
    async fn supervise(inner: Arc<ManagerInner>, generation: u64) {
        loop {
            if !inner.publish(generation, ConnectionStatus::Connecting) {
                return;
            }

            let close = match Connection::open(&inner.options).await {
                Ok((connection, events)) => {
                    let id = connection.id();
                    if !inner.install(generation, connection.clone()) {
                        connection.shutdown(CLOSE_NORMAL);
                        return;
                    }
                    info!(connection = %id, url = inner.options.url.as_str(), "Connected");

                    let close = inner.watch_transport(generation, events).await;
                    inner.uninstall(generation, id);
                    close
                }
                Err(e) => {
                    warn!(error = %e, "Connection attempt failed");
                    inner.record_error(generation, e.to_string());
                    CloseInfo::abnormal(e.to_string())
                }
            };

            if close.is_normal() {
                info!("Connection closed normally");
                inner.publish(generation, ConnectionStatus::Disconnected);
                return;
            }

            let Some(attempt) = inner.next_attempt(generation) else {
                return;
            };

            let delay = inner.options.reconnect_policy.delay_for(attempt);
            info!(
                attempt,
                max = inner.options.max_reconnect_attempts,
                delay_ms = delay.as_millis() as u64,
                code = close.code,
                "Scheduling reconnect"
            );
            sleep(delay).await;
        }
    }
}

// ============================================================================
// ManagerInner
// ============================================================================

impl ManagerInner {
    /// Publishes `status` if `generation` is still current.
    fn publish(&self, generation: u64, status: ConnectionStatus) -> bool {
        let state = self.state.lock();
        if state.generation != generation {
            return false;
        }
        self.publisher.publish(status);
        true
    }

    /// Installs an opened transport and resets the attempt counter.
    fn install(&self, generation: u64, connection: Connection) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation {
            return false;
        }

        state.attempts = 0;
        state.last_error = None;
        if let Some(previous) = self.publisher.install(connection) {
            previous.shutdown(CLOSE_NORMAL);
        }
        self.publisher.publish(ConnectionStatus::Connected);
        true
    }

    /// Removes the transport if it is still the one installed.
    fn uninstall(&self, generation: u64, id: ConnectionId) {
        let state = self.state.lock();
        if state.generation != generation {
            return;
        }
        if self.publisher.connection().is_none_or(|c| c.id() == id) {
            self.publisher.take();
        }
    }

    /// Publishes `Error`. Leaves the attempt counter and transport alone.
    fn record_error(&self, generation: u64, message: String) {
        let mut state = self.state.lock();
        if state.generation != generation {
            return;
        }
        state.last_error = Some(message);
        self.publisher.publish(ConnectionStatus::Error);
    }

    /// Counts one more attempt, or moves to `Failed` when none remain.
    fn next_attempt(&self, generation: u64) -> Option<u32> {
        let mut state = self.state.lock();
        if state.generation != generation {
            return None;
        }

        if state.attempts >= self.options.max_reconnect_attempts {
            warn!(
                attempts = state.attempts,
                "Max reconnection attempts reached"
            );
            self.publisher.publish(ConnectionStatus::Failed);
            return None;
        }

        state.attempts += 1;
        self.publisher.publish(ConnectionStatus::Reconnecting);
        Some(state.attempts)
    }

    /// Follows one transport until it closes.
    async fn watch_transport(
        &self,
        generation: u64,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> CloseInfo {
        loop {
            match events.recv().await {
                Some(TransportEvent::Error(message)) => self.record_error(generation, message),
                Some(TransportEvent::Closed(info)) => return info,
                None => return CloseInfo::abnormal("event loop ended"),
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
