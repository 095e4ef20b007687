//! Client facade.
//!
//! One [`Client`] wires the shared [`ConnectionManager`] to the
//! [`AuthHandshake`]. Clones are cheap and share both.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::auth::{AuthHandshake, AuthState, AuthenticatedUser, SessionStore};
use crate::error::Result;
use crate::protocol::{Request, RequestKind, Response};
use crate::transport::{ConnectionManager, ConnectionStatus, Subscription};

use super::builder::ClientBuilder;
use super::options::ClientOptions;

// ============================================================================
// Client
// ============================================================================

struct ClientInner {
    manager: ConnectionManager,
    auth: AuthHandshake,
}

/// Entry point for talking to the EasyShifts backend.
///
/// # Example
///
/// ```no_run
/// use easyshifts_link::{Client, RequestKind};
/// use serde_json::json;
///
/// # async fn example() -> easyshifts_link::Result<()> {
/// let client = Client::builder().url("ws://localhost:8080").build()?;
/// let mut status = client.start();
/// status.wait_for(|s| s.is_open()).await?;
///
/// client.login("alice", "secret").await?;
/// let shifts = client
///     .request(RequestKind::ListShifts, Some(json!({"week": 12})))
///     .await?;
/// println!("{shifts}");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("status", &self.status())
            .field("auth", &self.auth_state())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Client - Construction
// ============================================================================

impl Client {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Creates a client from resolved options.
    #[must_use]
    pub fn new(options: ClientOptions, store: Arc<dyn SessionStore>) -> Self {
        let manager = ConnectionManager::new(options);
        let auth = AuthHandshake::new(manager.clone(), store);
        Self {
            inner: Arc::new(ClientInner { manager, auth }),
        }
    }

    /// Opens the shared connection and starts the automatic login.
    ///
    /// Idempotent. Must be called from within a tokio runtime.
    pub fn start(&self) -> Subscription {
        debug!(url = self.options().url.as_str(), "Starting client");
        self.inner.auth.start();
        self.inner.manager.subscribe()
    }
}

// ============================================================================
// Client - Accessors
// ============================================================================

impl Client {
    /// Returns the configuration in use.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ClientOptions {
        self.inner.manager.options()
    }

    /// Returns the connection manager.
    #[inline]
    #[must_use]
    pub fn manager(&self) -> &ConnectionManager {
        &self.inner.manager
    }

    /// Returns the authentication handshake.
    #[inline]
    #[must_use]
    pub fn auth(&self) -> &AuthHandshake {
        &self.inner.auth
    }

    /// Returns the connection status.
    #[inline]
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.inner.manager.status()
    }

    /// Returns the authentication state.
    #[inline]
    #[must_use]
    pub fn auth_state(&self) -> AuthState {
        self.inner.auth.state()
    }

    /// Subscribes to connection status, opening the socket if needed.
    #[inline]
    pub fn subscribe(&self) -> Subscription {
        self.inner.manager.subscribe()
    }
}

// ============================================================================
// Client - Requests
// ============================================================================

impl Client {
    /// Sends a named request and returns the response `data`.
    ///
    /// Fails fast when no socket is open; requests are never queued.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::NotConnected`] / [`crate::Error::ReconnectExhausted`] without a socket
    /// - [`crate::Error::RequestTimeout`] if the server never answers
    /// - [`crate::Error::Server`] if the server reports failure
    pub async fn request(&self, kind: RequestKind, data: Option<Value>) -> Result<Value> {
        let request = match data {
            Some(data) => Request::new(kind).data(data),
            None => Request::new(kind),
        };
        self.inner.manager.require_connection()?.call(request).await
    }

    /// Sends a raw request and returns the whole response envelope.
    ///
    /// # Errors
    ///
    /// Same as [`Client::request`], except `success: false` is returned as
    /// an ordinary [`Response`].
    pub async fn send(&self, request: Request) -> Result<Response> {
        self.inner.manager.require_connection()?.send(request).await
    }

    /// Logs in and persists the session.
    ///
    /// # Errors
    ///
    /// See [`AuthHandshake::login`].
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthenticatedUser> {
        self.inner.auth.login(username, password).await
    }

    /// Forgets the persisted session.
    ///
    /// # Errors
    ///
    /// See [`AuthHandshake::logout`].
    pub async fn logout(&self) -> Result<()> {
        self.inner.auth.logout().await
    }

    /// Drops the socket and connects again, resetting the retry counter.
    #[inline]
    pub fn reconnect(&self) {
        self.inner.manager.reconnect();
    }

    /// Closes the socket for good.
    #[inline]
    pub fn close(&self) {
        self.inner.manager.close();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use serde_json::json;

    use crate::Error;
    use crate::auth::{MemorySessionStore, Session};
    use crate::testing::{MockServer, init_tracing};

    async fn started_client(server: &MockServer, store: Arc<MemorySessionStore>) -> Client {
        let client = Client::builder()
            .url(server.base_url())
            .reconnect_delay(Duration::from_millis(10))
            .request_timeout(Duration::from_millis(500))
            .auth_timeout(Duration::from_secs(2))
            .session_store(store)
            .build()
            .expect("build");
        let mut status = client.start();
        status.wait_for(ConnectionStatus::is_open).await.expect("open");
        client
    }

    fn backend() -> crate::testing::Responder {
        Arc::new(|request: Request| -> Option<Value> {
            match request.request_id.kind()? {
                RequestKind::Login => Some(json!({
                    "request_id": 10,
                    "success": true,
                    "data": {"user_exists": true, "is_manager": true}
                })),
                RequestKind::ListJobs => Some(json!({
                    "request_id": 200,
                    "success": true,
                    "data": [{"id": 1, "name": "Warehouse"}]
                })),
                RequestKind::DeleteJob => Some(json!({
                    "request_id": 203,
                    "success": false,
                    "error": "Job has assigned shifts"
                })),
                _ => None,
            }
        })
    }

    #[tokio::test]
    async fn test_request_returns_data() {
        init_tracing();
        let server = MockServer::bind().await;
        let _backend = server.serve_all(backend());
        let client = started_client(&server, Arc::new(MemorySessionStore::new())).await;

        let jobs = client
            .request(RequestKind::ListJobs, None)
            .await
            .expect("jobs");
        assert_eq!(jobs[0]["name"], "Warehouse");
    }

    #[tokio::test]
    async fn test_business_error_surfaces_verbatim() {
        let server = MockServer::bind().await;
        let _backend = server.serve_all(backend());
        let client = started_client(&server, Arc::new(MemorySessionStore::new())).await;

        let err = client
            .request(RequestKind::DeleteJob, Some(json!({"id": 1})))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Server { ref message, .. } if message == "Job has assigned shifts"));

        let response = client
            .send(Request::new(RequestKind::DeleteJob))
            .await
            .expect("envelope");
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn test_unanswered_request_times_out() {
        let server = MockServer::bind().await;
        let _backend = server.serve_all(backend());
        let client = started_client(&server, Arc::new(MemorySessionStore::new())).await;

        let err = client
            .request(RequestKind::ClientSchedule, None)
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(client.manager().connection().expect("live").pending_count(), 0);
    }

    #[tokio::test]
    async fn test_start_authenticates_with_stored_session() {
        let server = MockServer::bind().await;
        let _backend = server.serve_all(backend());
        let store = Arc::new(MemorySessionStore::with_session(Session::new(
            "boss",
            Some("secret".into()),
            true,
        )));
        let client = started_client(&server, store).await;

        let state = client.auth().settled().await.expect("settled");
        assert_eq!(state.user().map(|u| u.is_manager), Some(true));
    }

    #[tokio::test]
    async fn test_request_without_connection_fails_fast() {
        let client = Client::builder()
            .url("ws://127.0.0.1:1")
            .session_store(Arc::new(MemorySessionStore::new()))
            .build()
            .expect("build");

        let err = client
            .request(RequestKind::ListJobs, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }

    #[tokio::test]
    async fn test_close_then_request_fails_fast() {
        let server = MockServer::bind().await;
        let _backend = server.serve_all(backend());
        let client = started_client(&server, Arc::new(MemorySessionStore::new())).await;

        client.close();
        assert_eq!(client.status(), ConnectionStatus::Disconnected);
        let err = client
            .request(RequestKind::ListJobs, None)
            .await
            .unwrap_err();
        assert!(err.is_connection_error());
    }
}
