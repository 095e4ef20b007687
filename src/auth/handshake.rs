//! Automatic authentication on every fresh socket.
//!
//! The backend ties a login to the socket it arrived on, so every new
//! transport must log in again before business requests succeed.
//! [`AuthHandshake`] watches the shared connection and replays the stored
//! session once per opened transport.
//!
//! # State Machine
//!
//! ```text
//! Idle ──socket opens──► Authenticating ──user exists──► Authenticated
//!   ▲                          │
//!   │                          └── rejected / timeout / no credentials ──► Error
//!   │                                                                       │
//!   └──────────────────────── socket not open ◄─────────────────────────────┘
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;
use crate::protocol::{Request, RequestKind, Response};
use crate::transport::{ConnectionManager, Subscription};

use super::session::{Session, SessionStore};

// ============================================================================
// Types
// ============================================================================

/// Identity confirmed by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    /// Login name.
    pub username: String,
    /// Whether the user is a manager.
    pub is_manager: bool,
}

/// Authentication state of the current transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// Nothing attempted on this transport.
    Idle,
    /// A login request is in flight.
    Authenticating,
    /// The backend accepted the login.
    Authenticated(AuthenticatedUser),
    /// The last attempt failed.
    Error(String),
}

impl AuthState {
    /// Returns `true` once an attempt has finished either way.
    #[inline]
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Authenticated(_) | Self::Error(_))
    }

    /// Returns the user if authenticated.
    #[inline]
    #[must_use]
    pub fn user(&self) -> Option<&AuthenticatedUser> {
        match self {
            Self::Authenticated(user) => Some(user),
            _ => None,
        }
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Authenticating => f.write_str("authenticating"),
            Self::Authenticated(user) => write!(f, "authenticated as {}", user.username),
            Self::Error(message) => write!(f, "auth_error: {message}"),
        }
    }
}

/// Clears the in-flight flag when dropped.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self(flag))
            .map_err(|_| Error::AuthInProgress)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Source of the credentials for one login.
enum Attempt<'a> {
    /// The stored session.
    Replay,
    /// Username and password typed by the user.
    Password { username: &'a str, password: &'a str },
    /// Google identity credential.
    Google(&'a str),
}

// ============================================================================
// AuthHandshake
// ============================================================================

struct AuthInner {
    manager: ConnectionManager,
    store: Arc<dyn SessionStore>,
    state: watch::Sender<AuthState>,
    in_flight: AtomicBool,
    timeout: Duration,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for AuthInner {
    fn drop(&mut self) {
        if let Some(task) = self.watcher.lock().take() {
            task.abort();
        }
    }
}

/// Login state shared by everything that talks to the backend.
///
/// At most one login is in flight at a time.
#[derive(Clone)]
pub struct AuthHandshake {
    inner: Arc<AuthInner>,
}

impl fmt::Debug for AuthHandshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthHandshake")
            .field("state", &*self.inner.state.borrow())
            .finish_non_exhaustive()
    }
}

impl AuthHandshake {
    /// Creates a handshake over `manager`. Call [`AuthHandshake::start`] to
    /// authenticate automatically.
    #[must_use]
    pub fn new(manager: ConnectionManager, store: Arc<dyn SessionStore>) -> Self {
        let timeout = manager.options().auth_timeout;
        let (state, _) = watch::channel(AuthState::Idle);
        Self {
            inner: Arc::new(AuthInner {
                manager,
                store,
                state,
                in_flight: AtomicBool::new(false),
                timeout,
                watcher: Mutex::new(None),
            }),
        }
    }

    /// Subscribes to the connection and logs in on every fresh transport.
    ///
    /// Idempotent. Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut watcher = self.inner.watcher.lock();
        if watcher.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let subscription = self.inner.manager.subscribe();
        *watcher = Some(tokio::spawn(AuthInner::watch_connection(
            Arc::downgrade(&self.inner),
            subscription,
        )));
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> AuthState {
        self.inner.state.borrow().clone()
    }

    /// Returns a receiver that observes every later state.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    /// Returns `true` if the current transport is authenticated.
    #[inline]
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(*self.inner.state.borrow(), AuthState::Authenticated(_))
    }

    /// Waits until an attempt has finished and returns the final state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the state channel closed.
    pub async fn settled(&self) -> Result<AuthState> {
        let mut updates = self.inner.state.subscribe();
        let state = updates
            .wait_for(AuthState::is_settled)
            .await
            .map_err(|_| Error::connection("authentication state closed"))?;
        Ok(state.clone())
    }

    /// Replays the stored session again.
    ///
    /// # Errors
    ///
    /// - [`Error::AuthInProgress`] if a login is already in flight
    /// - [`Error::NoCredentials`] if no replayable session is stored
    /// - [`Error::AuthRejected`] / [`Error::AuthTimeout`] on failure
    pub async fn retry(&self) -> Result<AuthenticatedUser> {
        self.inner.attempt(Attempt::Replay).await
    }

    /// Logs in with a password and stores the session for later replay.
    ///
    /// # Errors
    ///
    /// Same as [`AuthHandshake::retry`], plus store errors.
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthenticatedUser> {
        self.inner
            .attempt(Attempt::Password { username, password })
            .await
    }

    /// Logs in with a Google identity credential.
    ///
    /// The stored session carries no password, so a reconnect needs a new
    /// login.
    ///
    /// # Errors
    ///
    /// Same as [`AuthHandshake::login`].
    pub async fn login_with_google(&self, credential: &str) -> Result<AuthenticatedUser> {
        self.inner.attempt(Attempt::Google(credential)).await
    }

    /// Forgets the stored session and returns to [`AuthState::Idle`].
    ///
    /// Holds the in-flight guard while clearing, so no login can save a
    /// session behind it.
    ///
    /// # Errors
    ///
    /// - [`Error::AuthInProgress`] if a login is in flight
    /// - store errors
    pub async fn logout(&self) -> Result<()> {
        let _guard = InFlight::acquire(&self.inner.in_flight)?;
        self.inner.store.clear().await?;
        self.inner.set_state(AuthState::Idle);
        info!("Logged out");
        Ok(())
    }
}

// ============================================================================
// AuthInner
// ============================================================================

impl AuthInner {
    fn set_state(&self, next: AuthState) {
        debug!(state = %next, "Auth state changed");
        self.state.send_replace(next);
    }

    /// Triggers one replay per opened transport and resets on close.
    async fn watch_connection(inner: Weak<Self>, mut subscription: Subscription) {
        let mut last_opened: Option<ConnectionId> = None;

        loop {
            {
                let Some(this) = inner.upgrade() else {
                    return;
                };

                let live = subscription
                    .connection()
                    .filter(|_| subscription.status().is_open());

                match live {
                    Some(connection) if last_opened != Some(connection.id()) => {
                        last_opened = Some(connection.id());
                        debug!(connection = %connection.id(), "Transport opened, authenticating");
                        tokio::spawn(async move {
                            match this.attempt(Attempt::Replay).await {
                                Err(Error::AuthInProgress) => {
                                    debug!("Login already in flight, skipping replay");
                                }
                                Err(e) => debug!(error = %e, "Automatic login failed"),
                                Ok(_) => {}
                            }
                        });
                    }
                    Some(_) => {}
                    None => this.reset_if_settled(),
                }
            }

            if subscription.changed().await.is_err() {
                return;
            }
        }
    }

    /// Returns to idle once the transport is gone.
    fn reset_if_settled(&self) {
        let reset = self.state.send_if_modified(|state| {
            if !state.is_settled() {
                return false;
            }
            *state = AuthState::Idle;
            true
        });
        if reset {
            debug!("Transport not open, auth state reset");
        }
    }

    /// Runs one login attempt under the in-flight guard.
    async fn attempt(&self, attempt: Attempt<'_>) -> Result<AuthenticatedUser> {
        let guard = InFlight::acquire(&self.in_flight)?;
        self.set_state(AuthState::Authenticating);

        let result = self.perform(attempt).await;

        drop(guard);
        self.finish(result)
    }

    async fn perform(&self, attempt: Attempt<'_>) -> Result<AuthenticatedUser> {
        match attempt {
            Attempt::Replay => {
                let session = self.store.load().await?.ok_or(Error::NoCredentials)?;
                let Some(password) = session.password.as_deref() else {
                    return Err(Error::NoCredentials);
                };
                let request = Request::new(RequestKind::Login).data(json!({
                    "username": session.username,
                    "password": password,
                }));
                self.exchange(request, &session.username).await
            }

            Attempt::Password { username, password } => {
                let request = Request::new(RequestKind::Login).data(json!({
                    "username": username,
                    "password": password,
                }));
                let user = self.exchange(request, username).await?;
                let session =
                    Session::new(&user.username, Some(password.to_string()), user.is_manager);
                self.store.save(&session).await?;
                Ok(user)
            }

            Attempt::Google(credential) => {
                let request = Request::new(RequestKind::GoogleAuth)
                    .data(json!({ "credential": credential }));
                let user = self.exchange(request, "").await?;
                if user.username.is_empty() {
                    return Err(Error::protocol("Google login response carries no username"));
                }
                self.store
                    .save(&Session::new(&user.username, None, user.is_manager))
                    .await?;
                Ok(user)
            }
        }
    }

    /// Sends a login-type request and reads the identity from the answer.
    async fn exchange(&self, request: Request, username: &str) -> Result<AuthenticatedUser> {
        let connection = self.manager.require_connection()?;
        let response = connection
            .send_with_timeout(request, self.timeout)
            .await
            .map_err(|e| match e {
                Error::RequestTimeout { .. } => {
                    Error::auth_timeout(self.timeout.as_millis() as u64)
                }
                other => other,
            })?;
        parse_login(&response, username)
    }

    /// Publishes the outcome of an attempt.
    fn finish(&self, result: Result<AuthenticatedUser>) -> Result<AuthenticatedUser> {
        match &result {
            Ok(user) => {
                info!(username = %user.username, manager = user.is_manager, "Authenticated");
                self.set_state(AuthState::Authenticated(user.clone()));
            }
            Err(e) if e.is_connection_error() && self.manager.connection().is_none() => {
                debug!(error = %e, "Login interrupted by disconnect");
                self.set_state(AuthState::Idle);
            }
            Err(e) => {
                warn!(error = %e, "Authentication failed");
                self.set_state(AuthState::Error(e.to_string()));
            }
        }
        result
    }
}

/// Reads `user_exists` / `is_manager` from a login answer.
fn parse_login(response: &Response, username: &str) -> Result<AuthenticatedUser> {
    if !response.is_success() {
        let message = response
            .error
            .clone()
            .or_else(|| response.message.clone())
            .unwrap_or_else(|| "login failed".to_string());
        return Err(Error::auth_rejected(message));
    }

    if !response.get_bool("user_exists") {
        return Err(Error::auth_rejected("user does not exist"));
    }

    let reported = response.get_string("username");
    Ok(AuthenticatedUser {
        username: if reported.is_empty() {
            username.to_string()
        } else {
            reported
        },
        is_manager: response.get_bool("is_manager"),
    })
}

// ============================================================================
// Tests
// ============================================================================
