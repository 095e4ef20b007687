//! Builder pattern for client configuration.
//!
//! Provides a fluent API for configuring and creating [`Client`] instances.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use easyshifts_link::Client;
//!
//! # fn example() -> easyshifts_link::Result<()> {
//! let client = Client::builder()
//!     .url("wss://shifts.example.com")
//!     .max_reconnect_attempts(10)
//!     .request_timeout(Duration::from_secs(5))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::auth::{FileSessionStore, MemorySessionStore, SessionStore};
use crate::error::{Error, Result};

use super::core::Client;
use super::options::{ClientOptions, ReconnectPolicy, resolve_base_url};

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for configuring a [`Client`] instance.
///
/// Use [`Client::builder()`] to create a new builder. Unset values fall back
/// to the defaults in [`crate::client::options`].
#[derive(Default, Clone)]
pub struct ClientBuilder {
    url: Option<String>,
    max_reconnect_attempts: Option<u32>,
    reconnect_policy: Option<ReconnectPolicy>,
    request_timeout: Option<Duration>,
    auth_timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    max_pending_requests: Option<usize>,
    session_store: Option<Arc<dyn SessionStore>>,
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("url", &self.url)
            .field("max_reconnect_attempts", &self.max_reconnect_attempts)
            .field("reconnect_policy", &self.reconnect_policy)
            .field("request_timeout", &self.request_timeout)
            .field("auth_timeout", &self.auth_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("max_pending_requests", &self.max_pending_requests)
            .field("session_store", &self.session_store.is_some())
            .finish()
    }
}

// ============================================================================
// ClientBuilder Implementation
// ============================================================================

impl ClientBuilder {
    /// Creates a new builder with no configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the backend base URL. `/ws` is appended if missing.
    ///
    /// Overrides `EASYSHIFTS_WS_URL`.
    #[inline]
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets how many reconnects follow an abnormal close before giving up.
    #[inline]
    #[must_use]
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = Some(attempts);
        self
    }

    /// Uses a fixed delay between reconnect attempts.
    #[inline]
    #[must_use]
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_policy = Some(ReconnectPolicy::Fixed(delay));
        self
    }

    /// Sets the delay schedule between reconnect attempts.
    #[inline]
    #[must_use]
    pub fn reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect_policy = Some(policy);
        self
    }

    /// Sets the default timeout for correlated requests.
    #[inline]
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Sets the timeout for the login handshake.
    #[inline]
    #[must_use]
    pub fn auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = Some(timeout);
        self
    }

    /// Sets the timeout for opening the socket.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Caps the number of requests awaiting a response.
    #[inline]
    #[must_use]
    pub fn max_pending_requests(mut self, max: usize) -> Self {
        self.max_pending_requests = Some(max);
        self
    }

    /// Sets where the login session is persisted.
    ///
    /// Defaults to [`FileSessionStore::default_location`].
    #[inline]
    #[must_use]
    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    /// Builds the client with validation.
    ///
    /// Nothing connects until [`Client::start`].
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the URL is invalid or not `ws`/`wss`
    /// - [`Error::Config`] if a timeout or the pending cap is zero
    /// - [`Error::Config`] if an exponential policy has `base > max`
    pub fn build(self) -> Result<Client> {
        let options = self.options()?;
        let store = self.session_store.unwrap_or_else(default_store);
        Ok(Client::new(options, store))
    }

    /// Resolves and validates the options without building a client.
    ///
    /// # Errors
    ///
    /// Same as [`ClientBuilder::build`].
    pub fn options(&self) -> Result<ClientOptions> {
        let mut options = ClientOptions::new(&resolve_base_url(self.url.as_deref()))?;

        if let Some(attempts) = self.max_reconnect_attempts {
            options.max_reconnect_attempts = attempts;
        }
        if let Some(policy) = self.reconnect_policy {
            options.reconnect_policy = validate_policy(policy)?;
        }
        if let Some(timeout) = self.request_timeout {
            options.request_timeout = non_zero("request_timeout", timeout)?;
        }
        if let Some(timeout) = self.auth_timeout {
            options.auth_timeout = non_zero("auth_timeout", timeout)?;
        }
        if let Some(timeout) = self.connect_timeout {
            options.connect_timeout = non_zero("connect_timeout", timeout)?;
        }
        if let Some(max) = self.max_pending_requests {
            if max == 0 {
                return Err(Error::config("max_pending_requests must be at least 1"));
            }
            options.max_pending_requests = max;
        }

        Ok(options)
    }
}

// ============================================================================
// Validation
// ============================================================================

fn non_zero(name: &str, timeout: Duration) -> Result<Duration> {
    if timeout.is_zero() {
        return Err(Error::config(format!("{name} must be greater than zero")));
    }
    Ok(timeout)
}

fn validate_policy(policy: ReconnectPolicy) -> Result<ReconnectPolicy> {
    if let ReconnectPolicy::Exponential { base, max } = policy
        && base > max
    {
        return Err(Error::config(format!(
            "Exponential reconnect base {base:?} exceeds max {max:?}"
        )));
    }
    Ok(policy)
}

fn default_store() -> Arc<dyn SessionStore> {
    match FileSessionStore::default_location() {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!(error = %e, "Falling back to in-memory session store");
            Arc::new(MemorySessionStore::new())
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
