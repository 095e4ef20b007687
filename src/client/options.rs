//! Client configuration.
//!
//! Timeouts, reconnect policy and endpoint resolution.
//!
//! # Endpoint Resolution
//!
//! The first source that yields a value wins:
//!
//! 1. The URL given to the builder
//! 2. `EASYSHIFTS_WS_URL` in the process environment
//! 3. `EASYSHIFTS_WS_URL` captured at build time
//! 4. [`DEFAULT_BASE_URL`]
//!
//! [`WS_PATH`] is then appended unless the URL already ends with it.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Environment variable holding the backend base URL.
pub const ENDPOINT_ENV: &str = "EASYSHIFTS_WS_URL";

/// Base URL used when nothing else is configured.
pub const DEFAULT_BASE_URL: &str = "ws://localhost:8080";

/// Path the backend serves the socket on.
pub const WS_PATH: &str = "/ws";

/// Reconnect attempts before giving up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Delay between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// Time to wait for a correlated response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Time to wait for the login response. Longer than a normal request since
/// it runs right after the socket opens.
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(30);

/// Time to wait for the WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum listeners per transport.
pub const DEFAULT_MAX_PENDING_REQUESTS: usize = 100;

// ============================================================================
// ReconnectPolicy
// ============================================================================

/// Delay schedule between reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Same delay before every attempt.
    Fixed(Duration),
    /// `base * 2^(attempt - 1)`, capped at `max`.
    Exponential {
        /// Delay before the first attempt.
        base: Duration,
        /// Upper bound.
        max: Duration,
    },
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::Fixed(DEFAULT_RECONNECT_DELAY)
    }
}

impl ReconnectPolicy {
    /// Returns the delay before attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match *self {
            Self::Fixed(delay) => delay,
            Self::Exponential { base, max } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

// ============================================================================
// ClientOptions
// ============================================================================

/// Resolved client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    /// Full socket URL, path included.
    pub url: Url,

    /// Reconnect attempts after an abnormal close before giving up.
    pub max_reconnect_attempts: u32,

    /// Delay schedule between attempts.
    pub reconnect_policy: ReconnectPolicy,

    /// Default timeout for correlated requests.
    pub request_timeout: Duration,

    /// Timeout for the login handshake.
    pub auth_timeout: Duration,

    /// Timeout for opening the socket.
    pub connect_timeout: Duration,

    /// Listener cap per transport.
    pub max_pending_requests: usize,
}

impl ClientOptions {
    /// Creates options for `url` with default timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL is invalid.
    pub fn new(url: &str) -> Result<Self> {
        Ok(Self {
            url: endpoint_url(url)?,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_policy: ReconnectPolicy::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_pending_requests: DEFAULT_MAX_PENDING_REQUESTS,
        })
    }

    /// Creates options from the environment, falling back to the default URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configured URL is invalid.
    pub fn from_env() -> Result<Self> {
        Self::new(&resolve_base_url(None))
    }
}

// ============================================================================
// Endpoint Helpers
// ============================================================================

/// Picks the base URL from the configured sources.
#[must_use]
pub fn resolve_base_url(explicit: Option<&str>) -> String {
    explicit
        .map(str::to_owned)
        .or_else(|| std::env::var(ENDPOINT_ENV).ok())
        .or_else(|| option_env!("EASYSHIFTS_WS_URL").map(str::to_owned))
        .filter(|url| !url.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
}

/// Validates a base URL and appends [`WS_PATH`].
///
/// # Errors
///
/// Returns [`Error::Config`] if the URL does not parse or is not `ws`/`wss`.
pub fn endpoint_url(base: &str) -> Result<Url> {
    let trimmed = base.trim().trim_end_matches('/');
    let full = if trimmed.ends_with(WS_PATH) {
        trimmed.to_string()
    } else {
        format!("{trimmed}{WS_PATH}")
    };

    let url = Url::parse(&full)
        .map_err(|e| Error::config(format!("Invalid endpoint URL '{base}': {e}")))?;

    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(Error::config(format!(
            "Endpoint must use ws:// or wss://, got '{other}://'"
        ))),
    }
}

// ============================================================================
// Tests
// ============================================================================
