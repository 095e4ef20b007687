//! Persisted login session.
//!
//! The handshake reads the stored [`Session`] whenever a fresh socket opens
//! and replays it as a login request. Stores are pluggable through
//! [`SessionStore`].
//!
//! # File Format
//!
//! One JSON object under the fixed key [`SESSION_KEY`]:
//!
//! ```json
//! { "username": "alice", "password": "x", "isManager": false, "loginTime": 1717000000000 }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Key the session is stored under.
pub const SESSION_KEY: &str = "user";

/// Directory name under the platform data directory.
const APP_DIR: &str = "easyshifts";

// ============================================================================
// Session
// ============================================================================

/// Authentication result cached outside the socket.
///
/// Assumed valid until the server rejects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Login name.
    pub username: String,

    /// Password kept for automatic re-authentication. Absent for Google
    /// sessions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Whether the user is a manager.
    #[serde(default)]
    pub is_manager: bool,

    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub login_time: u64,
}

impl Session {
    /// Creates a session stamped with the current time.
    #[must_use]
    pub fn new(username: impl Into<String>, password: Option<String>, is_manager: bool) -> Self {
        Self {
            username: username.into(),
            password,
            is_manager,
            login_time: now_millis(),
        }
    }

    /// Returns `true` if the session can be replayed without user input.
    #[inline]
    #[must_use]
    pub fn can_replay(&self) -> bool {
        self.password.is_some()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

// ============================================================================
// SessionStore
// ============================================================================

/// Durable storage for the current session.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Loads the stored session, if any.
    async fn load(&self) -> Result<Option<Session>>;

    /// Replaces the stored session.
    async fn save(&self, session: &Session) -> Result<()>;

    /// Removes the stored session. Succeeds if none exists.
    async fn clear(&self) -> Result<()>;
}

// ============================================================================
// FileSessionStore
// ============================================================================

/// Session stored as `<dir>/user.json`.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    /// Creates a store inside `dir`.
    #[must_use]
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(format!("{SESSION_KEY}.json")),
        }
    }

    /// Creates a store in the platform data directory.
    ///
    /// - Linux: `~/.local/share/easyshifts`
    /// - macOS: `~/Library/Application Support/easyshifts`
    /// - Windows: `%LOCALAPPDATA%\easyshifts`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the platform has no data directory.
    pub fn default_location() -> Result<Self> {
        let base = dirs::data_local_dir()
            .ok_or_else(|| Error::config("No local data directory on this platform"))?;
        Ok(Self::new(base.join(APP_DIR)))
    }

    /// Returns the file path.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self) -> Result<Option<Session>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let session = serde_json::from_str(&contents).map_err(|e| {
            Error::config(format!(
                "Corrupted session file {}: {e}",
                self.path.display()
            ))
        })?;
        Ok(Some(session))
    }

    async fn save(&self, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write then rename so a crash never leaves half a file.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(session)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), username = %session.username, "Session saved");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "Session cleared");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// MemorySessionStore
// ============================================================================

/// In-memory store. Lost when the process exits.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    session: Mutex<Option<Session>>,
}

impl MemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `session`.
    #[must_use]
    pub fn with_session(session: Session) -> Self {
        Self {
            session: Mutex::new(Some(session)),
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self) -> Result<Option<Session>> {
        Ok(self.session.lock().clone())
    }

    async fn save(&self, session: &Session) -> Result<()> {
        *self.session.lock() = Some(session.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.session.lock() = None;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
