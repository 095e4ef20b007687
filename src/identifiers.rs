//! Type-safe identifiers.
//!
//! Newtype wrappers keep wire request IDs, local listener handles and
//! transport instance IDs from being mixed up.
//!
//! | Type | Backing | Scope |
//! |------|---------|-------|
//! | [`RequestId`] | `u32` | Wire correlation tag, chosen by the caller |
//! | [`ListenerId`] | `u64` | One attached listener, unique per process |
//! | [`ConnectionId`] | UUID v4 | One transport instance, for logs |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocol::RequestKind;

// ============================================================================
// RequestId
// ============================================================================

/// Integer tag carried in every envelope as `request_id`.
///
/// The server echoes it back; nothing enforces global uniqueness, so two
/// listeners waiting on the same ID both observe the same response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u32);

impl RequestId {
    /// Wraps a raw wire value.
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw wire value.
    #[inline]
    #[must_use]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    /// Returns the named kind for this ID, if it is one.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> Option<RequestKind> {
        RequestKind::from_id(*self)
    }
}

impl From<RequestKind> for RequestId {
    #[inline]
    fn from(kind: RequestKind) -> Self {
        kind.id()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// ListenerId
// ============================================================================

/// Global counter for listener handles.
static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Handle for one attached response listener.
///
/// Used to detach exactly the listener a caller attached, even when several
/// listeners wait on the same [`RequestId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Allocates the next listener handle.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

// ============================================================================
// ConnectionId
// ============================================================================

/// Identifies one transport instance across its lifetime.
///
/// A fresh ID is minted on every (re)connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generates a random connection ID.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[inline]
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
