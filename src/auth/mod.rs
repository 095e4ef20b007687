//! Authentication over the shared socket.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `handshake` | Login state machine, automatic replay per transport |
//! | `session` | Persisted session and storage backends |

// ============================================================================
// Submodules
// ============================================================================

/// Login state machine.
pub mod handshake;

/// Persisted session.
pub mod session;

// ============================================================================
// Re-exports
// ============================================================================

pub use handshake::{AuthHandshake, AuthState, AuthenticatedUser};
pub use session::{FileSessionStore, MemorySessionStore, SESSION_KEY, Session, SessionStore};
