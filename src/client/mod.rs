//! Client entry point and configuration.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Client`] | Shared connection plus automatic login |
//! | [`ClientBuilder`] | Fluent configuration builder |
//! | [`ClientOptions`] | Resolved timeouts, limits and endpoint |
//! | [`ReconnectPolicy`] | Delay schedule between reconnect attempts |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for client configuration.
pub mod builder;

/// Client facade.
pub mod core;

/// Timeouts, reconnect policy and endpoint resolution.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ClientBuilder;
pub use core::Client;
pub use options::{ClientOptions, ReconnectPolicy};
