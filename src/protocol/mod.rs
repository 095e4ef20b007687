//! WebSocket protocol message types.
//!
//! This module defines the message format for communication between the
//! client and the EasyShifts backend.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `Request` | Client → Server | `{ request_id, data? }` |
//! | `Response` | Server → Client | `{ request_id, success, data?, error?, message? }` |
//!
//! Responses are matched to requests only by `request_id`. Frames without a
//! usable `request_id` are never attributed to a request.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `kind` | Named request kinds and their wire IDs |
//! | `request` | Request, Response and inbound frame parsing |

// ============================================================================
// Submodules
// ============================================================================

/// Named request kinds.
pub mod kind;

/// Request and Response message types.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use kind::RequestKind;
pub use request::{Inbound, Request, Response};
