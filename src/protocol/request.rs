//! Request and Response envelopes.
//!
//! Defines the message format exchanged with the backend and the lenient
//! parser used for everything arriving on the shared socket.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

use super::RequestKind;

// ============================================================================
// Request
// ============================================================================

/// A request from client to server.
///
/// # Format
///
/// ```json
/// { "request_id": 10, "data": { "username": "alice", "password": "x" } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation tag echoed back by the server.
    pub request_id: RequestId,

    /// Payload, omitted from the wire when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Request {
    /// Creates a request for a named kind without payload.
    #[inline]
    #[must_use]
    pub fn new(kind: RequestKind) -> Self {
        Self {
            request_id: kind.id(),
            data: None,
        }
    }

    /// Creates a request with a raw ID.
    #[inline]
    #[must_use]
    pub fn with_id(request_id: RequestId) -> Self {
        Self {
            request_id,
            data: None,
        }
    }

    /// Attaches a payload.
    #[inline]
    #[must_use]
    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl From<RequestKind> for Request {
    fn from(kind: RequestKind) -> Self {
        Self::new(kind)
    }
}

// ============================================================================
// Response
// ============================================================================

/// A response from server to client.
///
/// # Format
///
/// Success:
/// ```json
/// { "request_id": 10, "success": true, "data": { "user_exists": true } }
/// ```
///
/// Error:
/// ```json
/// { "request_id": 41, "success": false, "error": "Shift is full" }
/// ```
///
/// Legacy responses may omit `success`; see [`Response::is_success`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Response {
    /// Matches the request's `request_id`.
    pub request_id: RequestId,

    /// Outcome flag.
    #[serde(default)]
    pub success: Option<bool>,

    /// Result data.
    #[serde(default)]
    pub data: Option<Value>,

    /// Error text (if failed).
    #[serde(default)]
    pub error: Option<String>,

    /// Free-form status message.
    #[serde(default)]
    pub message: Option<String>,
}

impl Response {
    /// Returns `true` if the server reported success.
    ///
    /// An absent `success` flag counts as success unless `error` is set.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.success.unwrap_or(self.error.is_none())
    }

    /// Returns `true` if the server reported failure.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        !self.is_success()
    }

    /// Extracts the data value, returning error if the response was a failure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Server`] with the server's `error` (or `message`)
    /// text verbatim.
    pub fn into_result(self) -> Result<Value> {
        if self.is_success() {
            return Ok(self.data.unwrap_or(Value::Null));
        }

        let message = self
            .error
            .or(self.message)
            .unwrap_or_else(|| "unknown error".to_string());
        Err(Error::server(self.request_id, message))
    }

    /// Gets a string value from the data.
    ///
    /// Returns empty string if key not found or not a string.
    #[inline]
    #[must_use]
    pub fn get_string(&self, key: &str) -> String {
        self.data
            .as_ref()
            .and_then(|v| v.get(key))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }

    /// Gets a u64 value from the data.
    ///
    /// Returns 0 if key not found or not a number.
    #[inline]
    #[must_use]
    pub fn get_u64(&self, key: &str) -> u64 {
        self.data
            .as_ref()
            .and_then(|v| v.get(key))
            .and_then(|v| v.as_u64())
            .unwrap_or_default()
    }

    /// Gets a boolean value from the data.
    ///
    /// Returns false if key not found or not a boolean.
    #[inline]
    #[must_use]
    pub fn get_bool(&self, key: &str) -> bool {
        self.data
            .as_ref()
            .and_then(|v| v.get(key))
            .and_then(|v| v.as_bool())
            .unwrap_or_default()
    }
}

// ============================================================================
// Inbound
// ============================================================================

/// Classification of one text frame received on the shared socket.
#[derive(Debug)]
pub enum Inbound {
    /// Well-formed response carrying a `request_id`.
    Response(Response),

    /// Carries a usable `request_id` but the rest of the envelope is invalid.
    ///
    /// Only listeners on that ID see this, as a protocol error.
    Invalid {
        /// The ID the frame was addressed to.
        request_id: RequestId,
        /// Why the envelope was rejected.
        message: String,
    },

    /// Valid JSON with no usable `request_id` (legacy or server push).
    Unsolicited(Value),

    /// Not JSON at all.
    Malformed(String),
}

impl Inbound {
    /// Parses a text frame without ever failing.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => return Self::Malformed(e.to_string()),
        };

        let Some(request_id) = value
            .get("request_id")
            .and_then(Value::as_u64)
            .and_then(|raw| u32::try_from(raw).ok())
            .map(RequestId::new)
        else {
            return Self::Unsolicited(value);
        };

        match serde_json::from_value::<Response>(value) {
            Ok(response) => Self::Response(response),
            Err(e) => Self::Invalid {
                request_id,
                message: e.to_string(),
            },
        }
    }

    /// Returns the `request_id` this frame is addressed to, if any.
    #[inline]
    #[must_use]
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            Self::Response(response) => Some(response.request_id),
            Self::Invalid { request_id, .. } => Some(*request_id),
            Self::Unsolicited(_) | Self::Malformed(_) => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let request = Request::new(RequestKind::Login)
            .data(json!({"username": "alice", "password": "x"}));
        let json = serde_json::to_value(&request).expect("serialize");

        assert_eq!(
            json,
            json!({"request_id": 10, "data": {"username": "alice", "password": "x"}})
        );
    }

    #[test]
    fn test_request_without_data_omits_field() {
        let json = serde_json::to_string(&Request::new(RequestKind::ListJobs)).expect("serialize");
        assert_eq!(json, r#"{"request_id":200}"#);
    }

    #[test]
    fn test_success_response() {
        let response: Response = serde_json::from_str(
            r#"{"request_id": 10, "success": true, "data": {"user_exists": true, "is_manager": false}}"#,
        )
        .expect("parse");

        assert!(response.is_success());
        assert!(response.get_bool("user_exists"));
        assert!(!response.get_bool("is_manager"));
    }

    #[test]
    fn test_error_response_into_result() {
        let response: Response =
            serde_json::from_str(r#"{"request_id": 41, "success": false, "error": "Shift is full"}"#)
                .expect("parse");

        let err = response.into_result().unwrap_err();
        assert!(matches!(
            err,
            Error::Server { request_id, ref message }
                if request_id == RequestId::new(41) && message == "Shift is full"
        ));
    }

    #[test]
    fn test_failure_falls_back_to_message_field() {
        let response: Response = serde_json::from_str(
            r#"{"request_id": 41, "success": false, "message": "Not allowed"}"#,
        )
        .expect("parse");

        let err = response.into_result().unwrap_err();
        assert_eq!(err.to_string(), "Request 41 failed: Not allowed");
    }

    #[test]
    fn test_missing_success_flag() {
        let legacy: Response =
            serde_json::from_str(r#"{"request_id": 50, "data": []}"#).expect("parse");
        assert!(legacy.is_success());

        let legacy_error: Response =
            serde_json::from_str(r#"{"request_id": 50, "error": "boom"}"#).expect("parse");
        assert!(legacy_error.is_error());
    }

    #[test]
    fn test_response_get_helpers_defaults() {
        let response: Response =
            serde_json::from_str(r#"{"request_id": 1, "success": true}"#).expect("parse");
        assert_eq!(response.get_string("missing"), "");
        assert_eq!(response.get_u64("missing"), 0);
        assert!(!response.get_bool("missing"));
    }

    #[test]
    fn test_inbound_classification() {
        assert!(matches!(
            Inbound::parse(r#"{"request_id": 220, "success": true}"#),
            Inbound::Response(_)
        ));
        assert!(matches!(Inbound::parse("not json"), Inbound::Malformed(_)));
        assert!(matches!(
            Inbound::parse(r#"{"type": "broadcast"}"#),
            Inbound::Unsolicited(_)
        ));
        assert!(matches!(
            Inbound::parse(r#"{"request_id": "10", "success": true}"#),
            Inbound::Unsolicited(_)
        ));
        assert!(matches!(
            Inbound::parse(r#"{"request_id": -3}"#),
            Inbound::Unsolicited(_)
        ));
    }

    #[test]
    fn test_inbound_invalid_envelope_keeps_id() {
        let inbound = Inbound::parse(r#"{"request_id": 40, "success": "yes"}"#);
        assert_eq!(inbound.request_id(), Some(RequestId::new(40)));
        assert!(matches!(inbound, Inbound::Invalid { .. }));
    }
}
