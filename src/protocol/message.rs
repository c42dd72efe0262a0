//! Call, response, and event message structures.
//!
//! All messages are JSON objects, one per transport frame. Responses are
//! matched to calls by [`CallId`]; events are unsolicited and matched to
//! listeners by method name and session.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::{CallId, SessionId};

// ============================================================================
// Call
// ============================================================================

/// A command call from local end to browser.
///
/// # Format
///
/// ```json
/// {
///   "id": 4,
///   "method": "Page.navigate",
///   "params": { "url": "https://example.com" },
///   "sessionId": "8D1A3C..."
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct Call {
    /// Correlation ID, unique for the channel's lifetime.
    pub id: CallId,

    /// Command method in `Domain.method` format.
    pub method: String,

    /// Command parameters.
    #[serde(skip_serializing_if = "Value::is_null")]
    pub params: Value,

    /// Target session to route the command to; `None` for browser-level
    /// commands.
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

impl Call {
    /// Creates a new call.
    #[inline]
    #[must_use]
    pub fn new(
        id: CallId,
        method: impl Into<String>,
        params: Value,
        session_id: Option<SessionId>,
    ) -> Self {
        Self {
            id,
            method: method.into(),
            params,
            session_id,
        }
    }
}

// ============================================================================
// Response
// ============================================================================

/// A response from the browser for a previously issued call.
///
/// # Format
///
/// Success:
/// ```json
/// { "id": 4, "result": { "frameId": "F1" } }
/// ```
///
/// Error:
/// ```json
/// { "id": 4, "error": { "code": -32000, "message": "Cannot navigate" } }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    /// Matches the call's `id`.
    pub id: CallId,

    /// Result payload (if success).
    #[serde(default)]
    pub result: Option<Value>,

    /// Error payload (if error).
    #[serde(default)]
    pub error: Option<CdpError>,

    /// Session the answered command was routed to.
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<SessionId>,
}

impl Response {
    /// Extracts the result payload, surfacing a peer error payload as
    /// [`Error::Cdp`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cdp`] with the peer's code and message verbatim if
    /// the response carried an error.
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(err) => Err(Error::cdp(err.code, err.message)),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

// ============================================================================
// CdpError
// ============================================================================

/// Error payload returned by the browser for a failed command.
///
/// The message is carried verbatim for diagnostics; script-evaluation
/// exceptions arrive through this shape.
#[derive(Debug, Clone, Deserialize)]
pub struct CdpError {
    /// JSON-RPC style error code.
    pub code: i64,

    /// Human-readable error message.
    pub message: String,

    /// Optional additional diagnostics.
    #[serde(default)]
    pub data: Option<Value>,
}

// ============================================================================
// Event
// ============================================================================

/// An unsolicited event from the browser.
///
/// # Format
///
/// ```json
/// {
///   "method": "Page.frameStoppedLoading",
///   "params": { "frameId": "F1" },
///   "sessionId": "8D1A3C..."
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    /// Event name in `Domain.event` format.
    pub method: String,

    /// Event-specific data.
    #[serde(default)]
    pub params: Value,

    /// Session the event originated from; `None` for browser-level events.
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<SessionId>,
}

impl Event {
    /// Returns the domain portion of the method.
    ///
    /// # Example
    ///
    /// ```ignore
    /// // "Page.frameStoppedLoading" → "Page"
    /// ```
    #[inline]
    #[must_use]
    pub fn domain(&self) -> &str {
        self.method.split('.').next().unwrap_or_default()
    }

    /// Returns `true` if the event method matches a listener pattern.
    ///
    /// A pattern is either an exact method name or a `Domain.*` wildcard.
    #[must_use]
    pub fn matches(&self, pattern: &str) -> bool {
        match pattern.strip_suffix(".*") {
            Some(domain) => self.domain() == domain,
            None => self.method == pattern,
        }
    }

    /// Gets a string field from the event params.
    ///
    /// Returns an empty string if the key is missing or not a string.
    #[inline]
    #[must_use]
    pub fn get_string(&self, key: &str) -> String {
        self.params
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }
}

// ============================================================================
// Message
// ============================================================================

/// A parsed inbound message: either a response or an event.
#[derive(Debug, Clone)]
pub enum Message {
    /// Response matched to a call by ID.
    Response(Response),
    /// Unsolicited event.
    Event(Event),
}

impl Message {
    /// Parses one inbound frame.
    ///
    /// A message with an `id` is a response; a message with a `method` but
    /// no `id` is an event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the frame is neither.
    pub fn parse(text: &str) -> Result<Self> {
        if let Ok(response) = serde_json::from_str::<Response>(text) {
            return Ok(Self::Response(response));
        }

        if let Ok(event) = serde_json::from_str::<Event>(text) {
            return Ok(Self::Event(event));
        }

        Err(Error::protocol(format!("unparseable message: {text}")))
    }
}

// ============================================================================
// Tests
// ============================================================================
