//! Error types for chrome-press.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use chrome_press::{Browser, Result};
//!
//! async fn example(browser: &Browser) -> Result<Vec<u8>> {
//!     browser.print_to_pdf("https://example.com".into(), Default::default()).await
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Timeout | [`Error::CheckoutTimeout`], [`Error::CallTimeout`], [`Error::EventTimeout`] |
//! | Crash | [`Error::TargetCrashed`] |
//! | Protocol | [`Error::Cdp`], [`Error::Protocol`] |
//! | Transport | [`Error::Connection`], [`Error::ChannelClosed`], [`Error::WebSocket`] |
//! | Launch | [`Error::ChromeNotFound`], [`Error::Launch`] |
//! | External | [`Error::Io`], [`Error::Json`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::path::PathBuf;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::{CallId, SessionId};

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Timeout Errors
    // ========================================================================
    /// No pooled session became available in time.
    ///
    /// Returned when every session is busy and none is checked in within
    /// the configured checkout timeout.
    #[error("Session checkout timed out after {timeout_ms}ms")]
    CheckoutTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// A command response did not arrive in time.
    ///
    /// The pending call is removed; a late response is discarded silently.
    #[error("Call {call_id} ({method}) timed out after {timeout_ms}ms")]
    CallTimeout {
        /// The correlation ID that timed out.
        call_id: CallId,
        /// The command method that was issued.
        method: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// An awaited event did not arrive in time.
    #[error("Event {method} not received within {timeout_ms}ms")]
    EventTimeout {
        /// The event method that was awaited.
        method: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Crash Errors
    // ========================================================================
    /// The page target crashed while a call was in flight.
    ///
    /// Surfaced after the crash grace period elapses without a matching
    /// response. The session is discarded by the pool.
    #[error("Target crashed for session {session_id}")]
    TargetCrashed {
        /// Session whose target crashed.
        session_id: SessionId,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// The browser returned an error payload for a command.
    ///
    /// Carries the peer's code and message verbatim for diagnostics,
    /// including script-evaluation exceptions.
    #[error("CDP error {code}: {message}")]
    Cdp {
        /// Peer-reported error code.
        code: i64,
        /// Peer-reported error message, verbatim.
        message: String,
    },

    /// Protocol violation or malformed message.
    ///
    /// Returned for unparseable wire messages and for step lists that
    /// violate the engine's sequencing rules.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Connection to the browser failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// The channel to the browser is closed.
    ///
    /// Returned when the read loop has terminated; pool-wide, every
    /// session is invalidated.
    #[error("Channel closed")]
    ChannelClosed,

    // ========================================================================
    // Launch Errors
    // ========================================================================
    /// Chromium binary not found.
    ///
    /// Returned when no browser executable exists at the configured or
    /// well-known paths.
    #[error("Chromium not found at: {path}")]
    ChromeNotFound {
        /// Path where the binary was expected.
        path: PathBuf,
    },

    /// Failed to launch the browser process.
    #[error("Failed to launch Chromium: {message}")]
    Launch {
        /// Description of the launch failure.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a checkout timeout error.
    #[inline]
    pub fn checkout_timeout(timeout_ms: u64) -> Self {
        Self::CheckoutTimeout { timeout_ms }
    }

    /// Creates a call timeout error.
    #[inline]
    pub fn call_timeout(call_id: CallId, method: impl Into<String>, timeout_ms: u64) -> Self {
        Self::CallTimeout {
            call_id,
            method: method.into(),
            timeout_ms,
        }
    }

    /// Creates an event timeout error.
    #[inline]
    pub fn event_timeout(method: impl Into<String>, timeout_ms: u64) -> Self {
        Self::EventTimeout {
            method: method.into(),
            timeout_ms,
        }
    }

    /// Creates a target crashed error.
    #[inline]
    pub fn target_crashed(session_id: SessionId) -> Self {
        Self::TargetCrashed { session_id }
    }

    /// Creates a CDP error from a peer error payload.
    #[inline]
    pub fn cdp(code: i64, message: impl Into<String>) -> Self {
        Self::Cdp {
            code,
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a Chromium not found error.
    #[inline]
    pub fn chrome_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ChromeNotFound { path: path.into() }
    }

    /// Creates a launch error.
    #[inline]
    pub fn launch(message: impl Into<String>) -> Self {
        Self::Launch {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::CheckoutTimeout { .. } | Self::CallTimeout { .. } | Self::EventTimeout { .. }
        )
    }

    /// Returns `true` if this is a crash error.
    #[inline]
    #[must_use]
    pub fn is_crash(&self) -> bool {
        matches!(self, Self::TargetCrashed { .. })
    }

    /// Returns `true` if this is a transport error.
    ///
    /// Transport errors are pool-wide: every session on the channel is
    /// invalid once one occurs.
    #[inline]
    #[must_use]
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::ChannelClosed | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error carries a peer-reported payload.
    #[inline]
    #[must_use]
    pub fn is_cdp_error(&self) -> bool {
        matches!(self, Self::Cdp { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================
