//! Type-safe identifiers for protocol entities.
//!
//! Newtype wrappers prevent mixing incompatible IDs at compile time:
//! a [`CallId`] correlates one command with its response, a [`TargetId`]
//! names a browser page target, a [`SessionId`] routes commands to an
//! attached target, and a [`SubscriptionId`] names an event listener
//! registration.
//!
//! # ID Sources
//!
//! | Type | Issued by | Representation |
//! |------|-----------|----------------|
//! | [`CallId`] | local end (monotonic counter) | integer |
//! | [`TargetId`] | browser | opaque string |
//! | [`SessionId`] | browser | opaque string |
//! | [`SubscriptionId`] | local end (monotonic counter) | integer |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// CallId
// ============================================================================

/// Correlation ID linking a command to its eventual response.
///
/// Assigned from a monotonically increasing counter at send time and never
/// reused while the call is outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(u64);

impl CallId {
    /// Creates a call ID from a raw counter value.
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw counter value.
    #[inline]
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// TargetId
// ============================================================================

/// Browser-issued identifier for a page target.
///
/// Returned by `Target.createTarget`; opaque to the local end.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    /// Wraps a browser-issued target ID string.
    #[inline]
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the ID as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// SessionId
// ============================================================================

/// Browser-issued identifier for an attached target session.
///
/// Returned by `Target.attachToTarget`; every command routed to a page
/// carries this ID, and every event originating from the page carries it
/// back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wraps a browser-issued session ID string.
    #[inline]
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the ID as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// SubscriptionId
// ============================================================================

/// Identifier for an event listener registration.
///
/// Returned by `Channel::subscribe`; passed to `Channel::unsubscribe` to
/// remove the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Creates a subscription ID from a raw counter value.
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
