//! Browser execution contexts and their pooling.
//!
//! A [`Session`] is a handle to one page target attached over the shared
//! channel; the [`SessionPool`] bounds how many exist and serializes their
//! checkout/checkin lifecycle.
//!
//! # Session Lifecycle
//!
//! ```text
//!            checkout              checkin
//!   Idle ───────────────► Busy ───────────────► Idle
//!    │                     │
//!    │   crash event       │   crash event
//!    └────────────► Crashed ◄────────────┘
//!                      │
//!                      ▼ discarded, replaced lazily
//! ```
//!
//! A crashed session is never reused. At most one caller holds a session
//! busy at a time; the pool's checkout discipline enforces this.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::error::Result;
use crate::identifiers::{SessionId, SubscriptionId, TargetId};
use crate::transport::{Channel, EventSubscription, PendingResponse};

// ============================================================================
// Submodules
// ============================================================================

/// Fixed-size session pool with FIFO checkout.
pub mod pool;

pub use pool::{PoolOptions, SessionPool};

// ============================================================================
// SessionStatus
// ============================================================================

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Available for checkout.
    Idle,
    /// Checked out by exactly one invocation.
    Busy,
    /// Target crashed; the session will be discarded, never reused.
    Crashed,
}

// ============================================================================
// Session
// ============================================================================

/// Handle to one browser execution context (an attached page target).
///
/// Carries the shared channel, the session-scoped ID that routes commands
/// to the right target, and the mutable lifecycle status. Cloning shares
/// the status; the pool hands each session to at most one invocation at a
/// time.
#[derive(Clone)]
pub struct Session {
    /// Shared command channel.
    channel: Channel,
    /// Browser-issued target ID.
    target_id: TargetId,
    /// Browser-issued session ID used for command routing.
    session_id: SessionId,
    /// Lifecycle status, shared with the pool's crash monitor.
    status: Arc<Mutex<SessionStatus>>,
    /// Crash-watch registration while busy; taken back at checkin.
    crash_watch: Arc<Mutex<Option<SubscriptionId>>>,
}

impl Session {
    /// Creates an idle session over an attached target.
    pub(crate) fn new(channel: Channel, target_id: TargetId, session_id: SessionId) -> Self {
        Self {
            channel,
            target_id,
            session_id,
            status: Arc::new(Mutex::new(SessionStatus::Idle)),
            crash_watch: Arc::new(Mutex::new(None)),
        }
    }

    /// Returns the shared channel.
    #[inline]
    #[must_use]
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Returns the browser-issued target ID.
    #[inline]
    #[must_use]
    pub fn target_id(&self) -> &TargetId {
        &self.target_id
    }

    /// Returns the browser-issued session ID.
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Returns the current lifecycle status.
    #[inline]
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        *self.status.lock()
    }

    /// Returns `true` if the target has crashed.
    #[inline]
    #[must_use]
    pub fn is_crashed(&self) -> bool {
        self.status() == SessionStatus::Crashed
    }
}

// ============================================================================
// Session - Status Transitions
// ============================================================================

impl Session {
    /// Marks the session busy (checkout).
    pub(crate) fn mark_busy(&self) {
        let mut status = self.status.lock();
        if *status != SessionStatus::Crashed {
            *status = SessionStatus::Busy;
        }
    }

    /// Marks the session idle (checkin).
    pub(crate) fn mark_idle(&self) {
        let mut status = self.status.lock();
        if *status != SessionStatus::Crashed {
            *status = SessionStatus::Idle;
        }
    }

    /// Marks the session crashed. Irreversible.
    pub(crate) fn mark_crashed(&self) {
        *self.status.lock() = SessionStatus::Crashed;
    }

    /// Records the crash-watch registration for the busy period.
    pub(crate) fn set_crash_watch(&self, id: SubscriptionId) {
        *self.crash_watch.lock() = Some(id);
    }

    /// Takes the crash-watch registration back at checkin.
    pub(crate) fn take_crash_watch(&self) -> Option<SubscriptionId> {
        self.crash_watch.lock().take()
    }
}

// ============================================================================
// Session - Commands
// ============================================================================

impl Session {
    /// Issues a command routed to this session and waits for the response.
    ///
    /// # Errors
    ///
    /// Propagates the channel's call errors.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        self.channel
            .call(Some(self.session_id.clone()), method, params)
            .await
    }

    /// Issues a command routed to this session without awaiting.
    ///
    /// # Errors
    ///
    /// Propagates the channel's issue errors.
    pub fn begin_call(&self, method: &str, params: Value) -> Result<PendingResponse> {
        self.channel
            .begin_call(Some(self.session_id.clone()), method, params)
    }

    /// Issues a fire-and-forget command routed to this session.
    ///
    /// # Errors
    ///
    /// Returns an error only if the channel is closed.
    pub fn notify(&self, method: &str, params: Value) -> Result<()> {
        self.channel
            .notify(Some(self.session_id.clone()), method, params)
    }

    /// Registers a listener for events from this session.
    #[must_use]
    pub fn subscribe(&self, pattern: impl Into<String>) -> EventSubscription {
        self.channel
            .subscribe(Some(self.session_id.clone()), pattern)
    }
}

// ============================================================================
// Session - Display
// ============================================================================

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("target_id", &self.target_id)
            .field("session_id", &self.session_id)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
