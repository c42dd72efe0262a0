//! Fixed-size session pool with FIFO checkout.
//!
//! The pool bounds concurrency against the browser process and isolates
//! failures per execution context:
//!
//! - Sessions are created lazily, up to the configured size.
//! - `checkout` blocks (bounded) until a session is idle or can be
//!   created; waiters are served in arrival order.
//! - A crashed session is discarded at checkin and replaced lazily; a
//!   queued waiter triggers immediate replacement so it is not starved.
//!
//! # Crash Protocol
//!
//! While busy, each session is watched for `Inspector.targetCrashed`. On
//! receipt the session is marked crashed and a grace timer starts; a
//! legitimately in-flight response arriving during the grace period still
//! succeeds its call. Once the grace period elapses, outstanding calls on
//! the session fail with a crash error.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::{SessionId, TargetId};
use crate::transport::{Channel, EventSubscription};

use super::Session;

// ============================================================================
// Constants
// ============================================================================

/// Event announcing that a page target crashed.
const CRASH_EVENT: &str = "Inspector.targetCrashed";

/// Default number of concurrent sessions.
const DEFAULT_POOL_SIZE: usize = 1;

/// Default bound on waiting for an available session.
const DEFAULT_CHECKOUT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default wait after a crash event before abandoning in-flight calls.
const DEFAULT_CRASH_GRACE_PERIOD: Duration = Duration::from_millis(500);

// ============================================================================
// PoolOptions
// ============================================================================

/// Session pool configuration.
///
/// # Example
///
/// ```ignore
/// let options = PoolOptions::new()
///     .with_size(4)
///     .with_checkout_timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOptions {
    /// Number of concurrent sessions (pool size N).
    pub size: usize,

    /// Bound on waiting for an available session (checkout timeout T).
    pub checkout_timeout: Duration,

    /// Wait after a crash event before abandoning in-flight calls.
    pub crash_grace_period: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            size: DEFAULT_POOL_SIZE,
            checkout_timeout: DEFAULT_CHECKOUT_TIMEOUT,
            crash_grace_period: DEFAULT_CRASH_GRACE_PERIOD,
        }
    }
}

impl PoolOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the pool size.
    #[inline]
    #[must_use]
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size.max(1);
        self
    }

    /// Sets the checkout timeout.
    #[inline]
    #[must_use]
    pub fn with_checkout_timeout(mut self, bound: Duration) -> Self {
        self.checkout_timeout = bound;
        self
    }

    /// Sets the crash grace period.
    #[inline]
    #[must_use]
    pub fn with_crash_grace_period(mut self, grace: Duration) -> Self {
        self.crash_grace_period = grace;
        self
    }
}

// ============================================================================
// Types
// ============================================================================

/// Mutable pool bookkeeping.
#[derive(Default)]
struct PoolState {
    /// Sessions available for checkout, oldest first.
    idle: VecDeque<Session>,
    /// Sessions in existence (idle + busy).
    live: usize,
    /// Checkout waiters in arrival order.
    waiters: VecDeque<oneshot::Sender<Session>>,
    /// Set once the pool is torn down; terminal.
    invalidated: bool,
}

/// Shared pool internals.
struct PoolInner {
    /// Browser-level command channel.
    channel: Channel,
    /// Pool configuration.
    options: PoolOptions,
    /// Bookkeeping, never held across an await.
    state: Mutex<PoolState>,
}

/// Outcome of the checkout fast path.
enum CheckoutPlan {
    /// An idle session was available.
    Ready(Session),
    /// A creation slot was reserved.
    Create,
    /// The pool is full; wait for a checkin.
    Wait(oneshot::Receiver<Session>),
}

// ============================================================================
// SessionPool
// ============================================================================

/// Bounded pool of browser sessions.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct SessionPool {
    inner: Arc<PoolInner>,
}

impl SessionPool {
    /// Creates an empty pool over a channel.
    ///
    /// Sessions are created lazily on first checkout.
    #[must_use]
    pub fn new(channel: Channel, options: PoolOptions) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                channel,
                options,
                state: Mutex::new(PoolState::default()),
            }),
        }
    }

    /// Returns the pool configuration.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &PoolOptions {
        &self.inner.options
    }

    /// Returns the number of sessions currently idle.
    #[inline]
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.inner.state.lock().idle.len()
    }

    /// Returns the number of sessions in existence (idle + busy).
    #[inline]
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.inner.state.lock().live
    }
}

// ============================================================================
// SessionPool - Checkout / Checkin
// ============================================================================

impl SessionPool {
    /// Checks out a session, blocking until one is available.
    ///
    /// Sessions are created lazily while the pool is below its size;
    /// otherwise the caller queues behind earlier waiters (FIFO).
    ///
    /// # Errors
    ///
    /// - [`Error::CheckoutTimeout`] if no session becomes available in time
    /// - [`Error::ChannelClosed`] if the pool or its channel is gone
    /// - Session-creation errors are propagated verbatim
    pub async fn checkout(&self) -> Result<Session> {
        if self.inner.channel.is_closed() {
            return Err(Error::ChannelClosed);
        }

        let plan = {
            let mut state = self.inner.state.lock();
            if state.invalidated {
                return Err(Error::ChannelClosed);
            }

            if let Some(session) = state.idle.pop_front() {
                CheckoutPlan::Ready(session)
            } else if state.live < self.inner.options.size {
                state.live += 1;
                CheckoutPlan::Create
            } else {
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                debug!(waiters = state.waiters.len(), "Pool full, queueing checkout");
                CheckoutPlan::Wait(rx)
            }
        };

        match plan {
            CheckoutPlan::Ready(session) => {
                debug!(session_id = %session.session_id(), "Idle session checked out");
                Ok(self.activate(session))
            }

            CheckoutPlan::Create => match self.create_session().await {
                Ok(session) => Ok(self.activate(session)),
                Err(e) => {
                    self.inner.state.lock().live -= 1;
                    Err(e)
                }
            },

            CheckoutPlan::Wait(rx) => {
                let bound = self.inner.options.checkout_timeout;
                match timeout(bound, rx).await {
                    Ok(Ok(session)) => {
                        debug!(session_id = %session.session_id(), "Queued checkout served");
                        Ok(self.activate(session))
                    }
                    // Sender dropped: the pool was invalidated while we
                    // waited.
                    Ok(Err(_)) => Err(Error::ChannelClosed),
                    Err(_) => {
                        // Our sender stays queued; checkin's handoff skips
                        // dead waiters, so no cleanup is needed here.
                        Err(Error::checkout_timeout(bound.as_millis() as u64))
                    }
                }
            }
        }
    }

    /// Checks a session back in.
    ///
    /// An idle session becomes available to the next waiter; a crashed
    /// one is discarded and replaced lazily.
    pub fn checkin(&self, session: Session) {
        if let Some(watch) = session.take_crash_watch() {
            self.inner.channel.unsubscribe(watch);
        }

        if self.inner.state.lock().invalidated {
            session.mark_crashed();
            debug!(session_id = %session.session_id(), "Session dropped after pool invalidation");
            return;
        }

        if session.is_crashed() || self.inner.channel.is_closed() {
            self.discard(session);
            return;
        }

        session.mark_idle();
        debug!(session_id = %session.session_id(), "Session checked in");
        self.deliver(session);
    }

    /// Discards every session and fails every waiter.
    ///
    /// Called when the browser process itself is gone; the pool cannot be
    /// used afterwards.
    pub fn invalidate_all(&self) {
        let (idle, waiters) = {
            let mut state = self.inner.state.lock();
            if state.invalidated {
                return;
            }
            state.invalidated = true;
            state.live = 0;
            (
                std::mem::take(&mut state.idle),
                std::mem::take(&mut state.waiters),
            )
        };

        for session in &idle {
            session.mark_crashed();
        }

        let discarded = idle.len();
        let failed_waiters = waiters.len();
        drop(waiters); // receivers observe closure and fail their checkout

        warn!(discarded, failed_waiters, "Pool invalidated, all sessions discarded");
    }
}

// ============================================================================
// SessionPool - Internals
// ============================================================================

impl SessionPool {
    /// Marks a session busy and arms its crash watch.
    fn activate(&self, session: Session) -> Session {
        session.mark_busy();

        let watch = self
            .inner
            .channel
            .subscribe(Some(session.session_id().clone()), CRASH_EVENT);
        session.set_crash_watch(watch.id());

        tokio::spawn(crash_monitor(
            session.clone(),
            watch,
            self.inner.options.crash_grace_period,
            self.inner.channel.clone(),
        ));

        session
    }

    /// Creates and attaches a fresh page target.
    async fn create_session(&self) -> Result<Session> {
        let channel = &self.inner.channel;

        let created = channel
            .call(None, "Target.createTarget", json!({"url": "about:blank"}))
            .await?;
        let target_id = created
            .get("targetId")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::protocol("Target.createTarget response missing targetId"))?
            .to_string();

        let attached = channel
            .call(
                None,
                "Target.attachToTarget",
                json!({"targetId": target_id, "flatten": true}),
            )
            .await?;
        let session_id = attached
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::protocol("Target.attachToTarget response missing sessionId"))?
            .to_string();

        let session = Session::new(
            channel.clone(),
            TargetId::new(&target_id),
            SessionId::new(&session_id),
        );
        session.call("Page.enable", Value::Null).await?;

        info!(target_id = %target_id, session_id = %session_id, "Session created");
        Ok(session)
    }

    /// Discards a dead session and replaces it if a waiter is queued.
    fn discard(&self, session: Session) {
        warn!(
            session_id = %session.session_id(),
            target_id = %session.target_id(),
            "Discarding crashed session"
        );

        // Best-effort cleanup of the dead target.
        let _ = self.inner.channel.notify(
            None,
            "Target.closeTarget",
            json!({"targetId": session.target_id().as_str()}),
        );

        let spawn_replacement = {
            let mut state = self.inner.state.lock();
            if state.invalidated {
                false
            } else {
                state.live -= 1;
                if state.waiters.is_empty() {
                    // Replacement happens lazily on next demand.
                    false
                } else {
                    state.live += 1;
                    true
                }
            }
        };

        if spawn_replacement {
            debug!("Creating replacement session for queued waiter");
            let pool = self.clone();
            tokio::spawn(async move {
                match pool.create_session().await {
                    Ok(session) => pool.deliver(session),
                    Err(e) => {
                        warn!(error = %e, "Replacement session creation failed");
                        pool.inner.state.lock().live -= 1;
                    }
                }
            });
        }
    }

    /// Hands an idle session to the first live waiter, or parks it.
    fn deliver(&self, session: Session) {
        let mut state = self.inner.state.lock();
        if state.invalidated {
            session.mark_crashed();
            return;
        }

        let mut session = session;
        while let Some(waiter) = state.waiters.pop_front() {
            match waiter.send(session) {
                Ok(()) => return,
                // Waiter timed out and dropped its receiver; serve the
                // next one.
                Err(returned) => session = returned,
            }
        }

        state.idle.push_back(session);
    }
}

// ============================================================================
// Crash Monitor
// ============================================================================

/// Watches one busy session for a crash event.
///
/// Ends silently when the session is checked in (the watch listener is
/// removed, closing the subscription).
async fn crash_monitor(
    session: Session,
    mut watch: EventSubscription,
    grace: Duration,
    channel: Channel,
) {
    if watch.next().await.is_none() {
        return;
    }

    session.mark_crashed();
    warn!(
        session_id = %session.session_id(),
        grace_ms = grace.as_millis() as u64,
        "Target crash detected, awaiting possible late response"
    );

    tokio::time::sleep(grace).await;

    let session_id = session.session_id().clone();
    let abandoned = channel.fail_session(&session_id, || Error::target_crashed(session_id.clone()));

    if abandoned > 0 {
        warn!(
            session_id = %session_id,
            abandoned,
            "Target crash confirmed, outstanding calls abandoned"
        );
    } else {
        debug!(session_id = %session_id, "Target crash confirmed, no outstanding calls");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionStatus;
    use crate::transport::fake::{STUB_PDF_BASE64, fake_transport};

    fn stub_pool(options: PoolOptions) -> (SessionPool, crate::transport::fake::StubBrowser) {
        crate::transport::fake::init_test_tracing();
        let (transport, peer) = fake_transport();
        let channel = Channel::new(transport);
        let stub = peer.into_stub();
        (SessionPool::new(channel, options), stub)
    }

    #[tokio::test]
    async fn test_checkout_creates_lazily_and_checkin_reuses() {
        let (pool, _stub) = stub_pool(PoolOptions::new().with_size(2));
        assert_eq!(pool.live_count(), 0);

        let session = pool.checkout().await.expect("checkout");
        assert_eq!(session.status(), SessionStatus::Busy);
        assert_eq!(pool.live_count(), 1);

        let first_id = session.session_id().clone();
        pool.checkin(session);
        assert_eq!(pool.idle_count(), 1);

        // Reused, not recreated.
        let session = pool.checkout().await.expect("second checkout");
        assert_eq!(session.session_id(), &first_id);
        assert_eq!(pool.live_count(), 1);
        pool.checkin(session);
    }

    #[tokio::test]
    async fn test_full_pool_serves_waiters_in_arrival_order() {
        let (pool, _stub) = stub_pool(
            PoolOptions::new()
                .with_size(1)
                .with_checkout_timeout(Duration::from_secs(2)),
        );

        let held = pool.checkout().await.expect("first checkout");

        let order = Arc::new(Mutex::new(Vec::<&'static str>::new()));

        let first_waiter = {
            let pool = pool.clone();
            let order = Arc::clone(&order);
            tokio::spawn(async move {
                let session = pool.checkout().await.expect("queued checkout");
                order.lock().push("first");
                pool.checkin(session);
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let second_waiter = {
            let pool = pool.clone();
            let order = Arc::clone(&order);
            tokio::spawn(async move {
                let session = pool.checkout().await.expect("queued checkout");
                order.lock().push("second");
                pool.checkin(session);
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Both are queued; nothing has run yet.
        assert!(order.lock().is_empty());

        pool.checkin(held);
        first_waiter.await.expect("first waiter");
        second_waiter.await.expect("second waiter");

        assert_eq!(*order.lock(), vec!["first", "second"]);
        assert_eq!(pool.live_count(), 1);
    }

    #[tokio::test]
    async fn test_checkout_times_out_when_pool_exhausted() {
        let (pool, _stub) = stub_pool(
            PoolOptions::new()
                .with_size(1)
                .with_checkout_timeout(Duration::from_millis(50)),
        );

        let held = pool.checkout().await.expect("first checkout");

        let err = pool.checkout().await.unwrap_err();
        assert!(matches!(err, Error::CheckoutTimeout { timeout_ms: 50 }));

        pool.checkin(held);
    }

    #[tokio::test]
    async fn test_crashed_session_is_discarded_and_replaced() {
        let (pool, stub) = stub_pool(PoolOptions::new().with_size(1));

        let session = pool.checkout().await.expect("checkout");
        let crashed_id = session.session_id().clone();

        stub.emit_event("Inspector.targetCrashed", Value::Null, Some(crashed_id.as_str()));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(session.is_crashed());

        pool.checkin(session);
        assert_eq!(pool.idle_count(), 0);

        // Replacement is lazy: the next checkout creates a fresh target.
        let replacement = pool.checkout().await.expect("replacement checkout");
        assert_ne!(replacement.session_id(), &crashed_id);
        assert_eq!(pool.live_count(), 1);
        pool.checkin(replacement);
    }

    #[tokio::test]
    async fn test_crash_fails_in_flight_call_after_grace() {
        let (pool, stub) = stub_pool(
            PoolOptions::new().with_crash_grace_period(Duration::from_millis(50)),
        );

        let session = pool.checkout().await.expect("checkout");
        stub.silence("Page.printToPDF");

        let pending = session
            .begin_call("Page.printToPDF", json!({}))
            .expect("begin call");

        tokio::time::sleep(Duration::from_millis(10)).await;
        stub.emit_event(
            "Inspector.targetCrashed",
            Value::Null,
            Some(session.session_id().as_str()),
        );

        let err = pending.wait().await.unwrap_err();
        assert!(err.is_crash());

        pool.checkin(session);
    }

    #[tokio::test]
    async fn test_late_response_during_grace_still_succeeds() {
        let (pool, stub) = stub_pool(
            PoolOptions::new().with_crash_grace_period(Duration::from_millis(200)),
        );

        let session = pool.checkout().await.expect("checkout");
        stub.silence("Page.printToPDF");

        let pending = session
            .begin_call("Page.printToPDF", json!({}))
            .expect("begin call");
        let crashed_id = session.session_id().clone();

        tokio::time::sleep(Duration::from_millis(10)).await;
        stub.emit_event("Inspector.targetCrashed", Value::Null, Some(crashed_id.as_str()));
        tokio::time::sleep(Duration::from_millis(30)).await;

        // The response lands inside the grace window.
        let recorded = stub.unanswered_calls();
        let call_id = recorded
            .last()
            .and_then(|frame| frame["id"].as_u64())
            .expect("recorded silenced call");
        stub.respond(call_id, json!({"data": STUB_PDF_BASE64}));

        let result = pending.wait().await.expect("late response succeeds");
        assert_eq!(result["data"], STUB_PDF_BASE64);

        // The session does not get resurrected by the late response.
        assert!(session.is_crashed());
        pool.checkin(session);

        let replacement = pool.checkout().await.expect("replacement");
        assert_ne!(replacement.session_id(), &crashed_id);
        pool.checkin(replacement);
    }

    #[tokio::test]
    async fn test_invalidate_all_fails_waiters_and_checkouts() {
        let (pool, _stub) = stub_pool(
            PoolOptions::new()
                .with_size(1)
                .with_checkout_timeout(Duration::from_secs(2)),
        );

        let held = pool.checkout().await.expect("checkout");

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.checkout().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        pool.invalidate_all();

        let err = waiter.await.expect("join").unwrap_err();
        assert!(matches!(err, Error::ChannelClosed));

        let err = pool.checkout().await.unwrap_err();
        assert!(matches!(err, Error::ChannelClosed));

        // Checking the held session back in just drops it.
        pool.checkin(held);
        assert_eq!(pool.live_count(), 0);
        assert_eq!(pool.idle_count(), 0);
    }
}
