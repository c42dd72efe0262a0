//! Correlated command channel over one transport.
//!
//! The channel turns the raw message stream into a request/response/event
//! abstraction:
//!
//! - Outgoing commands get a monotonically increasing [`CallId`] and a
//!   one-shot slot the caller blocks on.
//! - Inbound messages are demultiplexed by the event loop: responses are
//!   matched by ID to a waiting caller, events are fanned out to
//!   registered listeners.
//!
//! # Concurrency Contract
//!
//! Exactly one reader per channel (the spawned event loop); arbitrarily
//! many concurrent callers. Each caller receives exactly its own response,
//! never another caller's. A late response for an abandoned call is
//! discarded silently.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{CallId, SessionId, SubscriptionId};
use crate::protocol::{Call, Event, Message};

use super::{Transport, TransportRx, TransportTx};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for command execution.
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum pending calls before rejecting new ones.
const MAX_PENDING_CALLS: usize = 256;

// ============================================================================
// Types
// ============================================================================

/// One outstanding call awaiting its response.
struct PendingCall {
    /// One-shot slot the caller blocks on.
    tx: oneshot::Sender<Result<Value>>,
    /// Command method (for logging).
    method: String,
    /// Session the call was routed to, if any.
    session_id: Option<SessionId>,
}

/// Map of call IDs to outstanding calls.
type CorrelationMap = FxHashMap<CallId, PendingCall>;

/// One registered event listener.
struct EventListener {
    /// Session filter; `None` matches browser-level events only.
    session_id: Option<SessionId>,
    /// Method pattern: exact name or `Domain.*` wildcard.
    pattern: String,
    /// Delivery channel for matching events.
    tx: mpsc::UnboundedSender<Event>,
}

/// Map of subscription IDs to listeners.
type ListenerMap = FxHashMap<SubscriptionId, EventListener>;

// ============================================================================
// ChannelCommand
// ============================================================================

/// Internal commands for the event loop.
enum ChannelCommand {
    /// Send a serialized frame; `call_id` identifies the pending entry to
    /// fail if the write errors.
    Send { text: String, call_id: CallId },
    /// Shut down the channel.
    Shutdown,
}

// ============================================================================
// Channel
// ============================================================================

/// Correlated command channel to the browser.
///
/// Cheap to clone; all clones share the same event loop and transport.
///
/// # Thread Safety
///
/// `Channel` is `Send + Sync` and can be shared across tasks. All
/// operations are non-blocking except the awaits on issued calls.
#[derive(Clone)]
pub struct Channel {
    /// Command channel into the event loop.
    command_tx: mpsc::UnboundedSender<ChannelCommand>,
    /// Correlation map (shared with the event loop).
    correlation: Arc<Mutex<CorrelationMap>>,
    /// Event listeners (shared with the event loop).
    listeners: Arc<Mutex<ListenerMap>>,
    /// Monotonic call ID counter.
    next_call_id: Arc<AtomicU64>,
    /// Monotonic subscription ID counter.
    next_subscription_id: Arc<AtomicU64>,
    /// Set once the event loop has terminated.
    closed: Arc<AtomicBool>,
    /// Bound on every call and event wait.
    call_timeout: Duration,
}

impl Channel {
    /// Creates a channel over a transport with the default call timeout.
    ///
    /// Spawns the event loop task internally.
    #[must_use]
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self::with_call_timeout(transport, DEFAULT_CALL_TIMEOUT)
    }

    /// Creates a channel with a custom call timeout.
    #[must_use]
    pub fn with_call_timeout(transport: Box<dyn Transport>, call_timeout: Duration) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let correlation = Arc::new(Mutex::new(CorrelationMap::default()));
        let listeners = Arc::new(Mutex::new(ListenerMap::default()));
        let closed = Arc::new(AtomicBool::new(false));

        let (transport_tx, transport_rx) = transport.into_split();

        tokio::spawn(Self::run_event_loop(
            transport_tx,
            transport_rx,
            command_rx,
            Arc::clone(&correlation),
            Arc::clone(&listeners),
            Arc::clone(&closed),
        ));

        Self {
            command_tx,
            correlation,
            listeners,
            next_call_id: Arc::new(AtomicU64::new(1)),
            next_subscription_id: Arc::new(AtomicU64::new(1)),
            closed,
            call_timeout,
        }
    }

    /// Returns the timeout bound applied to calls and event waits.
    #[inline]
    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Returns `true` if the event loop has terminated.
    ///
    /// A closed channel fails every subsequent call immediately; all
    /// sessions on it are invalid.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Returns the number of outstanding calls.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.correlation.lock().len()
    }

    /// Shuts down the channel gracefully.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(ChannelCommand::Shutdown);
    }
}

// ============================================================================
// Channel - Calls
// ============================================================================

impl Channel {
    /// Issues a command and waits for its response.
    ///
    /// # Errors
    ///
    /// - [`Error::ChannelClosed`] if the channel is closed
    /// - [`Error::CallTimeout`] if no response arrives within the bound
    /// - [`Error::Cdp`] if the browser returns an error payload
    /// - [`Error::TargetCrashed`] if the session crashed while the call
    ///   was in flight
    pub async fn call(
        &self,
        session_id: Option<SessionId>,
        method: &str,
        params: Value,
    ) -> Result<Value> {
        self.begin_call(session_id, method, params)?.wait().await
    }

    /// Issues a command without awaiting its response.
    ///
    /// The returned [`PendingResponse`] is the handle for the deferred
    /// await. Dropping it abandons the call; its eventual response is
    /// discarded silently by the event loop.
    ///
    /// # Errors
    ///
    /// - [`Error::ChannelClosed`] if the channel is closed
    /// - [`Error::Protocol`] if too many calls are already outstanding
    pub fn begin_call(
        &self,
        session_id: Option<SessionId>,
        method: &str,
        params: Value,
    ) -> Result<PendingResponse> {
        if self.is_closed() {
            return Err(Error::ChannelClosed);
        }

        {
            let correlation = self.correlation.lock();
            if correlation.len() >= MAX_PENDING_CALLS {
                warn!(
                    pending = correlation.len(),
                    max = MAX_PENDING_CALLS,
                    "Too many pending calls"
                );
                return Err(Error::protocol(format!(
                    "too many pending calls: {}/{}",
                    correlation.len(),
                    MAX_PENDING_CALLS
                )));
            }
        }

        let call_id = self.next_id();
        let call = Call::new(call_id, method, params, session_id.clone());
        let text = serde_json::to_string(&call)?;

        // Register the pending entry before handing the frame to the event
        // loop, so a fast response cannot miss it.
        let (tx, rx) = oneshot::channel();
        self.correlation.lock().insert(
            call_id,
            PendingCall {
                tx,
                method: method.to_string(),
                session_id,
            },
        );

        if self
            .command_tx
            .send(ChannelCommand::Send { text, call_id })
            .is_err()
        {
            self.correlation.lock().remove(&call_id);
            return Err(Error::ChannelClosed);
        }

        trace!(call_id = %call_id, method, "Call issued");

        Ok(PendingResponse {
            call_id,
            method: method.to_string(),
            rx,
            timeout: self.call_timeout,
            correlation: Arc::clone(&self.correlation),
        })
    }

    /// Issues a fire-and-forget command.
    ///
    /// The command still carries a call ID on the wire, but no pending
    /// entry is registered; any response for it is discarded by the
    /// unmatched-response rule.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelClosed`] if the channel is closed.
    pub fn notify(
        &self,
        session_id: Option<SessionId>,
        method: &str,
        params: Value,
    ) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ChannelClosed);
        }

        let call_id = self.next_id();
        let call = Call::new(call_id, method, params, session_id);
        let text = serde_json::to_string(&call)?;

        self.command_tx
            .send(ChannelCommand::Send { text, call_id })
            .map_err(|_| Error::ChannelClosed)?;

        trace!(call_id = %call_id, method, "Notification issued");
        Ok(())
    }

    /// Assigns the next call ID.
    #[inline]
    fn next_id(&self) -> CallId {
        CallId::new(self.next_call_id.fetch_add(1, Ordering::Relaxed))
    }
}

// ============================================================================
// Channel - Events
// ============================================================================

impl Channel {
    /// Registers an event listener.
    ///
    /// Matching events are delivered to the returned subscription until it
    /// is unsubscribed or dropped. `session_id` of `None` matches
    /// browser-level events (those carrying no session).
    #[must_use]
    pub fn subscribe(
        &self,
        session_id: Option<SessionId>,
        pattern: impl Into<String>,
    ) -> EventSubscription {
        let id = SubscriptionId::new(self.next_subscription_id.fetch_add(1, Ordering::Relaxed));
        let pattern = pattern.into();
        let (tx, rx) = mpsc::unbounded_channel();

        debug!(subscription = %id, pattern = %pattern, "Listener registered");

        self.listeners.lock().insert(
            id,
            EventListener {
                session_id,
                pattern,
                tx,
            },
        );

        EventSubscription { id, rx }
    }

    /// Removes an event listener.
    ///
    /// Removal is idempotent; an already-removed ID is a no-op.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        if self.listeners.lock().remove(&id).is_some() {
            debug!(subscription = %id, "Listener removed");
        }
    }

    /// Fails every outstanding call routed to a session.
    ///
    /// Used by the pool's crash protocol once the grace period elapses.
    /// Returns the number of calls abandoned.
    pub fn fail_session(&self, session_id: &SessionId, make_error: impl Fn() -> Error) -> usize {
        let drained: Vec<(CallId, PendingCall)> = {
            let mut correlation = self.correlation.lock();
            let ids: Vec<CallId> = correlation
                .iter()
                .filter(|(_, pending)| pending.session_id.as_ref() == Some(session_id))
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| correlation.remove(&id).map(|pending| (id, pending)))
                .collect()
        };

        let count = drained.len();
        for (call_id, pending) in drained {
            debug!(
                call_id = %call_id,
                method = %pending.method,
                "Failing in-flight call for crashed session"
            );
            let _ = pending.tx.send(Err(make_error()));
        }

        count
    }
}

// ============================================================================
// Channel - Event Loop
// ============================================================================

impl Channel {
    /// Event loop: the channel's single reader.
    async fn run_event_loop(
        mut transport_tx: Box<dyn TransportTx>,
        mut transport_rx: Box<dyn TransportRx>,
        mut command_rx: mpsc::UnboundedReceiver<ChannelCommand>,
        correlation: Arc<Mutex<CorrelationMap>>,
        listeners: Arc<Mutex<ListenerMap>>,
        closed: Arc<AtomicBool>,
    ) {
        loop {
            tokio::select! {
                // Inbound messages from the browser
                incoming = transport_rx.receive() => {
                    match incoming {
                        Ok(Some(text)) => {
                            Self::dispatch_message(&text, &correlation, &listeners);
                        }
                        Ok(None) => {
                            debug!("Transport closed by peer");
                            break;
                        }
                        Err(e) => {
                            error!(error = %e, "Transport error");
                            break;
                        }
                    }
                }

                // Outgoing frames from callers
                command = command_rx.recv() => {
                    match command {
                        Some(ChannelCommand::Send { text, call_id }) => {
                            if let Err(e) = transport_tx.send(text).await {
                                warn!(call_id = %call_id, error = %e, "Send failed");
                                if let Some(pending) = correlation.lock().remove(&call_id) {
                                    let _ = pending
                                        .tx
                                        .send(Err(Error::connection(e.to_string())));
                                }
                            }
                        }

                        Some(ChannelCommand::Shutdown) => {
                            debug!("Shutdown command received");
                            break;
                        }

                        None => {
                            debug!("Command channel closed");
                            break;
                        }
                    }
                }
            }
        }

        closed.store(true, Ordering::SeqCst);
        Self::fail_pending_calls(&correlation);
        listeners.lock().clear();

        debug!("Event loop terminated");
    }

    /// Routes one inbound frame to a waiting caller or to listeners.
    fn dispatch_message(
        text: &str,
        correlation: &Arc<Mutex<CorrelationMap>>,
        listeners: &Arc<Mutex<ListenerMap>>,
    ) {
        let message = match Message::parse(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Failed to parse inbound message");
                return;
            }
        };

        match message {
            Message::Response(response) => {
                let pending = correlation.lock().remove(&response.id);

                match pending {
                    Some(pending) => {
                        trace!(call_id = %response.id, method = %pending.method, "Response matched");
                        let _ = pending.tx.send(response.into_result());
                    }
                    None => {
                        // Late response after a timeout, or a reply to a
                        // notification. Discarded by contract.
                        trace!(call_id = %response.id, "Response for unknown call discarded");
                    }
                }
            }

            Message::Event(event) => {
                Self::dispatch_event(event, listeners);
            }
        }
    }

    /// Fans an event out to all matching listeners, pruning dead ones.
    fn dispatch_event(event: Event, listeners: &Arc<Mutex<ListenerMap>>) {
        let mut dead: Vec<SubscriptionId> = Vec::new();
        let mut delivered = 0usize;

        {
            let listeners = listeners.lock();
            for (id, listener) in listeners.iter() {
                if listener.session_id != event.session_id || !event.matches(&listener.pattern) {
                    continue;
                }
                if listener.tx.send(event.clone()).is_err() {
                    dead.push(*id);
                } else {
                    delivered += 1;
                }
            }
        }

        if !dead.is_empty() {
            let mut listeners = listeners.lock();
            for id in dead {
                listeners.remove(&id);
            }
        }

        if delivered == 0 {
            trace!(method = %event.method, "Event with no listeners dropped");
        }
    }

    /// Fails all outstanding calls with [`Error::ChannelClosed`].
    fn fail_pending_calls(correlation: &Arc<Mutex<CorrelationMap>>) {
        let pending: Vec<(CallId, PendingCall)> = correlation.lock().drain().collect();
        let count = pending.len();

        for (_, pending) in pending {
            let _ = pending.tx.send(Err(Error::ChannelClosed));
        }

        if count > 0 {
            debug!(count, "Failed pending calls on shutdown");
        }
    }
}

// ============================================================================
// PendingResponse
// ============================================================================

/// Handle for a call whose response has not been awaited yet.
///
/// Produced by [`Channel::begin_call`]; consumed by [`wait`].
///
/// [`wait`]: PendingResponse::wait
pub struct PendingResponse {
    /// Correlation ID of the issued call.
    call_id: CallId,
    /// Method issued (for error context).
    method: String,
    /// Slot the event loop fulfills.
    rx: oneshot::Receiver<Result<Value>>,
    /// Bound on the wait.
    timeout: Duration,
    /// Correlation map, for idempotent cleanup on timeout.
    correlation: Arc<Mutex<CorrelationMap>>,
}

impl PendingResponse {
    /// Returns the correlation ID of the issued call.
    #[inline]
    #[must_use]
    pub fn call_id(&self) -> CallId {
        self.call_id
    }

    /// Returns the method of the issued call.
    #[inline]
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Waits for the response within the channel's timeout bound.
    ///
    /// On timeout the pending entry is removed so a late response is
    /// discarded silently rather than leaking.
    ///
    /// # Errors
    ///
    /// - [`Error::CallTimeout`] if no response arrives in time
    /// - [`Error::ChannelClosed`] if the event loop terminated
    /// - [`Error::Cdp`] if the browser returned an error payload
    /// - [`Error::TargetCrashed`] if the session crashed mid-call
    pub async fn wait(self) -> Result<Value> {
        match timeout(self.timeout, self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ChannelClosed),
            Err(_) => {
                // Removal is idempotent with respect to late delivery.
                self.correlation.lock().remove(&self.call_id);
                Err(Error::call_timeout(
                    self.call_id,
                    self.method,
                    self.timeout.as_millis() as u64,
                ))
            }
        }
    }
}

// ============================================================================
// EventSubscription
// ============================================================================

/// Receiving side of an event listener registration.
///
/// Events matching the registration buffer here until received; dropping
/// the subscription stops delivery (the dead sender is pruned on the next
/// matching event).
pub struct EventSubscription {
    /// Registration ID, for [`Channel::unsubscribe`].
    id: SubscriptionId,
    /// Buffered matching events.
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventSubscription {
    /// Returns the registration ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Receives the next matching event, unbounded.
    ///
    /// Returns `None` if the channel closed or the listener was removed.
    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Waits for the next event satisfying a predicate, bounded.
    ///
    /// Events failing the predicate are consumed and skipped.
    ///
    /// # Errors
    ///
    /// - [`Error::EventTimeout`] if no satisfying event arrives in time
    /// - [`Error::ChannelClosed`] if delivery ended
    pub async fn wait_matching(
        &mut self,
        method: &str,
        predicate: impl Fn(&Event) -> bool,
        bound: Duration,
    ) -> Result<Event> {
        let wait = async {
            loop {
                match self.rx.recv().await {
                    Some(event) if predicate(&event) => return Ok(event),
                    Some(event) => {
                        trace!(method = %event.method, "Event skipped by predicate");
                    }
                    None => return Err(Error::ChannelClosed),
                }
            }
        };

        match timeout(bound, wait).await {
            Ok(result) => result,
            Err(_) => Err(Error::event_timeout(method, bound.as_millis() as u64)),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::fake::fake_transport;
    use serde_json::json;

    #[tokio::test]
    async fn test_call_receives_matching_response() {
        let (transport, mut peer) = fake_transport();
        let channel = Channel::new(transport);

        let pending = channel
            .begin_call(None, "Browser.getVersion", Value::Null)
            .expect("begin call");
        let call_id = pending.call_id();

        let sent = peer.expect_frame().await;
        assert_eq!(sent["method"], "Browser.getVersion");
        assert_eq!(sent["id"], call_id.value());

        peer.respond(call_id.value(), json!({"product": "Chrome/999"}));

        let result = pending.wait().await.expect("response");
        assert_eq!(result["product"], "Chrome/999");
    }

    #[tokio::test]
    async fn test_no_cross_talk_between_outstanding_calls() {
        let (transport, mut peer) = fake_transport();
        let channel = Channel::new(transport);

        let first = channel
            .begin_call(None, "Page.navigate", json!({"url": "https://a.test"}))
            .expect("begin first");
        let second = channel
            .begin_call(None, "Page.navigate", json!({"url": "https://b.test"}))
            .expect("begin second");

        let id_a = first.call_id().value();
        let id_b = second.call_id().value();
        peer.expect_frame().await;
        peer.expect_frame().await;

        // Respond in reverse arrival order.
        peer.respond(id_b, json!({"frameId": "FB"}));
        peer.respond(id_a, json!({"frameId": "FA"}));

        assert_eq!(first.wait().await.expect("first")["frameId"], "FA");
        assert_eq!(second.wait().await.expect("second")["frameId"], "FB");
    }

    #[tokio::test]
    async fn test_call_timeout_removes_pending_entry() {
        let (transport, mut peer) = fake_transport();
        let channel = Channel::with_call_timeout(transport, Duration::from_millis(50));

        let pending = channel
            .begin_call(None, "Page.navigate", json!({"url": "https://a.test"}))
            .expect("begin call");
        let call_id = pending.call_id().value();
        peer.expect_frame().await;

        let err = pending.wait().await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(channel.pending_count(), 0);

        // A late response must be discarded silently, not crash the loop.
        peer.respond(call_id, json!({"frameId": "LATE"}));
        tokio::task::yield_now().await;

        let follow_up = channel
            .begin_call(None, "Browser.getVersion", Value::Null)
            .expect("begin follow-up");
        let follow_up_id = follow_up.call_id().value();
        peer.expect_frame().await;
        peer.respond(follow_up_id, json!({"product": "ok"}));
        assert_eq!(follow_up.wait().await.expect("follow-up")["product"], "ok");
    }

    #[tokio::test]
    async fn test_peer_error_payload_surfaces_verbatim() {
        let (transport, mut peer) = fake_transport();
        let channel = Channel::new(transport);

        let pending = channel
            .begin_call(None, "Page.navigate", json!({"url": "bogus"}))
            .expect("begin call");
        let call_id = pending.call_id().value();
        peer.expect_frame().await;

        peer.respond_error(call_id, -32000, "Cannot navigate to invalid URL");

        let err = pending.wait().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "CDP error -32000: Cannot navigate to invalid URL"
        );
    }

    #[tokio::test]
    async fn test_notify_registers_no_pending_call() {
        let (transport, mut peer) = fake_transport();
        let channel = Channel::new(transport);

        channel
            .notify(None, "Target.setDiscoverTargets", json!({"discover": true}))
            .expect("notify");

        let sent = peer.expect_frame().await;
        assert_eq!(sent["method"], "Target.setDiscoverTargets");
        assert_eq!(channel.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_event_routed_to_matching_session_listener() {
        let (transport, peer) = fake_transport();
        let channel = Channel::new(transport);

        let mut ours = channel.subscribe(Some(SessionId::new("S1")), "Page.frameStoppedLoading");
        let mut other = channel.subscribe(Some(SessionId::new("S2")), "Page.frameStoppedLoading");

        peer.emit_event("Page.frameStoppedLoading", json!({"frameId": "F1"}), Some("S1"));

        let event = ours.next().await.expect("event");
        assert_eq!(event.get_string("frameId"), "F1");

        // The S2 listener saw nothing.
        let outcome = timeout(Duration::from_millis(50), other.next()).await;
        assert!(outcome.is_err());
    }

    #[tokio::test]
    async fn test_wildcard_pattern_listener() {
        let (transport, peer) = fake_transport();
        let channel = Channel::new(transport);

        let mut sub = channel.subscribe(Some(SessionId::new("S1")), "Inspector.*");
        peer.emit_event("Inspector.targetCrashed", Value::Null, Some("S1"));

        let event = sub.next().await.expect("event");
        assert_eq!(event.method, "Inspector.targetCrashed");
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let (transport, peer) = fake_transport();
        let channel = Channel::new(transport);

        let mut sub = channel.subscribe(Some(SessionId::new("S1")), "Page.loadEventFired");
        channel.unsubscribe(sub.id());

        peer.emit_event("Page.loadEventFired", Value::Null, Some("S1"));
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn test_fail_session_abandons_only_that_sessions_calls() {
        let (transport, mut peer) = fake_transport();
        let channel = Channel::new(transport);

        let crashed = channel
            .begin_call(Some(SessionId::new("S1")), "Page.printToPDF", Value::Null)
            .expect("begin crashed");
        let healthy = channel
            .begin_call(Some(SessionId::new("S2")), "Page.printToPDF", Value::Null)
            .expect("begin healthy");
        peer.expect_frame().await;
        let healthy_id = healthy.call_id().value();
        peer.expect_frame().await;

        let session = SessionId::new("S1");
        let failed = channel.fail_session(&session, || Error::target_crashed(session.clone()));
        assert_eq!(failed, 1);

        let err = crashed.wait().await.unwrap_err();
        assert!(err.is_crash());

        peer.respond(healthy_id, json!({"data": "JVBERi0="}));
        assert_eq!(healthy.wait().await.expect("healthy")["data"], "JVBERi0=");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(16))]

            /// Each caller gets exactly its own response, whatever the
            /// arrival order among concurrently outstanding calls.
            #[test]
            fn prop_no_cross_talk_under_randomized_response_order(
                order in Just((0..5usize).collect::<Vec<_>>()).prop_shuffle(),
            ) {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                    .unwrap();

                rt.block_on(async move {
                    let (transport, mut peer) = fake_transport();
                    let channel = Channel::new(transport);

                    let mut pendings = Vec::new();
                    for tag in 0..5usize {
                        let pending = channel
                            .begin_call(None, "Echo.tag", json!({"tag": tag}))
                            .unwrap();
                        pendings.push(pending);
                    }

                    let mut frames = Vec::new();
                    for _ in 0..5 {
                        frames.push(peer.expect_frame().await);
                    }

                    for &index in &order {
                        let frame = &frames[index];
                        let id = frame["id"].as_u64().unwrap();
                        peer.respond(id, json!({"tag": frame["params"]["tag"].clone()}));
                    }

                    for (tag, pending) in pendings.into_iter().enumerate() {
                        let result = pending.wait().await.unwrap();
                        assert_eq!(result["tag"], json!(tag));
                    }
                });
            }
        }
    }

    #[tokio::test]
    async fn test_transport_close_fails_pending_and_marks_closed() {
        let (transport, mut peer) = fake_transport();
        let channel = Channel::new(transport);

        let pending = channel
            .begin_call(None, "Browser.getVersion", Value::Null)
            .expect("begin call");
        peer.expect_frame().await;

        peer.close();

        let err = pending.wait().await.unwrap_err();
        assert!(err.is_transport_error());

        // Closed flag is observed by subsequent calls.
        tokio::task::yield_now().await;
        let err = channel
            .begin_call(None, "Browser.getVersion", Value::Null)
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(err, Error::ChannelClosed));
    }
}
