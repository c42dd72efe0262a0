//! In-memory transport for exercising the channel without a browser.
//!
//! [`fake_transport`] returns a [`Transport`] to hand to a [`Channel`] and
//! a [`FakePeer`] controller playing the browser's side: it observes the
//! frames the channel sends and injects responses and events.
//!
//! ```ignore
//! let (transport, mut peer) = fake_transport();
//! let channel = Channel::new(transport);
//!
//! let pending = channel.begin_call(None, "Page.navigate", params)?;
//! let frame = peer.expect_frame().await;
//! peer.respond(frame["id"].as_u64().unwrap(), json!({"frameId": "F1"}));
//! let result = pending.wait().await?;
//! ```
//!
//! [`Channel`]: super::Channel

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::error::{Error, Result};

use super::{Transport, TransportRx, TransportTx};

// ============================================================================
// Constants
// ============================================================================

/// Guard against tests hanging on a frame that never arrives.
const EXPECT_TIMEOUT: Duration = Duration::from_secs(1);

// ============================================================================
// Test Logging
// ============================================================================

/// Installs a tracing subscriber honoring `RUST_LOG`, once per process.
///
/// Call from a test to see channel/pool diagnostics while debugging.
pub(crate) fn init_test_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// fake_transport
// ============================================================================

/// Creates a paired in-memory transport and peer controller.
pub(crate) fn fake_transport() -> (Box<dyn Transport>, FakePeer) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

    let transport = FakeTransport {
        outbound_tx,
        inbound_rx,
    };

    let peer = FakePeer {
        sent_rx: outbound_rx,
        inject_tx: Some(inbound_tx),
    };

    (Box::new(transport), peer)
}

// ============================================================================
// FakeTransport
// ============================================================================

/// Transport half handed to the channel under test.
struct FakeTransport {
    /// Frames the channel sends, observable via the peer.
    outbound_tx: mpsc::UnboundedSender<String>,
    /// Frames the peer injects.
    inbound_rx: mpsc::UnboundedReceiver<String>,
}

impl Transport for FakeTransport {
    fn into_split(self: Box<Self>) -> (Box<dyn TransportTx>, Box<dyn TransportRx>) {
        (
            Box::new(FakeTx {
                tx: self.outbound_tx,
            }),
            Box::new(FakeRx {
                rx: self.inbound_rx,
            }),
        )
    }
}

struct FakeTx {
    tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl TransportTx for FakeTx {
    async fn send(&mut self, text: String) -> Result<()> {
        self.tx
            .send(text)
            .map_err(|_| Error::connection("fake peer dropped"))
    }
}

struct FakeRx {
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl TransportRx for FakeRx {
    async fn receive(&mut self) -> Result<Option<String>> {
        Ok(self.rx.recv().await)
    }
}

// ============================================================================
// FakePeer
// ============================================================================

/// Controller playing the browser's side of the connection.
pub(crate) struct FakePeer {
    /// Frames the channel sent, in order.
    sent_rx: mpsc::UnboundedReceiver<String>,
    /// Injection channel; dropped on [`close`](FakePeer::close).
    inject_tx: Option<mpsc::UnboundedSender<String>>,
}

impl FakePeer {
    /// Receives the next frame the channel sent, parsed as JSON.
    ///
    /// # Panics
    ///
    /// Panics if no frame arrives within one second or the transport was
    /// dropped; both indicate a broken test.
    pub(crate) async fn expect_frame(&mut self) -> Value {
        let text = timeout(EXPECT_TIMEOUT, self.sent_rx.recv())
            .await
            .expect("no frame sent within timeout")
            .expect("transport dropped");
        serde_json::from_str(&text).expect("sent frame is not valid JSON")
    }

    /// Injects a raw message as if the browser sent it.
    pub(crate) fn inject(&self, message: Value) {
        if let Some(tx) = self.inject_tx.as_ref() {
            let _ = tx.send(message.to_string());
        }
    }

    /// Injects a success response for a call ID.
    pub(crate) fn respond(&self, id: u64, result: Value) {
        self.inject(json!({"id": id, "result": result}));
    }

    /// Injects an error response for a call ID.
    pub(crate) fn respond_error(&self, id: u64, code: i64, message: &str) {
        self.inject(json!({"id": id, "error": {"code": code, "message": message}}));
    }

    /// Injects an event, optionally scoped to a session.
    pub(crate) fn emit_event(&self, method: &str, params: Value, session_id: Option<&str>) {
        let mut message = json!({"method": method, "params": params});
        if let Some(session_id) = session_id {
            message["sessionId"] = json!(session_id);
        }
        self.inject(message);
    }

    /// Closes the browser side of the connection.
    ///
    /// The channel's read loop observes end-of-stream and terminates.
    pub(crate) fn close(&mut self) {
        self.inject_tx = None;
    }

    /// Upgrades the peer into a self-serving stub browser.
    pub(crate) fn into_stub(self) -> StubBrowser {
        StubBrowser::spawn(self)
    }
}

// ============================================================================
// StubBrowser
// ============================================================================

/// Base64 of a minimal `%PDF-1.4` header, the shape `Page.printToPDF`
/// returns.
pub(crate) const STUB_PDF_BASE64: &str = "JVBERi0xLjQK";

/// Base64 of the PNG magic bytes, the shape `Page.captureScreenshot`
/// returns.
pub(crate) const STUB_PNG_BASE64: &str = "iVBORw0KGgo=";

/// A scripted browser that answers the standard rendering commands.
///
/// Replies to target creation/attachment and page commands with canned
/// payloads, and emits `Page.frameStoppedLoading` after each navigation.
/// Individual methods can be silenced to simulate a hung or crashed
/// target; silenced calls are recorded for later manual replies.
pub(crate) struct StubBrowser {
    /// Injection channel into the transport.
    inject_tx: mpsc::UnboundedSender<String>,
    /// Methods that get no automatic reply.
    silent: Arc<parking_lot::Mutex<std::collections::HashSet<String>>>,
    /// Frames that matched a silenced method, in arrival order.
    unanswered: Arc<parking_lot::Mutex<Vec<Value>>>,
}

impl StubBrowser {
    /// Spawns the serving loop over a peer.
    fn spawn(peer: FakePeer) -> Self {
        let inject_tx = peer
            .inject_tx
            .clone()
            .expect("cannot stub a closed peer");
        let silent = Arc::new(parking_lot::Mutex::new(
            std::collections::HashSet::<String>::new(),
        ));
        let unanswered = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let mut sent_rx = peer.sent_rx;
        let loop_inject = inject_tx.clone();
        let loop_silent = Arc::clone(&silent);
        let loop_unanswered = Arc::clone(&unanswered);

        tokio::spawn(async move {
            let mut target_counter = 0u64;

            while let Some(text) = sent_rx.recv().await {
                let frame: Value = match serde_json::from_str(&text) {
                    Ok(frame) => frame,
                    Err(_) => continue,
                };

                let method = frame["method"].as_str().unwrap_or_default().to_string();
                if loop_silent.lock().contains(&method) {
                    loop_unanswered.lock().push(frame);
                    continue;
                }

                let Some(id) = frame["id"].as_u64() else {
                    continue;
                };
                let session_id = frame["sessionId"].as_str().map(str::to_string);

                let (result, follow_up_event) = match method.as_str() {
                    "Target.createTarget" => {
                        target_counter += 1;
                        (json!({"targetId": format!("target-{target_counter}")}), None)
                    }
                    "Target.attachToTarget" => {
                        let target = frame["params"]["targetId"].as_str().unwrap_or("unknown");
                        (json!({"sessionId": format!("session-{target}")}), None)
                    }
                    "Page.navigate" => (
                        json!({"frameId": "frame-1"}),
                        Some(("Page.frameStoppedLoading", json!({"frameId": "frame-1"}))),
                    ),
                    "Page.printToPDF" => (json!({"data": STUB_PDF_BASE64}), None),
                    "Page.captureScreenshot" => (json!({"data": STUB_PNG_BASE64}), None),
                    _ => (json!({}), None),
                };

                let mut response = json!({"id": id, "result": result});
                if let Some(session_id) = session_id.as_deref() {
                    response["sessionId"] = json!(session_id);
                }
                let _ = loop_inject.send(response.to_string());

                if let Some((event_method, event_params)) = follow_up_event {
                    let mut event = json!({"method": event_method, "params": event_params});
                    if let Some(session_id) = session_id.as_deref() {
                        event["sessionId"] = json!(session_id);
                    }
                    let _ = loop_inject.send(event.to_string());
                }
            }
        });

        Self {
            inject_tx,
            silent,
            unanswered,
        }
    }

    /// Stops auto-replying to a method; matching frames are recorded.
    pub(crate) fn silence(&self, method: &str) {
        self.silent.lock().insert(method.to_string());
    }

    /// Returns the frames recorded for silenced methods so far.
    pub(crate) fn unanswered_calls(&self) -> Vec<Value> {
        self.unanswered.lock().clone()
    }

    /// Injects a raw message as if the browser sent it.
    pub(crate) fn inject(&self, message: Value) {
        let _ = self.inject_tx.send(message.to_string());
    }

    /// Injects a success response for a call ID.
    pub(crate) fn respond(&self, id: u64, result: Value) {
        self.inject(json!({"id": id, "result": result}));
    }

    /// Injects an event, optionally scoped to a session.
    pub(crate) fn emit_event(&self, method: &str, params: Value, session_id: Option<&str>) {
        let mut message = json!({"method": method, "params": params});
        if let Some(session_id) = session_id {
            message["sessionId"] = json!(session_id);
        }
        self.inject(message);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_cross_the_pair() {
        let (transport, mut peer) = fake_transport();
        let (mut tx, mut rx) = transport.into_split();

        tx.send(r#"{"id":1,"method":"Browser.getVersion"}"#.to_string())
            .await
            .expect("send");
        let frame = peer.expect_frame().await;
        assert_eq!(frame["method"], "Browser.getVersion");

        peer.respond(1, json!({"product": "Chrome/999"}));
        let inbound = rx.receive().await.expect("receive").expect("open");
        assert!(inbound.contains("Chrome/999"));

        peer.close();
        assert!(rx.receive().await.expect("receive").is_none());
    }
}
