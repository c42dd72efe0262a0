//! WebSocket transport to the browser's DevTools endpoint.
//!
//! Production [`Transport`] implementation: one text frame per protocol
//! message, connected as a client to the `ws://` URL the browser
//! advertises at startup.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace};

use crate::error::{Error, Result};

use super::{Transport, TransportRx, TransportTx};

// ============================================================================
// Types
// ============================================================================

/// The underlying stream type for a client connection.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// WebSocketTransport
// ============================================================================

/// WebSocket connection to a DevTools endpoint.
pub struct WebSocketTransport {
    stream: WsStream,
}

impl WebSocketTransport {
    /// Connects to a DevTools WebSocket URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the connection or the WebSocket
    /// handshake fails.
    pub async fn connect(url: &str) -> Result<Self> {
        debug!(url = %url, "Connecting to DevTools endpoint");

        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| Error::connection(format!("WebSocket connect failed: {e}")))?;

        debug!(url = %url, "DevTools connection established");

        Ok(Self { stream })
    }
}

impl Transport for WebSocketTransport {
    fn into_split(self: Box<Self>) -> (Box<dyn TransportTx>, Box<dyn TransportRx>) {
        let (sink, stream) = self.stream.split();
        (
            Box::new(WebSocketTx { sink }),
            Box::new(WebSocketRx { stream }),
        )
    }
}

// ============================================================================
// Halves
// ============================================================================

/// Sending half of the WebSocket transport.
struct WebSocketTx {
    sink: SplitSink<WsStream, WsMessage>,
}

#[async_trait]
impl TransportTx for WebSocketTx {
    async fn send(&mut self, text: String) -> Result<()> {
        self.sink.send(WsMessage::Text(text.into())).await?;
        Ok(())
    }
}

/// Receiving half of the WebSocket transport.
struct WebSocketRx {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl TransportRx for WebSocketRx {
    async fn receive(&mut self) -> Result<Option<String>> {
        loop {
            match self.stream.next().await {
                Some(Ok(WsMessage::Text(text))) => return Ok(Some(text.to_string())),

                Some(Ok(WsMessage::Close(_))) => {
                    debug!("WebSocket closed by remote");
                    return Ok(None);
                }

                // Binary, Ping, Pong: not part of the protocol, skipped.
                Some(Ok(other)) => {
                    trace!(kind = ?other, "Ignoring non-text frame");
                }

                Some(Err(e)) => return Err(e.into()),

                None => {
                    debug!("WebSocket stream ended");
                    return Ok(None);
                }
            }
        }
    }
}
