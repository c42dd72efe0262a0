//! Transport layer: the byte-stream connection to the browser and the
//! correlated command channel built on top of it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   begin_call / notify    ┌──────────────┐
//! │   Callers    │─────────────────────────►│   Channel    │
//! │ (many tasks) │◄─────────────────────────│  event loop  │
//! └──────────────┘   oneshot per call       └──────┬───────┘
//!                                                  │ one frame per message
//!                                           ┌──────┴───────┐
//!                                           │  Transport   │
//!                                           │ (WebSocket)  │
//!                                           └──────────────┘
//! ```
//!
//! The [`Transport`] is exclusively owned by one [`Channel`]. The channel
//! spawns a single event-loop task which is the only reader; callers never
//! touch the transport directly.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `channel` | Correlation, event dispatch, and the event loop |
//! | `websocket` | WebSocket transport to the DevTools endpoint |

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;

use crate::error::Result;

// ============================================================================
// Submodules
// ============================================================================

/// Correlated command channel and event loop.
pub mod channel;

/// WebSocket transport to the browser's DevTools endpoint.
pub mod websocket;

#[cfg(test)]
pub(crate) mod fake;

// ============================================================================
// Transport Traits
// ============================================================================

/// Sending half of a transport.
#[async_trait]
pub trait TransportTx: Send + 'static {
    /// Sends one message frame.
    async fn send(&mut self, text: String) -> Result<()>;
}

/// Receiving half of a transport.
#[async_trait]
pub trait TransportRx: Send + 'static {
    /// Receives the next message frame.
    ///
    /// Returns `Ok(None)` when the peer has closed the connection.
    async fn receive(&mut self) -> Result<Option<String>>;
}

/// A duplex message-framed connection to the browser process.
///
/// One message per `send`/`receive` call; framing is the implementation's
/// concern. Split into halves so the event loop can read and write
/// concurrently.
pub trait Transport: Send + 'static {
    /// Splits the transport into its sending and receiving halves.
    fn into_split(self: Box<Self>) -> (Box<dyn TransportTx>, Box<dyn TransportRx>);
}

// ============================================================================
// Re-exports
// ============================================================================

pub use channel::{Channel, EventSubscription, PendingResponse};
pub use websocket::WebSocketTransport;
