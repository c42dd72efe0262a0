//! chrome-press - Headless Chromium document rendering.
//!
//! This library drives a headless Chromium process through the DevTools
//! protocol to render documents — navigation, print-to-PDF, screenshot
//! capture — on demand, from concurrent callers, with bounded resources
//! and graceful degradation when the browser misbehaves.
//!
//! # Architecture
//!
//! Three subsystems do the heavy lifting:
//!
//! - **Channel** ([`transport`]): one WebSocket connection to the browser,
//!   turned into a correlated request/response/event abstraction by a
//!   single read-loop task.
//! - **Session pool** ([`session`]): a fixed number of page targets with
//!   FIFO checkout/checkin, crash detection, and discard-and-replace
//!   recovery.
//! - **Protocol engine** ([`engine`]): a small interpreter over
//!   composable step lists, threading accumulated state through calls,
//!   response waits, and event waits.
//!
//! The concrete operations ([`ops`]) are declarative step lists layered
//! on top, and [`Browser`] ties everything together.
//!
//! # Quick Start
//!
//! ```no_run
//! use chrome_press::{Browser, ChromeOptions, PdfOptions, Source};
//!
//! #[tokio::main]
//! async fn main() -> chrome_press::Result<()> {
//!     let browser = Browser::launch(ChromeOptions::new()).await?;
//!
//!     let pdf = browser
//!         .print_to_pdf(Source::url("https://example.com"), PdfOptions::new())
//!         .await?;
//!     std::fs::write("example.pdf", pdf)?;
//!
//!     browser.close();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`browser`] | Browser root, process supervision, options |
//! | [`engine`] | Step lists and their interpreter |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`ops`] | Step lists for the built-in operations |
//! | [`protocol`] | Wire message types |
//! | [`session`] | Sessions and the session pool |
//! | [`transport`] | Transport trait, channel, WebSocket client |

// ============================================================================
// Modules
// ============================================================================

/// Browser root, process supervision, and options.
pub mod browser;

/// Step lists and the interpreter executing them.
pub mod engine;

/// Error types and result aliases.
pub mod error;

/// Type-safe identifiers for protocol entities.
pub mod identifiers;

/// Step lists for the built-in rendering operations.
pub mod ops;

/// DevTools protocol message types.
pub mod protocol;

/// Sessions and the session pool.
pub mod session;

/// Transport layer: WebSocket connection and correlated channel.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Browser types
pub use browser::{Browser, ChromeOptions, ImageFormat, PdfOptions, ScreenshotOptions, Source};

// Engine types
pub use engine::{ExecutionState, Extract, Step, StepList, execute};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{CallId, SessionId, SubscriptionId, TargetId};

// Session types
pub use session::{PoolOptions, Session, SessionPool, SessionStatus};

// Transport types
pub use transport::{Channel, EventSubscription, PendingResponse, WebSocketTransport};
