//! DevTools protocol message types.
//!
//! Defines the wire format exchanged with the browser over the transport:
//! command calls going out, responses and events coming in.
//!
//! # Wire Format
//!
//! | Shape | Meaning |
//! |-------|---------|
//! | `{id, method, params, sessionId?}` | command call (local → browser) |
//! | `{id, result \| error, sessionId?}` | response (browser → local) |
//! | `{method, params, sessionId?}` | event (browser → local) |
//!
//! A message with an `id` is a response; a message with a `method` but no
//! `id` is an event. Commands targeting a page carry the `sessionId` of the
//! attached target; browser-level commands omit it.

// ============================================================================
// Submodules
// ============================================================================

/// Call, response, and event message structures.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use message::{Call, CdpError, Event, Message, Response};
