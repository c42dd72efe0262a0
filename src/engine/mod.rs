//! Protocol engine: interprets a step list against a checked-out session.
//!
//! The engine is a small interpreter over [`Step`] values. It flattens
//! `include` nodes, then walks the steps strictly in order, threading an
//! [`ExecutionState`] through them and producing a single output value.
//!
//! # Error Policy
//!
//! Any step failure — timeout, crash, peer error payload — aborts the
//! remaining steps and propagates a structured error; partial state is
//! discarded. The engine performs no retries; retry policy belongs to the
//! caller.
//!
//! # Determinism
//!
//! Step execution for one invocation is strictly sequential. Separate
//! invocations (on separate sessions) run fully in parallel.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::session::Session;
use crate::transport::{EventSubscription, PendingResponse};

// ============================================================================
// Submodules
// ============================================================================

/// Accumulating execution state.
pub mod state;

/// Step and step-list types.
pub mod step;

pub use state::ExecutionState;
pub use step::{EventPredicate, Extract, ParamBuilder, Step, StepList};

// ============================================================================
// execute
// ============================================================================

/// Executes a step list against a session.
///
/// Listeners for every `await_event` step are registered before the first
/// step runs, so an event that outraces its await step is buffered rather
/// than lost.
///
/// # Errors
///
/// Propagates the first failing step's error; see the module docs for the
/// abort policy.
pub async fn execute(list: &StepList, session: &Session, initial: Value) -> Result<Value> {
    let steps = list.flatten();
    debug!(
        session_id = %session.session_id(),
        steps = steps.len(),
        "Executing step list"
    );

    let mut event_waits: VecDeque<EventSubscription> = steps
        .iter()
        .filter_map(|step| match step {
            Step::AwaitEvent { method, .. } => Some(session.subscribe(method.as_str())),
            _ => None,
        })
        .collect();
    let registrations: Vec<_> = event_waits.iter().map(EventSubscription::id).collect();

    let result = run_steps(&steps, session, initial, &mut event_waits).await;

    for id in registrations {
        session.channel().unsubscribe(id);
    }

    if let Err(e) = &result {
        debug!(session_id = %session.session_id(), error = %e, "Step list aborted");
    }

    result
}

/// Walks the flattened steps in order.
async fn run_steps(
    steps: &[&Step],
    session: &Session,
    initial: Value,
    event_waits: &mut VecDeque<EventSubscription>,
) -> Result<Value> {
    let mut state = ExecutionState::new(initial)?;
    let mut pending: Option<PendingResponse> = None;
    let mut output: Option<Value> = None;
    let bound = session.channel().call_timeout();

    for step in steps {
        match step {
            Step::Call {
                method,
                params,
                expect_response,
            } => {
                let params = params(&state);
                if *expect_response {
                    if let Some(stale) = pending.take() {
                        warn!(
                            method = stale.method(),
                            "Unconsumed response discarded before next call"
                        );
                    }
                    trace!(method = method.as_str(), "Issuing call");
                    pending = Some(session.begin_call(method, params)?);
                } else {
                    trace!(method = method.as_str(), "Issuing notification");
                    session.notify(method, params)?;
                }
            }

            Step::AwaitResponse { extract } => {
                let awaited = pending
                    .take()
                    .ok_or_else(|| Error::protocol("await_response without a preceding call"))?;
                trace!(method = awaited.method(), "Awaiting response");
                let payload = awaited.wait().await?;
                state.merge_extracts(&payload, extract)?;
            }

            Step::AwaitEvent {
                method,
                predicate,
                extract,
            } => {
                let mut wait = event_waits
                    .pop_front()
                    .ok_or_else(|| Error::protocol("event wait registration missing"))?;
                trace!(method = method.as_str(), "Awaiting event");

                let event = match predicate {
                    Some(predicate) => {
                        wait.wait_matching(method, |event| predicate(event, &state), bound)
                            .await?
                    }
                    None => wait.wait_matching(method, |_| true, bound).await?,
                };
                state.merge_extracts(&event.params, extract)?;
            }

            Step::Include { .. } => {
                return Err(Error::protocol("include step survived flattening"));
            }

            Step::Output { path } => {
                output = state.get(path).cloned();
                if output.is_none() {
                    debug!(path = path.as_str(), "Output path absent, no explicit output");
                }
            }
        }
    }

    Ok(output.unwrap_or(Value::Null))
}

// ============================================================================
// Tests
// ============================================================================
