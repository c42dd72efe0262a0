//! Step and step-list types.
//!
//! A [`StepList`] is an immutable, reusable template describing a
//! multi-step remote operation. It carries no per-invocation data; the
//! same list is executed concurrently by many invocations, each with its
//! own [`ExecutionState`].
//!
//! [`ExecutionState`]: super::state::ExecutionState

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::engine::state::ExecutionState;
use crate::protocol::Event;

// ============================================================================
// Types
// ============================================================================

/// Builds a command's params from the accumulated state.
pub type ParamBuilder = Arc<dyn Fn(&ExecutionState) -> Value + Send + Sync>;

/// Decides whether an event satisfies an `await_event` step.
pub type EventPredicate = Arc<dyn Fn(&Event, &ExecutionState) -> bool + Send + Sync>;

// ============================================================================
// Extract
// ============================================================================

/// One field extraction: a dotted path into a payload, stored under a key
/// in the execution state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extract {
    /// Dotted path into the response or event payload.
    pub from: String,
    /// Key the value is stored under in the execution state.
    pub to: String,
}

impl Extract {
    /// Creates an extraction from a payload path to a state key.
    #[inline]
    #[must_use]
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Creates an extraction that keeps the payload key name.
    #[inline]
    #[must_use]
    pub fn key(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            from: name.clone(),
            to: name,
        }
    }
}

// ============================================================================
// Step
// ============================================================================

/// One node of a step list.
///
/// Steps execute strictly in order for a single invocation; `Include`
/// nodes are flattened before execution and never introduce concurrency.
pub enum Step {
    /// Issue a command. With `expect_response`, the response is consumed
    /// by a following [`Step::AwaitResponse`]; otherwise the command is
    /// fire-and-forget.
    Call {
        /// Command method.
        method: String,
        /// Params builder over the accumulated state.
        params: ParamBuilder,
        /// Whether a response will be awaited.
        expect_response: bool,
    },

    /// Block for the response of the immediately preceding call and merge
    /// extracted fields into the state.
    AwaitResponse {
        /// Fields to extract from the response payload.
        extract: Vec<Extract>,
    },

    /// Block for a future event matching a name and optional predicate,
    /// merging extracted fields into the state.
    AwaitEvent {
        /// Event method to wait for.
        method: String,
        /// Optional field predicate over event and state.
        predicate: Option<EventPredicate>,
        /// Fields to extract from the event payload.
        extract: Vec<Extract>,
    },

    /// Inline another step list at this point.
    Include {
        /// The nested list.
        list: StepList,
    },

    /// Designate a state path as the invocation's return value.
    Output {
        /// Dotted path into the accumulated state.
        path: String,
    },
}

impl Step {
    /// Creates a call step whose response will be awaited.
    #[must_use]
    pub fn call(
        method: impl Into<String>,
        params: impl Fn(&ExecutionState) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self::Call {
            method: method.into(),
            params: Arc::new(params),
            expect_response: true,
        }
    }

    /// Creates a fire-and-forget call step.
    #[must_use]
    pub fn notify(
        method: impl Into<String>,
        params: impl Fn(&ExecutionState) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self::Call {
            method: method.into(),
            params: Arc::new(params),
            expect_response: false,
        }
    }

    /// Creates an await-response step.
    #[must_use]
    pub fn await_response(extract: Vec<Extract>) -> Self {
        Self::AwaitResponse { extract }
    }

    /// Creates an await-event step matching by method name only.
    #[must_use]
    pub fn await_event(method: impl Into<String>, extract: Vec<Extract>) -> Self {
        Self::AwaitEvent {
            method: method.into(),
            predicate: None,
            extract,
        }
    }

    /// Creates an await-event step with a field predicate.
    #[must_use]
    pub fn await_event_matching(
        method: impl Into<String>,
        predicate: impl Fn(&Event, &ExecutionState) -> bool + Send + Sync + 'static,
        extract: Vec<Extract>,
    ) -> Self {
        Self::AwaitEvent {
            method: method.into(),
            predicate: Some(Arc::new(predicate)),
            extract,
        }
    }

    /// Creates an include step inlining another list.
    #[must_use]
    pub fn include(list: StepList) -> Self {
        Self::Include { list }
    }

    /// Creates an output step.
    #[must_use]
    pub fn output(path: impl Into<String>) -> Self {
        Self::Output { path: path.into() }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call {
                method,
                expect_response,
                ..
            } => f
                .debug_struct("Call")
                .field("method", method)
                .field("expect_response", expect_response)
                .finish_non_exhaustive(),
            Self::AwaitResponse { extract } => f
                .debug_struct("AwaitResponse")
                .field("extract", extract)
                .finish(),
            Self::AwaitEvent {
                method, extract, ..
            } => f
                .debug_struct("AwaitEvent")
                .field("method", method)
                .field("extract", extract)
                .finish_non_exhaustive(),
            Self::Include { list } => f.debug_struct("Include").field("list", list).finish(),
            Self::Output { path } => f.debug_struct("Output").field("path", path).finish(),
        }
    }
}

// ============================================================================
// StepList
// ============================================================================

/// An ordered, immutable sequence of steps.
///
/// Cheap to clone; the steps are shared. Built once, reused across many
/// executions.
#[derive(Clone)]
pub struct StepList {
    steps: Arc<[Step]>,
}

impl StepList {
    /// Creates a step list.
    #[must_use]
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: steps.into(),
        }
    }

    /// Returns the steps, includes unresolved.
    #[inline]
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Returns the number of top-level steps.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns `true` if the list has no steps.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Resolves `Include` nodes into a flat execution order.
    ///
    /// Depth is finite because lists are built bottom-up from owned
    /// values and cannot be cyclic.
    #[must_use]
    pub fn flatten(&self) -> Vec<&Step> {
        let mut flat = Vec::with_capacity(self.steps.len());
        Self::flatten_into(&self.steps, &mut flat);
        flat
    }

    fn flatten_into<'list>(steps: &'list [Step], flat: &mut Vec<&'list Step>) {
        for step in steps {
            match step {
                Step::Include { list } => Self::flatten_into(&list.steps, flat),
                other => flat.push(other),
            }
        }
    }
}

impl fmt::Debug for StepList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.steps.iter()).finish()
    }
}

impl From<Vec<Step>> for StepList {
    fn from(steps: Vec<Step>) -> Self {
        Self::new(steps)
    }
}

// ============================================================================
// Tests
// ============================================================================
