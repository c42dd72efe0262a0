//! Accumulating execution state.
//!
//! One [`ExecutionState`] exists per invocation. It starts from the
//! caller's initial params and accumulates fields extracted from
//! responses and events as steps execute. Discarded when the invocation
//! ends; never shared across invocations.

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Map, Value};

use crate::error::{Error, Result};

use super::step::Extract;

// ============================================================================
// ExecutionState
// ============================================================================

/// Key/value state threaded through one step-list invocation.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ExecutionState {
    values: Map<String, Value>,
}

impl ExecutionState {
    /// Creates state seeded with the invocation's initial params.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the params are neither an object
    /// nor null.
    pub fn new(initial: Value) -> Result<Self> {
        match initial {
            Value::Object(values) => Ok(Self { values }),
            Value::Null => Ok(Self::default()),
            other => Err(Error::protocol(format!(
                "initial params must be an object, got {other}"
            ))),
        }
    }

    /// Stores a value under a key, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Reads a value by dotted path.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };

        let root = self.values.get(head)?;
        match rest {
            Some(rest) => lookup_path(root, rest),
            None => Some(root),
        }
    }

    /// Extracts fields from a payload into the state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] naming the first missing path.
    pub fn merge_extracts(&mut self, payload: &Value, extracts: &[Extract]) -> Result<()> {
        for extract in extracts {
            let value = lookup_path(payload, &extract.from).ok_or_else(|| {
                Error::protocol(format!("payload missing expected key `{}`", extract.from))
            })?;
            self.values.insert(extract.to.clone(), value.clone());
        }
        Ok(())
    }

    /// Returns the number of stored keys.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if no keys are stored.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ============================================================================
// Path Lookup
// ============================================================================

/// Walks a dotted path through nested objects.
fn lookup_path<'value>(root: &'value Value, path: &str) -> Option<&'value Value> {
    path.split('.').try_fold(root, |value, key| value.get(key))
}

// ============================================================================
// Tests
// ============================================================================
