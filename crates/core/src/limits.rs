//! Operation and value limits
//!
//! `OPERATION_LIMIT` is the number of logical write intents grouped into one
//! atomic transaction. It is independent of the per-transaction operation cap
//! a store enforces on buffered checks and mutations.

use crate::error::{DriftError, Result};
use crate::value::Value;

/// Write intents per batch group
pub const OPERATION_LIMIT: usize = 10;

/// Checks plus mutations a store accepts in one atomic operation
pub const DEFAULT_MAX_ATOMIC_OPERATIONS: usize = 1000;

/// Size limits enforced by the engine and the reference store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Write intents per batch group (default: 10)
    pub operation_limit: usize,

    /// Checks plus mutations per atomic operation (default: 1000)
    pub max_atomic_operations: usize,

    /// Maximum nesting depth of a field value (default: 32)
    pub max_nesting_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            operation_limit: OPERATION_LIMIT,
            max_atomic_operations: DEFAULT_MAX_ATOMIC_OPERATIONS,
            max_nesting_depth: 32,
        }
    }
}

impl Limits {
    /// Reject values nested deeper than `max_nesting_depth`
    pub fn validate_value(&self, field: &str, value: &Value) -> Result<()> {
        self.validate_depth(field, value, 0)
    }

    fn validate_depth(&self, field: &str, value: &Value, depth: usize) -> Result<()> {
        if depth > self.max_nesting_depth {
            return Err(DriftError::validation(
                field,
                format!("nesting depth exceeds maximum {}", self.max_nesting_depth),
            ));
        }
        match value {
            Value::Array(items) => items
                .iter()
                .try_for_each(|v| self.validate_depth(field, v, depth + 1)),
            Value::Object(map) => map
                .values()
                .try_for_each(|v| self.validate_depth(field, v, depth + 1)),
            _ => Ok(()),
        }
    }
}
