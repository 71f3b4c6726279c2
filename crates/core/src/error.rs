//! Error types for driftkv
//!
//! This module defines the error taxonomy shared by every layer.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! ## Taxonomy
//!
//! | Variant | Raised | Retryable |
//! |---------|--------|-----------|
//! | `SchemaConfiguration` | schema build, before any I/O | no |
//! | `Validation` | record parse, before any I/O | after fixing input |
//! | `BatchOperation` | transaction commit rejected | caller decides |
//! | `NotFound` | update/delete of a missing record | caller decides |
//! | `WatchStream` | change stream failed | resubscribe |
//!
//! The remaining variants cover malformed keys and queries, store failures
//! and configuration problems.

use crate::types::OperationKind;
use thiserror::Error;

/// Result type alias for driftkv operations
pub type Result<T> = std::result::Result<T, DriftError>;

/// Error types for driftkv
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DriftError {
    /// Schema role metadata is inconsistent (two primaries, index without primary)
    #[error("Schema configuration error: {0}")]
    SchemaConfiguration(String),

    /// A record failed schema validation
    #[error("Validation error{}: {message}", field.as_ref().map(|f| format!(" on field '{}'", f)).unwrap_or_default())]
    Validation {
        /// Offending field, when the failure is field-specific
        field: Option<String>,
        /// Human-readable reason
        message: String,
    },

    /// A transaction commit reported failure (check violated)
    ///
    /// The failing chunk was abandoned as a whole. Earlier chunks of the
    /// same call stay committed.
    #[error("Could not perform batched {operation} operation (chunk {chunk}, {committed_chunks} chunk(s) already committed)")]
    BatchOperation {
        /// Operation that was being executed
        operation: OperationKind,
        /// Zero-based index of the rejected chunk
        chunk: usize,
        /// Number of chunks of this call that committed before the failure
        committed_chunks: usize,
    },

    /// Update or delete targeted a record that does not exist
    #[error("Record not found in table '{table}'")]
    NotFound {
        /// Table that was queried
        table: String,
    },

    /// The underlying change stream failed
    #[error("Watch stream error: {0}")]
    WatchStream(String),

    /// A value cannot be used as a physical key part
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Query arguments are malformed
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Storage layer error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DriftError {
    /// Create a validation error for a specific field
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        DriftError::Validation {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    /// Create a not-found error for a table
    pub fn not_found(table: impl Into<String>) -> Self {
        DriftError::NotFound {
            table: table.into(),
        }
    }

    /// Stable reason code for wrappers and logs
    pub fn code(&self) -> &'static str {
        match self {
            DriftError::SchemaConfiguration(_) => "schema_configuration",
            DriftError::Validation { .. } => "validation",
            DriftError::BatchOperation { .. } => "batch_operation",
            DriftError::NotFound { .. } => "not_found",
            DriftError::WatchStream(_) => "watch_stream",
            DriftError::InvalidKey(_) => "invalid_key",
            DriftError::InvalidQuery(_) => "invalid_query",
            DriftError::Storage(_) => "storage",
            DriftError::Config(_) => "config",
        }
    }

    /// Distinct process exit status for CLI or service wrappers
    pub fn exit_code(&self) -> i32 {
        match self {
            DriftError::SchemaConfiguration(_) => 10,
            DriftError::Validation { .. } => 11,
            DriftError::BatchOperation { .. } => 12,
            DriftError::NotFound { .. } => 13,
            DriftError::WatchStream(_) => 14,
            DriftError::InvalidKey(_) => 15,
            DriftError::InvalidQuery(_) => 16,
            DriftError::Storage(_) => 17,
            DriftError::Config(_) => 18,
        }
    }

    /// Check if this is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, DriftError::NotFound { .. })
    }

    /// Check if this is a rejected batch commit
    pub fn is_batch_failure(&self) -> bool {
        matches!(self, DriftError::BatchOperation { .. })
    }
}

impl From<serde_json::Error> for DriftError {
    fn from(e: serde_json::Error) -> Self {
        DriftError::Validation {
            field: None,
            message: e.to_string(),
        }
    }
}
