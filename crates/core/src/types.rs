//! Store-level data types
//!
//! - `KvEntry`: a present key with its value and version
//! - `KvEntryMaybe`: the result of a point read or a watch snapshot, where
//!   the key may be absent
//! - `CommitOutcome`: the result of committing an atomic operation
//! - `OperationKind`: the logical operation a batch belongs to

use crate::contract::{Version, Versioned};
use crate::key::PhysicalKey;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A key that exists in the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KvEntry {
    /// Physical key
    pub key: PhysicalKey,
    /// Stored value
    pub value: Value,
    /// Version of the commit that last wrote the key
    pub version: Version,
}

/// A key that may or may not exist in the store
///
/// `value` and `version` are either both present or both absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KvEntryMaybe {
    /// Physical key
    pub key: PhysicalKey,
    /// Stored value, `None` when the key does not exist
    pub value: Option<Value>,
    /// Version, `None` when the key does not exist
    pub version: Option<Version>,
}

impl KvEntryMaybe {
    /// An entry for a key that does not exist
    pub fn missing(key: PhysicalKey) -> Self {
        KvEntryMaybe {
            key,
            value: None,
            version: None,
        }
    }

    /// True when the key exists
    pub fn is_present(&self) -> bool {
        self.value.is_some() && self.version.is_some()
    }

    /// Convert into a present entry
    pub fn into_entry(self) -> Option<KvEntry> {
        match (self.value, self.version) {
            (Some(value), Some(version)) => Some(KvEntry {
                key: self.key,
                value,
                version,
            }),
            _ => None,
        }
    }

    /// Drop the key, keeping the versioned value if present
    pub fn into_versioned(self) -> Option<Versioned<Value>> {
        self.into_entry().map(|e| Versioned::new(e.value, e.version))
    }
}

impl From<KvEntry> for KvEntryMaybe {
    fn from(entry: KvEntry) -> Self {
        KvEntryMaybe {
            key: entry.key,
            value: Some(entry.value),
            version: Some(entry.version),
        }
    }
}

/// Result of committing an atomic operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// All checks passed, all mutations applied under `version`
    Committed {
        /// Version shared by every key written in the commit
        version: Version,
    },
    /// At least one check failed, nothing was applied
    Rejected,
}

impl CommitOutcome {
    /// True for `Committed`
    pub fn is_ok(&self) -> bool {
        matches!(self, CommitOutcome::Committed { .. })
    }

    /// The committed version, if any
    pub fn version(&self) -> Option<Version> {
        match self {
            CommitOutcome::Committed { version } => Some(*version),
            CommitOutcome::Rejected => None,
        }
    }
}

/// Logical operation carried out by a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Record creation
    Create,
    /// Record update
    Update,
    /// Record deletion
    Delete,
    /// Versioned read
    Read,
}

impl OperationKind {
    /// Lowercase operation name
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
            OperationKind::Read => "read",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
