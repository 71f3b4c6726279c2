//! Generic versioned wrapper type
//!
//! Reads return `Versioned<T>` (value + version). Writes return the stamped
//! `Versioned<Record>` so callers can use the version in later checks.

use super::Version;
use crate::value::Record;
use serde::{Deserialize, Serialize};

/// A value with the version of the commit that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    /// The actual value
    pub value: T,

    /// Version identifier
    pub version: Version,
}

impl<T> Versioned<T> {
    /// Create a new versioned value
    pub fn new(value: T, version: Version) -> Self {
        Versioned { value, version }
    }

    /// Map the inner value to a new type
    pub fn map<U, F>(self, f: F) -> Versioned<U>
    where
        F: FnOnce(T) -> U,
    {
        Versioned {
            value: f(self.value),
            version: self.version,
        }
    }

    /// Consume and return the inner value
    #[inline]
    pub fn into_value(self) -> T {
        self.value
    }
}

impl<T> AsRef<T> for Versioned<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

/// A logical record paired with its version token
pub type VersionedRecord = Versioned<Record>;
