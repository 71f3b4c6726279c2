//! Physical keys
//!
//! A physical key is the literal ordered tuple stored in the underlying KV
//! store, e.g. `["user", "1"]` or `["user_by_index_age", 30, "1"]`.
//!
//! ## Ordering
//!
//! Key parts order first by type, then by value:
//! `Bytes < String < Int < Float < Bool`. Floats use IEEE-754 total order so
//! that every key has a stable position. Keys compare part by part, and a key
//! that is a strict prefix of another sorts first.
//!
//! ## Prefixes
//!
//! Prefix matching is tuple-part-wise: `["user"]` is a prefix of
//! `["user", "1"]` but not of `["user_by_unique_email", "a@x.com"]`.

use crate::error::{DriftError, Result};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// One element of a physical key tuple
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum KeyPart {
    /// Raw bytes
    Bytes(Vec<u8>),
    /// UTF-8 string
    String(String),
    /// Signed integer (timestamps are stored as microseconds)
    Int(i64),
    /// Floating point number
    Float(f64),
    /// Boolean
    Bool(bool),
}

impl KeyPart {
    fn rank(&self) -> u8 {
        match self {
            KeyPart::Bytes(_) => 0,
            KeyPart::String(_) => 1,
            KeyPart::Int(_) => 2,
            KeyPart::Float(_) => 3,
            KeyPart::Bool(_) => 4,
        }
    }

    /// Convert back into a record value
    pub fn to_value(&self) -> Value {
        match self {
            KeyPart::Bytes(b) => Value::Bytes(b.clone()),
            KeyPart::String(s) => Value::String(s.clone()),
            KeyPart::Int(i) => Value::Int(*i),
            KeyPart::Float(f) => Value::Float(*f),
            KeyPart::Bool(b) => Value::Bool(*b),
        }
    }
}

impl Ord for KeyPart {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyPart::Bytes(a), KeyPart::Bytes(b)) => a.cmp(b),
            (KeyPart::String(a), KeyPart::String(b)) => a.cmp(b),
            (KeyPart::Int(a), KeyPart::Int(b)) => a.cmp(b),
            (KeyPart::Float(a), KeyPart::Float(b)) => a.total_cmp(b),
            (KeyPart::Bool(a), KeyPart::Bool(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for KeyPart {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for KeyPart {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyPart {}

impl Hash for KeyPart {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            KeyPart::Bytes(b) => b.hash(state),
            KeyPart::String(s) => s.hash(state),
            KeyPart::Int(i) => i.hash(state),
            KeyPart::Float(f) => f.to_bits().hash(state),
            KeyPart::Bool(b) => b.hash(state),
        }
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Bytes(b) => write!(f, "{:?}", b),
            KeyPart::String(s) => write!(f, "{:?}", s),
            KeyPart::Int(i) => write!(f, "{}n", i),
            KeyPart::Float(x) => write!(f, "{}", x),
            KeyPart::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for KeyPart {
    fn from(s: &str) -> Self {
        KeyPart::String(s.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(s: String) -> Self {
        KeyPart::String(s)
    }
}

impl From<i64> for KeyPart {
    fn from(i: i64) -> Self {
        KeyPart::Int(i)
    }
}

impl TryFrom<&Value> for KeyPart {
    type Error = DriftError;

    /// Scalars map directly. Timestamps become microsecond integers.
    /// Null, arrays and objects cannot be key parts.
    fn try_from(value: &Value) -> Result<Self> {
        match value {
            Value::Bytes(b) => Ok(KeyPart::Bytes(b.clone())),
            Value::String(s) => Ok(KeyPart::String(s.clone())),
            Value::Int(i) => Ok(KeyPart::Int(*i)),
            Value::Float(f) => Ok(KeyPart::Float(*f)),
            Value::Bool(b) => Ok(KeyPart::Bool(*b)),
            Value::Timestamp(t) => i64::try_from(t.as_micros())
                .map(KeyPart::Int)
                .map_err(|_| DriftError::InvalidKey("timestamp out of range".into())),
            other => Err(DriftError::InvalidKey(format!(
                "{} cannot be used as a key part",
                other.type_name()
            ))),
        }
    }
}

/// An ordered tuple of key parts
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PhysicalKey(Vec<KeyPart>);

impl PhysicalKey {
    /// Create a key from its parts
    pub fn new(parts: Vec<KeyPart>) -> Self {
        PhysicalKey(parts)
    }

    /// Borrow the parts
    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    /// Number of parts
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the key has no parts
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Tuple-part-wise prefix test
    pub fn starts_with(&self, prefix: &PhysicalKey) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Return a new key with `part` appended
    pub fn child(&self, part: impl Into<KeyPart>) -> PhysicalKey {
        let mut parts = self.0.clone();
        parts.push(part.into());
        PhysicalKey(parts)
    }

    /// Last part of the key, if any
    pub fn last(&self) -> Option<&KeyPart> {
        self.0.last()
    }
}

impl From<Vec<KeyPart>> for PhysicalKey {
    fn from(parts: Vec<KeyPart>) -> Self {
        PhysicalKey(parts)
    }
}

impl fmt::Display for PhysicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", part)?;
        }
        f.write_str("]")
    }
}
