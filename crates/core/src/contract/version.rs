//! Version tokens
//!
//! Every successful commit produces one `Version`. Every key written by that
//! commit carries it, and every read returns it alongside the value. Callers
//! treat it as opaque: the only supported uses are equality checks and
//! passing it back as an expected version in a transaction check.
//!
//! Versions display as 20 hex digits, zero padded, so that their textual
//! order matches their commit order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque, monotonically increasing commit token
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    /// Version of a store that has never committed
    pub const ZERO: Version = Version(0);

    /// Create a version from a raw commit sequence number
    #[inline]
    pub const fn new(seq: u64) -> Self {
        Version(seq)
    }

    /// Raw commit sequence number
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// The version following this one
    pub const fn next(&self) -> Self {
        Version(self.0.saturating_add(1))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:020x}", self.0)
    }
}

impl FromStr for Version {
    type Err = std::num::ParseIntError;

    /// Parse the 20-digit hex form produced by `Display`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str_radix(s, 16).map(Version)
    }
}

impl From<u64> for Version {
    fn from(v: u64) -> Self {
        Version(v)
    }
}
