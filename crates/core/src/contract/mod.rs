//! Contract types shared by the store and the engine
//!
//! - `version`: opaque version token returned by every write and read
//! - `versioned`: a value paired with the version that produced it
//! - `timestamp`: microsecond instants, the record model's date type
//!
//! ## Usage
//!
//! ```
//! use driftkv_core::contract::{Timestamp, Version, Versioned};
//! ```

pub mod timestamp;
pub mod version;
pub mod versioned;

pub use timestamp::Timestamp;
pub use version::Version;
pub use versioned::{Versioned, VersionedRecord};
