//! Core types and traits for driftkv
//!
//! This crate defines the foundational types used throughout the system:
//! - Value / Record: the logical record model
//! - KeyPart / PhysicalKey: ordered tuple keys stored in the KV store
//! - Version / Versioned<T> / Timestamp: contract types
//! - KvEntry / KvEntryMaybe / CommitOutcome: store-level results
//! - KvStore / AtomicOperation: the store contract the engine runs against
//! - DriftError: error taxonomy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod contract;
pub mod error;
pub mod key;
pub mod limits;
pub mod traits;
pub mod types;
pub mod value;

pub use contract::{Timestamp, Version, Versioned, VersionedRecord};
pub use error::{DriftError, Result};
pub use key::{KeyPart, PhysicalKey};
pub use limits::{Limits, DEFAULT_MAX_ATOMIC_OPERATIONS, OPERATION_LIMIT};
pub use traits::{AtomicOperation, KvStore, ListStream, WatchStream};
pub use types::{CommitOutcome, KvEntry, KvEntryMaybe, OperationKind};
pub use value::{record_from_json, Record, Value};
