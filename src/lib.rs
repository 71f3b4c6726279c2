//! driftkv - indexed, transactional records over an ordered key-value store
//!
//! driftkv gives callers a record-oriented API on top of any store that
//! implements the `KvStore` contract: primary, unique and index lookups,
//! filter/sort/paginate queries, relation includes and live watches.
//!
//! # Quick Start
//!
//! ```ignore
//! use driftkv::{Drift, DriftConfig, EntityDef, FieldKind, FindManyArgs, Schema};
//!
//! let drift = Drift::in_memory(DriftConfig::default())?;
//! let users = drift.register(EntityDef::new(
//!     "user",
//!     Schema::builder()
//!         .primary("id", FieldKind::String)
//!         .unique("email", FieldKind::String)
//!         .index("age", FieldKind::Int)
//!         .build()?,
//! ))?;
//!
//! users.create(record).await?;
//! let thirty = users.find_many(FindManyArgs::new().where_(by_age)).await?;
//! ```
//!
//! # Writes and atomicity
//!
//! Writes are grouped into atomic operations of at most `operation_limit`
//! records. A call that spans several groups is not atomic across them: a
//! rejected group leaves earlier groups committed and later ones untried.

pub use driftkv_core::{
    record_from_json, AtomicOperation, CommitOutcome, DriftError, KeyPart, KvEntry, KvEntryMaybe,
    KvStore, Limits, ListStream, OperationKind, PhysicalKey, Record, Result, Timestamp, Value, Version,
    Versioned, VersionedRecord, WatchStream, OPERATION_LIMIT,
};
pub use driftkv_engine::*;
pub use driftkv_storage::{MemoryStore, MemoryStoreOptions};
