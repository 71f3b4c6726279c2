//! Indexing and query engine for driftkv
//!
//! This crate turns records into physical keys and keeps them consistent:
//! - Schema: fields with typed key roles, validated once at build time
//! - KeyCodec: record + roles to ordered physical keys
//! - BatchOperationManager: bounded atomic write groups
//! - SearchManager: in-memory where-clause matching
//! - CrudManager: create/find/update/delete over one table
//! - Watcher: live, cancellable subscriptions
//! - RelationManager: foreign-key includes across tables
//! - Drift: the entry point that registers tables over one store
//!
//! The engine only talks to the store through the `KvStore` contract in
//! `driftkv-core`; `driftkv-storage` provides an in-memory implementation.

#![warn(clippy::all)]

pub mod batch;
pub mod crud;
pub mod database;
pub mod hooks;
pub mod keys;
pub mod query;
pub mod relation;
pub mod schema;
pub mod search;
pub mod watcher;

pub use batch::{BatchItem, BatchOperationManager, BatchOptions};
pub use crud::{CrudManager, CrudOptions, ReadPlan};
pub use database::{Drift, DriftConfig, EntityDef, EntityOptions, CONFIG_FILE_NAME};
pub use hooks::{CrudEvent, HookId, HookRegistry, QueryAction};
pub use keys::{
    access_keys_to_physical_keys, derive_access_keys, role_suffix, AccessKey, KeyCodec, TaggedKey,
};
pub use query::{FindManyArgs, SortOrder};
pub use relation::{Relation, RelationKind, RelationManager};
pub use schema::{
    FieldDef, FieldKind, KeyRole, Schema, SchemaBuilder, Validator, CREATED_AT, DEFAULT_PRIMARY,
    UPDATED_AT,
};
pub use search::{filter_entries, is_matching_value, matches_where, VERSION_FIELD};
pub use watcher::{WatchArgs, WatchEvent, WatchSubscription, Watcher};
