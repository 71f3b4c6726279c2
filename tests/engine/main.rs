//! Engine Integration Tests
//!
//! CRUD, batching, query shaping, relations, schema configuration and watches
//! through the public `Drift` API over a `MemoryStore`.

#[path = "../common/mod.rs"]
mod common;

mod batching;
mod crud_scenarios;
mod query;
mod relations;
