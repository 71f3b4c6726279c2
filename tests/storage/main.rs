//! Storage Integration Tests
//!
//! `MemoryStore` against the `KvStore` contract.

#[path = "../common/mod.rs"]
mod common;

mod memory_store;
