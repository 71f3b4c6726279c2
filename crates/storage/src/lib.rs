//! Storage layer for driftkv
//!
//! This crate implements `MemoryStore`, an in-process ordered KV store that
//! satisfies the `KvStore` contract:
//! - bounded atomic operations with version checks
//! - tuple-prefix listing in key order
//! - key-set and prefix watch streams
//!
//! It is the reference backend for tests and for embedding the engine
//! without an external store.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod atomic;
pub mod memory;
mod watch;

pub use atomic::MemoryAtomic;
pub use memory::{MemoryStore, MemoryStoreOptions, DEFAULT_WATCH_CAPACITY};
