//! Store contract
//!
//! The engine is written against these traits, never against a concrete
//! backend. Any ordered KV store that offers bounded atomic transactions,
//! version checks, prefix listing and change notification can implement them.
//!
//! Thread safety: implementations are shared read-only by every component
//! and must be safe to call concurrently (`Send + Sync`).

use crate::contract::Version;
use crate::error::Result;
use crate::key::PhysicalKey;
use crate::types::{CommitOutcome, KvEntry, KvEntryMaybe};
use crate::value::Value;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Stream of entries under a prefix, in key order
pub type ListStream = BoxStream<'static, Result<KvEntry>>;

/// Stream of key snapshots emitted by a watch
pub type WatchStream = BoxStream<'static, Result<Vec<KvEntryMaybe>>>;

/// Ordered key-value store
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read one key
    async fn get(&self, key: &PhysicalKey) -> Result<KvEntryMaybe>;

    /// Read several keys, results aligned with `keys`
    async fn get_many(&self, keys: &[PhysicalKey]) -> Result<Vec<KvEntryMaybe>>;

    /// Write one key outside any transaction
    async fn set(&self, key: PhysicalKey, value: Value) -> Result<Version>;

    /// Delete one key outside any transaction
    async fn delete(&self, key: &PhysicalKey) -> Result<()>;

    /// Open a new atomic operation
    ///
    /// The handle is exclusively owned by the caller and applies nothing
    /// until committed.
    fn atomic(&self) -> Box<dyn AtomicOperation>;

    /// List every entry whose key starts with `prefix`, in key order
    fn list(&self, prefix: &PhysicalKey) -> ListStream;

    /// Watch a fixed key set
    ///
    /// The first item is the current snapshot of all keys. A new snapshot of
    /// all keys follows every change to any of them. Dropping the stream
    /// ends the subscription.
    fn watch(&self, keys: Vec<PhysicalKey>) -> WatchStream;

    /// Watch every key under a prefix
    ///
    /// The first item lists every present entry under the prefix. Later items
    /// carry the post-commit state of each changed key, with `value: None`
    /// for deletions.
    fn watch_prefix(&self, prefix: PhysicalKey) -> WatchStream;
}

/// A buffered, all-or-nothing group of checks and mutations
#[async_trait]
pub trait AtomicOperation: Send {
    /// Require `key` to be at `expected` when the operation commits
    ///
    /// `None` requires the key to be absent.
    fn check(&mut self, key: PhysicalKey, expected: Option<Version>) -> &mut dyn AtomicOperation;

    /// Buffer a write
    fn set(&mut self, key: PhysicalKey, value: Value) -> &mut dyn AtomicOperation;

    /// Buffer a delete
    fn delete(&mut self, key: PhysicalKey) -> &mut dyn AtomicOperation;

    /// Number of buffered checks and mutations
    fn len(&self) -> usize;

    /// True when nothing has been buffered
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply everything atomically
    ///
    /// Returns `Rejected` without applying anything if any check fails.
    /// `Err` is reserved for store failures (e.g. too many operations).
    async fn commit(&mut self) -> Result<CommitOutcome>;
}
