//! MemoryStore: in-process ordered KV store
//!
//! This module implements the `KvStore` contract using:
//! - `BTreeMap<PhysicalKey, (Value, Version)>` for ordered key storage
//! - `parking_lot::RwLock` for thread-safe access
//! - `AtomicU64` for monotonically increasing commit versions
//! - `tokio::sync::broadcast` for change fan-out to watchers
//!
//! # Design Notes
//!
//! - **No version history**: each key stores only its latest value and version
//! - **One version per commit**: every key written by a commit shares it
//! - **Checks and mutations under one write lock**: no reader can observe a
//!   partially applied atomic operation, and no commit can slip between
//!   another commit's checks and its writes
//! - **Changes are published under the write lock** so watchers see commits
//!   in version order

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use driftkv_core::{
    AtomicOperation, DriftError, KvEntry, KvEntryMaybe, KvStore, ListStream, PhysicalKey,
    Result, Value, Version, WatchStream, DEFAULT_MAX_ATOMIC_OPERATIONS,
};

use crate::atomic::{Check, MemoryAtomic, Mutation};
use crate::watch;

/// Default broadcast buffer for change notifications
pub const DEFAULT_WATCH_CAPACITY: usize = 1024;

/// Tunables for a [`MemoryStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryStoreOptions {
    /// Checks plus mutations accepted in one atomic operation
    pub max_atomic_operations: usize,
    /// Change notifications buffered per watcher before it lags
    pub watch_capacity: usize,
}

impl Default for MemoryStoreOptions {
    fn default() -> Self {
        MemoryStoreOptions {
            max_atomic_operations: DEFAULT_MAX_ATOMIC_OPERATIONS,
            watch_capacity: DEFAULT_WATCH_CAPACITY,
        }
    }
}

/// Post-commit state of every key touched by one commit
#[derive(Debug, Clone)]
pub(crate) struct ChangeSet {
    pub(crate) entries: Vec<KvEntryMaybe>,
}

impl ChangeSet {
    pub(crate) fn touches(&self, keys: &[PhysicalKey]) -> bool {
        self.entries.iter().any(|e| keys.contains(&e.key))
    }
}

#[derive(Debug)]
pub(crate) struct Inner {
    data: RwLock<BTreeMap<PhysicalKey, (Value, Version)>>,
    version: AtomicU64,
    commits: AtomicU64,
    changes: broadcast::Sender<Arc<ChangeSet>>,
    pub(crate) options: MemoryStoreOptions,
}

impl Inner {
    pub(crate) fn snapshot(&self, keys: &[PhysicalKey]) -> Vec<KvEntryMaybe> {
        let data = self.data.read();
        keys.iter()
            .map(|key| match data.get(key) {
                Some((value, version)) => KvEntryMaybe {
                    key: key.clone(),
                    value: Some(value.clone()),
                    version: Some(*version),
                },
                None => KvEntryMaybe::missing(key.clone()),
            })
            .collect()
    }

    pub(crate) fn scan(&self, prefix: &PhysicalKey) -> Vec<KvEntry> {
        let data = self.data.read();
        data.range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, (value, version))| KvEntry {
                key: key.clone(),
                value: value.clone(),
                version: *version,
            })
            .collect()
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<Arc<ChangeSet>> {
        self.changes.subscribe()
    }

    /// Validate checks and apply mutations under a single write lock
    ///
    /// Returns `None` if any check failed; nothing is applied in that case.
    pub(crate) fn apply(&self, checks: &[Check], mutations: Vec<Mutation>) -> Option<Version> {
        let mut data = self.data.write();

        for check in checks {
            let current = data.get(&check.key).map(|(_, version)| *version);
            if current != check.expected {
                debug!(
                    target: "driftkv::storage",
                    key = %check.key,
                    expected = ?check.expected.map(|v| v.to_string()),
                    current = ?current.map(|v| v.to_string()),
                    "Check failed, rejecting commit"
                );
                return None;
            }
        }

        let version = Version::new(self.version.fetch_add(1, Ordering::SeqCst) + 1);
        let mut entries = Vec::with_capacity(mutations.len());

        for mutation in mutations {
            match mutation {
                Mutation::Set(key, value) => {
                    data.insert(key.clone(), (value.clone(), version));
                    entries.push(KvEntryMaybe {
                        key,
                        value: Some(value),
                        version: Some(version),
                    });
                }
                Mutation::Delete(key) => {
                    data.remove(&key);
                    entries.push(KvEntryMaybe::missing(key));
                }
            }
        }

        self.commits.fetch_add(1, Ordering::SeqCst);
        trace!(target: "driftkv::storage", %version, keys = entries.len(), "Committed");

        // No receivers is not an error
        let _ = self.changes.send(Arc::new(ChangeSet { entries }));

        Some(version)
    }
}

/// In-memory ordered KV store
///
/// Cloning is cheap and yields a handle to the same store.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Create a new empty store with default options
    pub fn new() -> Self {
        Self::with_options(MemoryStoreOptions::default())
    }

    /// Create a new empty store
    pub fn with_options(options: MemoryStoreOptions) -> Self {
        let (changes, _) = broadcast::channel(options.watch_capacity.max(1));
        MemoryStore {
            inner: Arc::new(Inner {
                data: RwLock::new(BTreeMap::new()),
                version: AtomicU64::new(0),
                commits: AtomicU64::new(0),
                changes,
                options,
            }),
        }
    }

    /// Highest version assigned so far
    pub fn current_version(&self) -> Version {
        Version::new(self.inner.version.load(Ordering::SeqCst))
    }

    /// Number of successful commits, standalone writes included
    pub fn commit_count(&self) -> u64 {
        self.inner.commits.load(Ordering::SeqCst)
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.inner.data.read().len()
    }

    /// True when no key is stored
    pub fn is_empty(&self) -> bool {
        self.inner.data.read().is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &PhysicalKey) -> Result<KvEntryMaybe> {
        let mut entries = self.inner.snapshot(std::slice::from_ref(key));
        Ok(entries.pop().unwrap_or_else(|| KvEntryMaybe::missing(key.clone())))
    }

    async fn get_many(&self, keys: &[PhysicalKey]) -> Result<Vec<KvEntryMaybe>> {
        Ok(self.inner.snapshot(keys))
    }

    async fn set(&self, key: PhysicalKey, value: Value) -> Result<Version> {
        let mut op = self.atomic();
        op.set(key, value);
        op.commit()
            .await?
            .version()
            .ok_or_else(|| DriftError::Storage("unconditional write was rejected".into()))
    }

    async fn delete(&self, key: &PhysicalKey) -> Result<()> {
        let mut op = self.atomic();
        op.delete(key.clone());
        op.commit().await?;
        Ok(())
    }

    fn atomic(&self) -> Box<dyn AtomicOperation> {
        Box::new(MemoryAtomic::new(Arc::clone(&self.inner)))
    }

    fn list(&self, prefix: &PhysicalKey) -> ListStream {
        let entries = self.inner.scan(prefix);
        stream::iter(entries.into_iter().map(Ok)).boxed()
    }

    fn watch(&self, keys: Vec<PhysicalKey>) -> WatchStream {
        watch::key_stream(Arc::clone(&self.inner), keys)
    }

    fn watch_prefix(&self, prefix: PhysicalKey) -> WatchStream {
        watch::prefix_stream(Arc::clone(&self.inner), prefix)
    }
}
