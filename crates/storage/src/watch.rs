//! Change streams for MemoryStore
//!
//! Both stream kinds subscribe to the store's broadcast channel when they are
//! created, so no commit between `watch()` and the first poll is missed.
//!
//! A subscriber that falls more than `watch_capacity` commits behind is
//! resynchronised with a full snapshot instead of the missed change sets.
//! Prefix snapshots also name the keys deleted in the gap, since a scan only
//! returns keys that exist.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use driftkv_core::{KvEntryMaybe, PhysicalKey, WatchStream};

use crate::memory::{ChangeSet, Inner};

/// Snapshot of a fixed key set after every commit that touches it
pub(crate) fn key_stream(store: Arc<Inner>, keys: Vec<PhysicalKey>) -> WatchStream {
    let rx = store.subscribe();
    let initial = store.snapshot(&keys);

    stream::unfold(
        (store, rx, keys, Some(initial)),
        |(store, mut rx, keys, pending)| async move {
            if let Some(snapshot) = pending {
                return Some((Ok(snapshot), (store, rx, keys, None)));
            }
            loop {
                match rx.recv().await {
                    Ok(change) if change.touches(&keys) => {
                        let snapshot = store.snapshot(&keys);
                        return Some((Ok(snapshot), (store, rx, keys, None)));
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(target: "driftkv::storage", skipped, "Key watcher lagged, resyncing");
                        let snapshot = store.snapshot(&keys);
                        return Some((Ok(snapshot), (store, rx, keys, None)));
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        },
    )
    .boxed()
}

struct PrefixWatch {
    store: Arc<Inner>,
    rx: broadcast::Receiver<Arc<ChangeSet>>,
    prefix: PhysicalKey,
    /// Keys last reported present
    live: BTreeSet<PhysicalKey>,
}

impl PrefixWatch {
    fn track(&mut self, entries: &[KvEntryMaybe]) {
        for entry in entries {
            if entry.is_present() {
                self.live.insert(entry.key.clone());
            } else {
                self.live.remove(&entry.key);
            }
        }
    }

    /// Current entries under the prefix, preceded by a missing entry for
    /// every key reported present earlier that is gone now
    fn resync(&mut self) -> Vec<KvEntryMaybe> {
        let current: Vec<KvEntryMaybe> = self
            .store
            .scan(&self.prefix)
            .into_iter()
            .map(KvEntryMaybe::from)
            .collect();
        let present: BTreeSet<&PhysicalKey> = current.iter().map(|e| &e.key).collect();
        let gone: Vec<KvEntryMaybe> = self
            .live
            .iter()
            .filter(|key| !present.contains(key))
            .cloned()
            .map(KvEntryMaybe::missing)
            .collect();

        let snapshot: Vec<KvEntryMaybe> = gone.into_iter().chain(current).collect();
        self.live.clear();
        self.track(&snapshot);
        snapshot
    }
}

/// Every entry under a prefix, then the post-commit state of changed keys
///
/// A lag resync carries the full current state plus a missing entry for
/// each key deleted while the subscriber was behind.
pub(crate) fn prefix_stream(store: Arc<Inner>, prefix: PhysicalKey) -> WatchStream {
    let rx = store.subscribe();
    let mut watch = PrefixWatch {
        store,
        rx,
        prefix,
        live: BTreeSet::new(),
    };
    let initial = watch.resync();

    stream::unfold(
        (watch, Some(initial)),
        |(mut watch, pending)| async move {
            if let Some(snapshot) = pending {
                return Some((Ok(snapshot), (watch, None)));
            }
            loop {
                match watch.rx.recv().await {
                    Ok(change) => {
                        let changed: Vec<KvEntryMaybe> = change
                            .entries
                            .iter()
                            .filter(|e| e.key.starts_with(&watch.prefix))
                            .cloned()
                            .collect();
                        if changed.is_empty() {
                            continue;
                        }
                        watch.track(&changed);
                        return Some((Ok(changed), (watch, None)));
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(target: "driftkv::storage", skipped, "Prefix watcher lagged, resyncing");
                        let snapshot = watch.resync();
                        return Some((Ok(snapshot), (watch, None)));
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        },
    )
    .boxed()
}
