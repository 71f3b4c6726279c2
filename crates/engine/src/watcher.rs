//! Watcher: live subscriptions to records matching a `where` clause
//!
//! The watched key set is derived the same way reads are resolved:
//!
//! | Plan | Store primitive |
//! |------|-----------------|
//! | point reads (primary/unique bound) | `watch(keys)` |
//! | index scan | `watch_prefix` per index prefix |
//! | table scan | `watch_prefix([table])` |
//!
//! Every emitted entry is reconciled against the last version seen for its
//! key:
//!
//! - same version as last time: no call
//! - present and matching `where`: `WatchEvent::Value`
//! - absent (or no longer matching) after being delivered:
//!   `WatchEvent::NoValue`, once
//! - absent and never delivered: no call
//!
//! A subscription is `Active` until `cancel()` or a stream error, then
//! `Cancelled` for good. Each callback runs under a gate that `cancel()`
//! also takes, so once `cancel()` returns no callback is running and none
//! will start, on any runtime flavor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use parking_lot::ReentrantMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use driftkv_core::{
    DriftError, KvEntryMaybe, PhysicalKey, Record, Result, Version, VersionedRecord, WatchStream,
};

use crate::crud::{CrudManager, ReadPlan};
use crate::query;
use crate::search::filter_entries;

/// What a subscriber is told about one key
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    /// The record at a watched key is present and matches
    Value(VersionedRecord),
    /// A previously delivered record is gone
    NoValue {
        /// Key whose value disappeared
        key: PhysicalKey,
    },
}

/// Arguments of a watch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WatchArgs {
    /// Field equality constraints; unscoped when `None`
    pub where_: Option<Record>,
    /// Fields kept in each delivered record
    pub select: Option<Vec<String>>,
}

impl WatchArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn where_(mut self, where_: Record) -> Self {
        self.where_ = Some(where_);
        self
    }

    pub fn select<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.select = Some(fields.into_iter().map(Into::into).collect());
        self
    }
}

/// Per-key reconciliation state of one subscription
#[derive(Debug, Default)]
struct Reconciler {
    where_: Option<Record>,
    select: Option<Vec<String>>,
    /// Last version per key, and whether that version was delivered
    last: HashMap<PhysicalKey, (Version, bool)>,
}

impl Reconciler {
    fn new(args: WatchArgs) -> Self {
        Reconciler {
            where_: args.where_,
            select: args.select,
            last: HashMap::new(),
        }
    }

    fn apply(&mut self, entries: Vec<KvEntryMaybe>) -> Vec<WatchEvent> {
        let mut events = Vec::new();
        for entry in entries {
            let key = entry.key.clone();
            match entry.version {
                Some(version) if entry.value.is_some() => {
                    let previous = self.last.get(&key).copied();
                    if previous.map(|(v, _)| v) == Some(version) {
                        continue;
                    }
                    let matched = filter_entries(vec![entry], self.where_.as_ref()).pop();
                    self.last.insert(key.clone(), (version, matched.is_some()));
                    match matched {
                        Some(record) => events.push(WatchEvent::Value(self.project(record))),
                        None if previous.is_some_and(|(_, delivered)| delivered) => {
                            events.push(WatchEvent::NoValue { key })
                        }
                        None => {}
                    }
                }
                _ => {
                    if let Some((_, true)) = self.last.remove(&key) {
                        events.push(WatchEvent::NoValue { key });
                    }
                }
            }
        }
        events
    }

    fn project(&self, record: VersionedRecord) -> VersionedRecord {
        match &self.select {
            Some(select) => record.map(|value| query::project(value, select, &[])),
            None => record,
        }
    }
}

/// Opens subscriptions on one table
#[derive(Debug, Clone)]
pub struct Watcher {
    crud: Arc<CrudManager>,
}

impl Watcher {
    pub fn new(crud: Arc<CrudManager>) -> Self {
        Watcher { crud }
    }

    /// Keys or prefixes watched for `where_`, and the stream over them
    fn open(&self, where_: Option<&Record>) -> (Vec<PhysicalKey>, WatchStream) {
        let store = self.crud.store();
        match self.crud.plan(where_) {
            ReadPlan::PointReads(keys) => (keys.clone(), store.watch(keys)),
            ReadPlan::IndexScan(prefixes) => {
                let streams: Vec<WatchStream> = prefixes
                    .iter()
                    .map(|prefix| store.watch_prefix(prefix.clone()))
                    .collect();
                (prefixes, stream::select_all(streams).boxed())
            }
            ReadPlan::TableScan => {
                let prefix = self.crud.codec().table_prefix();
                (vec![prefix.clone()], store.watch_prefix(prefix))
            }
        }
    }

    /// Start a subscription that calls `callback` for every change
    ///
    /// Must be called from within a tokio runtime. The subscription runs on
    /// its own task until cancelled, dropped, or the store stream fails.
    pub fn watch<F>(&self, args: WatchArgs, mut callback: F) -> WatchSubscription
    where
        F: FnMut(WatchEvent) + Send + 'static,
    {
        let (keys, mut stream) = self.open(args.where_.as_ref());
        let token = CancellationToken::new();
        let cancelled = Arc::new(AtomicBool::new(false));
        let gate = Arc::new(ReentrantMutex::new(()));
        let mut reconciler = Reconciler::new(args);

        debug!(
            target: "driftkv::watcher",
            table = self.crud.table(),
            keys = keys.len(),
            "Watch subscription opened"
        );

        let task = {
            let token = token.clone();
            let cancelled = cancelled.clone();
            let gate = gate.clone();
            let table = self.crud.table().to_string();
            tokio::spawn(async move {
                loop {
                    let item = tokio::select! {
                        biased;
                        () = token.cancelled() => return Ok(()),
                        item = stream.next() => item,
                    };
                    match item {
                        None => return Ok(()),
                        Some(Ok(entries)) => {
                            for event in reconciler.apply(entries) {
                                let _gate = gate.lock();
                                if cancelled.load(Ordering::Acquire) {
                                    return Ok(());
                                }
                                callback(event);
                            }
                        }
                        Some(Err(error)) => {
                            cancelled.store(true, Ordering::Release);
                            token.cancel();
                            warn!(target: "driftkv::watcher", table = %table, %error, "Watch stream failed");
                            return Err(match error {
                                DriftError::WatchStream(_) => error,
                                other => DriftError::WatchStream(other.to_string()),
                            });
                        }
                    }
                }
            })
        };

        WatchSubscription {
            keys,
            token,
            cancelled,
            gate,
            task: Some(task),
        }
    }
}

/// Handle of a live watch
///
/// Dropping the handle cancels the subscription.
#[derive(Debug)]
pub struct WatchSubscription {
    keys: Vec<PhysicalKey>,
    token: CancellationToken,
    cancelled: Arc<AtomicBool>,
    /// Held for the duration of every callback
    gate: Arc<ReentrantMutex<()>>,
    task: Option<JoinHandle<Result<()>>>,
}

impl WatchSubscription {
    /// Keys or prefixes being watched
    pub fn keys(&self) -> &[PhysicalKey] {
        &self.keys
    }

    /// Stop delivering changes. Idempotent, safe after an error.
    ///
    /// If a callback is running on another thread, blocks until it returns.
    /// No callback starts after this returns. Calling it from inside the
    /// callback does not block.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            debug!(target: "driftkv::watcher", "Watch subscription cancelled");
        }
        self.token.cancel();
        drop(self.gate.lock());
    }

    /// Whether the subscription was cancelled or its stream failed
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Wait for the subscription to end
    ///
    /// Returns the stream error if that is what ended it, `Ok` after a
    /// cancel or when the store closes the stream. Later calls return `Ok`.
    pub async fn closed(&mut self) -> Result<()> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        match task.await {
            Ok(result) => result,
            Err(join) => Err(DriftError::WatchStream(format!(
                "watch task failed: {}",
                join
            ))),
        }
    }
}

impl Drop for WatchSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
