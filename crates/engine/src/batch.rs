//! BatchOperationManager: bounded atomic write groups
//!
//! A logical write request is split into chunks of at most
//! `operation_limit` items. Each chunk is one atomic operation on the store:
//! every item's mutation callback registers its checks and writes on the
//! same handle, then the handle is committed once.
//!
//! A chunk either commits fully or not at all. Chunks are committed in
//! order and there is no atomicity across them: when chunk `n` is rejected,
//! chunks `0..n` stay committed and chunks after `n` are never attempted.
//! The returned `BatchOperation` error reports both numbers.

use std::sync::Arc;

use tracing::{debug, warn};

use driftkv_core::{
    AtomicOperation, CommitOutcome, DriftError, KvEntryMaybe, KvStore, OperationKind,
    PhysicalKey, Record, Result, Timestamp, Value, Version, VersionedRecord,
};

use crate::schema::{CREATED_AT, UPDATED_AT};

/// Options for one batch execution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOptions {
    /// Stamp `createdAt`/`updatedAt` on every item
    pub timestamps: bool,
}

/// A write intent carried through a batch
///
/// Items are stamped before their mutation runs, so the stored value and
/// the returned value agree.
pub trait BatchItem {
    /// Stamp timestamps for `operation` at `now`
    fn stamp(&mut self, now: Timestamp, operation: OperationKind);

    /// Attach the committed version
    fn into_versioned(self, version: Version) -> VersionedRecord;
}

impl BatchItem for Record {
    fn stamp(&mut self, now: Timestamp, operation: OperationKind) {
        match operation {
            OperationKind::Create => {
                let created = match self.get(CREATED_AT) {
                    Some(Value::Timestamp(ts)) => *ts,
                    _ => now,
                };
                self.insert(CREATED_AT.to_string(), Value::Timestamp(created));
                self.insert(UPDATED_AT.to_string(), Value::Timestamp(created));
            }
            OperationKind::Update => {
                self.insert(UPDATED_AT.to_string(), Value::Timestamp(now));
            }
            OperationKind::Delete | OperationKind::Read => {}
        }
    }

    fn into_versioned(self, version: Version) -> VersionedRecord {
        VersionedRecord::new(self, version)
    }
}

/// Chunks write intents into atomic operations no larger than the limit
#[derive(Clone)]
pub struct BatchOperationManager {
    store: Arc<dyn KvStore>,
    limit: usize,
}

impl std::fmt::Debug for BatchOperationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchOperationManager")
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

impl BatchOperationManager {
    /// Create a manager that commits at most `limit` items per chunk
    ///
    /// A zero limit is treated as one.
    pub fn new(store: Arc<dyn KvStore>, limit: usize) -> Self {
        BatchOperationManager {
            store,
            limit: limit.max(1),
        }
    }

    /// Items per chunk
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Execute `mutate` for every item, one atomic operation per chunk
    ///
    /// Results are returned in input order. An empty `items` list returns
    /// an empty result without touching the store. An error from `mutate`
    /// aborts the current chunk before it is committed.
    pub async fn execute<I, F>(
        &self,
        items: Vec<I>,
        mut mutate: F,
        operation: OperationKind,
        options: BatchOptions,
    ) -> Result<Vec<VersionedRecord>>
    where
        I: BatchItem + Send,
        F: FnMut(&mut dyn AtomicOperation, &I) -> Result<()> + Send,
    {
        let total = items.len();
        let mut results = Vec::with_capacity(total);
        let mut remaining = items.into_iter();
        let mut chunk_index = 0;

        loop {
            let mut chunk: Vec<I> = remaining.by_ref().take(self.limit).collect();
            if chunk.is_empty() {
                break;
            }

            if options.timestamps {
                let now = Timestamp::now();
                for item in chunk.iter_mut() {
                    item.stamp(now, operation);
                }
            }

            let mut atomic = self.store.atomic();
            for item in &chunk {
                mutate(atomic.as_mut(), item)?;
            }
            let queued = atomic.len();

            match atomic.commit().await? {
                CommitOutcome::Committed { version } => {
                    debug!(
                        target: "driftkv::batch",
                        %operation,
                        chunk = chunk_index,
                        items = chunk.len(),
                        queued,
                        %version,
                        "Batch chunk committed"
                    );
                    results.extend(chunk.into_iter().map(|item| item.into_versioned(version)));
                }
                CommitOutcome::Rejected => {
                    warn!(
                        target: "driftkv::batch",
                        %operation,
                        chunk = chunk_index,
                        committed_chunks = chunk_index,
                        "Batch chunk rejected"
                    );
                    return Err(DriftError::BatchOperation {
                        operation,
                        chunk: chunk_index,
                        committed_chunks: chunk_index,
                    });
                }
            }
            chunk_index += 1;
        }

        debug_assert_eq!(results.len(), total);
        Ok(results)
    }

    /// Read keys in chunks of at most `limit`, results aligned with `keys`
    pub async fn read_many(&self, keys: &[PhysicalKey]) -> Result<Vec<KvEntryMaybe>> {
        let mut entries = Vec::with_capacity(keys.len());
        for chunk in keys.chunks(self.limit) {
            entries.extend(self.store.get_many(chunk).await?);
        }
        Ok(entries)
    }
}
