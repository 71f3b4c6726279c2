//! Atomic operation handle for MemoryStore
//!
//! Checks and mutations are buffered locally and only touch the store on
//! `commit()`. A check compares the key's current version with the expected
//! one, where `None` means the key must not exist.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use driftkv_core::{
    AtomicOperation, CommitOutcome, DriftError, PhysicalKey, Result, Value, Version,
};

use crate::memory::Inner;

#[derive(Debug, Clone)]
pub(crate) struct Check {
    pub(crate) key: PhysicalKey,
    pub(crate) expected: Option<Version>,
}

#[derive(Debug, Clone)]
pub(crate) enum Mutation {
    Set(PhysicalKey, Value),
    Delete(PhysicalKey),
}

/// Buffered atomic operation against a [`MemoryStore`](crate::MemoryStore)
#[derive(Debug)]
pub struct MemoryAtomic {
    store: Arc<Inner>,
    checks: Vec<Check>,
    mutations: Vec<Mutation>,
}

impl MemoryAtomic {
    pub(crate) fn new(store: Arc<Inner>) -> Self {
        MemoryAtomic {
            store,
            checks: Vec::new(),
            mutations: Vec::new(),
        }
    }
}

#[async_trait]
impl AtomicOperation for MemoryAtomic {
    fn check(&mut self, key: PhysicalKey, expected: Option<Version>) -> &mut dyn AtomicOperation {
        self.checks.push(Check { key, expected });
        self
    }

    fn set(&mut self, key: PhysicalKey, value: Value) -> &mut dyn AtomicOperation {
        self.mutations.push(Mutation::Set(key, value));
        self
    }

    fn delete(&mut self, key: PhysicalKey) -> &mut dyn AtomicOperation {
        self.mutations.push(Mutation::Delete(key));
        self
    }

    fn len(&self) -> usize {
        self.checks.len() + self.mutations.len()
    }

    async fn commit(&mut self) -> Result<CommitOutcome> {
        let max = self.store.options.max_atomic_operations;
        if self.len() > max {
            return Err(DriftError::Storage(format!(
                "atomic operation has {} checks and mutations, maximum is {}",
                self.len(),
                max
            )));
        }

        let checks = std::mem::take(&mut self.checks);
        let mutations = std::mem::take(&mut self.mutations);
        let outcome = match self.store.apply(&checks, mutations) {
            Some(version) => CommitOutcome::Committed { version },
            None => CommitOutcome::Rejected,
        };

        debug!(
            target: "driftkv::storage",
            checks = checks.len(),
            committed = outcome.is_ok(),
            "Atomic operation finished"
        );
        Ok(outcome)
    }
}
