//! Typed query hooks
//!
//! Every CRUD operation emits a closed set of events:
//!
//! 1. `BeforeQuery` before any validation or I/O
//! 2. `AfterQuery` with the number of affected records on success
//! 3. `QueryFailed` with the error on failure
//!
//! Handlers live in a [`HookRegistry`] handed to each `CrudManager` at
//! construction. They run synchronously, in registration order, on the
//! task that runs the query. A handler cannot change the outcome.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use driftkv_core::DriftError;

/// CRUD operation that produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryAction {
    Create,
    CreateMany,
    FindMany,
    FindFirst,
    FindUnique,
    Count,
    Update,
    UpdateMany,
    Delete,
    DeleteMany,
}

impl QueryAction {
    /// Camel-case action name
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryAction::Create => "create",
            QueryAction::CreateMany => "createMany",
            QueryAction::FindMany => "findMany",
            QueryAction::FindFirst => "findFirst",
            QueryAction::FindUnique => "findUnique",
            QueryAction::Count => "count",
            QueryAction::Update => "update",
            QueryAction::UpdateMany => "updateMany",
            QueryAction::Delete => "delete",
            QueryAction::DeleteMany => "deleteMany",
        }
    }
}

impl fmt::Display for QueryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event delivered to hook handlers
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CrudEvent<'a> {
    /// The operation is about to run
    BeforeQuery {
        table: &'a str,
        action: QueryAction,
    },
    /// The operation succeeded
    AfterQuery {
        table: &'a str,
        action: QueryAction,
        /// Records returned, written or deleted
        affected: usize,
    },
    /// The operation failed
    QueryFailed {
        table: &'a str,
        action: QueryAction,
        error: &'a DriftError,
    },
}

impl CrudEvent<'_> {
    /// Table of the operation
    pub fn table(&self) -> &str {
        match self {
            CrudEvent::BeforeQuery { table, .. }
            | CrudEvent::AfterQuery { table, .. }
            | CrudEvent::QueryFailed { table, .. } => table,
        }
    }

    /// Action of the operation
    pub fn action(&self) -> QueryAction {
        match self {
            CrudEvent::BeforeQuery { action, .. }
            | CrudEvent::AfterQuery { action, .. }
            | CrudEvent::QueryFailed { action, .. } => *action,
        }
    }
}

/// Identifies a registered handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

type Handler = Arc<dyn Fn(&CrudEvent<'_>) + Send + Sync>;

/// Ordered list of event handlers
#[derive(Default)]
pub struct HookRegistry {
    handlers: RwLock<Vec<(HookId, Handler)>>,
    next_id: AtomicU64,
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("handlers", &self.len())
            .finish()
    }
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, called after every handler registered before it
    pub fn register<F>(&self, handler: F) -> HookId
    where
        F: Fn(&CrudEvent<'_>) + Send + Sync + 'static,
    {
        let id = HookId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.write().push((id, Arc::new(handler)));
        debug!(target: "driftkv::hooks", id = id.0, "Registered hook");
        id
    }

    /// Remove a handler. Returns false if it was not registered.
    pub fn unregister(&self, id: HookId) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|(hook, _)| *hook != id);
        handlers.len() != before
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every handler in registration order
    pub fn emit(&self, event: &CrudEvent<'_>) {
        // Clone out so a handler may register or unregister without deadlocking
        let handlers: Vec<Handler> = self.handlers.read().iter().map(|(_, h)| h.clone()).collect();
        for handler in handlers {
            handler(event);
        }
    }
}
