//! Drift: the entry point tying tables, relations and watches together
//!
//! A `Drift` instance owns:
//! - the shared store handle, used read-only by every component
//! - the `DriftConfig` it was opened with
//! - one `HookRegistry`, handed to every table
//! - the `RelationManager`, which is also the table registry
//!
//! # Example
//!
//! ```text
//! let drift = Drift::in_memory(DriftConfig::default())?;
//! let users = drift.register(EntityDef::new("user", schema))?;
//! users.create(record).await?;
//! ```

pub mod config;

pub use config::{DriftConfig, CONFIG_FILE_NAME};

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use driftkv_core::{DriftError, KvStore, Result};
use driftkv_storage::MemoryStore;

use crate::crud::{CrudManager, CrudOptions};
use crate::hooks::HookRegistry;
use crate::relation::{Relation, RelationManager};
use crate::schema::Schema;
use crate::watcher::{WatchArgs, WatchEvent, WatchSubscription, Watcher};

/// Per-entity options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntityOptions {
    /// Stamp `createdAt`/`updatedAt`; `None` follows `DriftConfig::timestamps`
    pub timestamps: Option<bool>,
}

/// A table to register: name, schema and options
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDef {
    /// Table name, the first part of every primary key
    pub name: String,
    /// Field list with key roles
    pub schema: Schema,
    /// Entity options
    pub options: EntityOptions,
}

impl EntityDef {
    /// Entity with default options
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        EntityDef {
            name: name.into(),
            schema,
            options: EntityOptions::default(),
        }
    }

    /// Override the configured timestamp default
    pub fn timestamps(mut self, enabled: bool) -> Self {
        self.options.timestamps = Some(enabled);
        self
    }
}

/// Registry of tables over one store
#[derive(Clone)]
pub struct Drift {
    store: Arc<dyn KvStore>,
    config: DriftConfig,
    hooks: Arc<HookRegistry>,
    relations: Arc<RelationManager>,
}

impl std::fmt::Debug for Drift {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Drift")
            .field("config", &self.config)
            .field("tables", &self.tables())
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl Drift {
    /// Open over an existing store
    pub fn new(store: Arc<dyn KvStore>, config: DriftConfig) -> Result<Self> {
        config.validate()?;
        info!(
            target: "driftkv::database",
            operation_limit = config.operation_limit,
            timestamps = config.timestamps,
            "Drift opened"
        );
        Ok(Drift {
            store,
            config,
            hooks: Arc::new(HookRegistry::new()),
            relations: Arc::new(RelationManager::new()),
        })
    }

    /// Open over a fresh `MemoryStore` sized by `config`
    pub fn in_memory(config: DriftConfig) -> Result<Self> {
        let store = MemoryStore::with_options(config.store_options());
        Self::new(Arc::new(store), config)
    }

    /// Open over a fresh `MemoryStore`, reading config from a TOML file
    pub fn in_memory_from_file(path: &Path) -> Result<Self> {
        Self::in_memory(DriftConfig::from_file(path)?)
    }

    /// Shared store handle
    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// Configuration this instance was opened with
    pub fn config(&self) -> &DriftConfig {
        &self.config
    }

    /// Hook registry shared by every table
    pub fn hooks(&self) -> &Arc<HookRegistry> {
        &self.hooks
    }

    /// Relation and table registry
    pub fn relations(&self) -> &Arc<RelationManager> {
        &self.relations
    }

    /// Register a table and return its manager
    ///
    /// Schema problems surface here, before any I/O.
    pub fn register(&self, def: EntityDef) -> Result<Arc<CrudManager>> {
        let options = CrudOptions {
            operation_limit: self.config.operation_limit,
            timestamps: def.options.timestamps.unwrap_or(self.config.timestamps),
        };
        let crud = CrudManager::new(
            def.name,
            def.schema,
            self.store.clone(),
            self.hooks.clone(),
            options,
        )?
        .with_relations(Arc::downgrade(&self.relations));

        let crud = Arc::new(crud);
        self.relations.add_table(crud.clone())?;
        Ok(crud)
    }

    /// Manager of a registered table
    pub fn entity(&self, name: &str) -> Result<Arc<CrudManager>> {
        self.relations.table(name).ok_or_else(|| {
            DriftError::SchemaConfiguration(format!("table '{}' is not registered", name))
        })
    }

    /// Names of registered tables, sorted
    pub fn tables(&self) -> Vec<String> {
        self.relations.table_names()
    }

    /// Declare a relation on a registered table
    pub fn relate(&self, table: &str, relation: Relation) -> Result<()> {
        self.relations.relate(table, relation)
    }

    /// Watcher over a registered table
    pub fn watcher(&self, table: &str) -> Result<Watcher> {
        Ok(Watcher::new(self.entity(table)?))
    }

    /// Subscribe to a registered table; see [`Watcher::watch`]
    pub fn watch<F>(&self, table: &str, args: WatchArgs, callback: F) -> Result<WatchSubscription>
    where
        F: FnMut(WatchEvent) + Send + 'static,
    {
        Ok(self.watcher(table)?.watch(args, callback))
    }
}
