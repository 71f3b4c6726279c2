//! CrudManager: record operations over one table
//!
//! Composes the KeyCodec (which keys a record lives at), the
//! BatchOperationManager (bounded atomic writes) and the SearchManager
//! (post-fetch filtering) into create/find/update/delete.
//!
//! ## Read resolution
//!
//! A `where` clause that binds a role-bearing field is resolved through the
//! keys of that role, in priority order:
//!
//! | Bound field | Plan |
//! |-------------|------|
//! | primary | point reads of `[table, v]` |
//! | unique | point reads of `[table_by_unique_f, v]` |
//! | index | prefix scans of `[table_by_index_f, v]` |
//! | none | prefix scan of `[table]` |
//!
//! An array value binds every element ("in"). Every plan is followed by the
//! full `where` filter, so a plan may over-fetch but never under-fetch.
//! Results are deduplicated by primary value.
//!
//! ## Writes
//!
//! Every physical key of a record holds the full record. A write touches
//! every key of a record in the same batch item, so all keys of one record
//! land in the same atomic operation:
//!
//! - create: `check(k, None)` then `set(k)` for every key
//! - update: `check(primary, version)`, delete keys the record no longer
//!   has, `check(k, None)` for keys it gains, `set(k)` for every key
//! - delete: `check(primary, version)` then `delete(k)` for every key

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Weak};

use futures::TryStreamExt;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use driftkv_core::{
    AtomicOperation, DriftError, KeyPart, KvEntry, KvEntryMaybe, KvStore, OperationKind,
    PhysicalKey, Record, Result, Timestamp, Value, Version, VersionedRecord,
};

use crate::batch::{BatchItem, BatchOperationManager, BatchOptions};
use crate::hooks::{CrudEvent, HookRegistry, QueryAction};
use crate::keys::KeyCodec;
use crate::query::{self, FindManyArgs};
use crate::relation::RelationManager;
use crate::schema::{FieldKind, KeyRole, Schema, Validator};
use crate::search::filter_entries;

/// How a `where` clause is fetched from the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadPlan {
    /// Read exactly these keys
    PointReads(Vec<PhysicalKey>),
    /// Scan these index prefixes
    IndexScan(Vec<PhysicalKey>),
    /// Scan the primary table prefix
    TableScan,
}

/// Per-table options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrudOptions {
    /// Items per atomic operation
    pub operation_limit: usize,
    /// Stamp `createdAt`/`updatedAt`
    pub timestamps: bool,
}

impl Default for CrudOptions {
    fn default() -> Self {
        CrudOptions {
            operation_limit: driftkv_core::OPERATION_LIMIT,
            timestamps: false,
        }
    }
}

/// Keys and version of a record as it was read
#[derive(Debug, Clone)]
struct Previous {
    primary: PhysicalKey,
    keys: Vec<PhysicalKey>,
    version: Version,
}

/// One record on its way through a batch
#[derive(Debug, Clone)]
struct WriteIntent {
    record: Record,
    keys: Vec<PhysicalKey>,
    previous: Option<Previous>,
}

impl BatchItem for WriteIntent {
    fn stamp(&mut self, now: Timestamp, operation: OperationKind) {
        self.record.stamp(now, operation);
    }

    fn into_versioned(self, version: Version) -> VersionedRecord {
        VersionedRecord::new(self.record, version)
    }
}

fn write_created(op: &mut dyn AtomicOperation, item: &WriteIntent) -> Result<()> {
    let value = Value::Object(item.record.clone());
    for key in &item.keys {
        op.check(key.clone(), None).set(key.clone(), value.clone());
    }
    Ok(())
}

fn write_updated(op: &mut dyn AtomicOperation, item: &WriteIntent) -> Result<()> {
    let previous = item
        .previous
        .as_ref()
        .ok_or_else(|| DriftError::Storage("update without a previous version".to_string()))?;

    op.check(previous.primary.clone(), Some(previous.version));
    for stale in previous.keys.iter().filter(|k| !item.keys.contains(k)) {
        op.delete(stale.clone());
    }
    let value = Value::Object(item.record.clone());
    for key in &item.keys {
        if !previous.keys.contains(key) {
            op.check(key.clone(), None);
        }
        op.set(key.clone(), value.clone());
    }
    Ok(())
}

/// Fail when two intents of one call claim the same physical key
///
/// Every "must not exist" check of a commit runs against the state before
/// it, so two records sharing a key would both pass and the later `set`
/// would win. The error names the chunk holding the second claimant and
/// nothing has been committed.
fn reject_key_collisions(
    intents: &[WriteIntent],
    operation: OperationKind,
    limit: usize,
) -> Result<()> {
    let mut owners: HashMap<&PhysicalKey, usize> = HashMap::new();
    for (idx, intent) in intents.iter().enumerate() {
        for key in &intent.keys {
            match owners.get(key) {
                Some(&owner) if owner != idx => {
                    warn!(
                        target: "driftkv::crud",
                        ?operation,
                        key = %key,
                        first = owner,
                        second = idx,
                        "Two records in one call share a key"
                    );
                    return Err(DriftError::BatchOperation {
                        operation,
                        chunk: idx / limit.max(1),
                        committed_chunks: 0,
                    });
                }
                Some(_) => {}
                None => {
                    owners.insert(key, idx);
                }
            }
        }
    }
    Ok(())
}

fn write_deleted(op: &mut dyn AtomicOperation, item: &WriteIntent) -> Result<()> {
    let previous = item
        .previous
        .as_ref()
        .ok_or_else(|| DriftError::Storage("delete without a previous version".to_string()))?;

    op.check(previous.primary.clone(), Some(previous.version));
    for key in &previous.keys {
        op.delete(key.clone());
    }
    Ok(())
}

/// CRUD operations over one table
pub struct CrudManager {
    table: String,
    schema: Arc<Schema>,
    codec: KeyCodec,
    store: Arc<dyn KvStore>,
    batch: BatchOperationManager,
    hooks: Arc<HookRegistry>,
    timestamps: bool,
    relations: Weak<RelationManager>,
}

impl std::fmt::Debug for CrudManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrudManager")
            .field("table", &self.table)
            .field("timestamps", &self.timestamps)
            .field("batch", &self.batch)
            .finish_non_exhaustive()
    }
}

impl CrudManager {
    /// Create a manager for `table`
    ///
    /// Schemas without a primary field get an optional string `id` primary.
    /// With timestamps on, optional `createdAt`/`updatedAt` fields are added.
    pub fn new(
        table: impl Into<String>,
        schema: Schema,
        store: Arc<dyn KvStore>,
        hooks: Arc<HookRegistry>,
        options: CrudOptions,
    ) -> Result<Self> {
        let table = table.into();
        if table.is_empty() {
            return Err(DriftError::SchemaConfiguration(
                "table name cannot be empty".to_string(),
            ));
        }

        let mut schema = schema.with_default_primary()?;
        if options.timestamps {
            schema = schema.with_timestamps()?;
        }

        debug!(
            target: "driftkv::crud",
            table = %table,
            fields = schema.fields().len(),
            timestamps = options.timestamps,
            "Table registered"
        );

        Ok(CrudManager {
            codec: KeyCodec::new(table.clone(), schema.clone()),
            schema: Arc::new(schema),
            batch: BatchOperationManager::new(store.clone(), options.operation_limit),
            store,
            hooks,
            timestamps: options.timestamps,
            relations: Weak::new(),
            table,
        })
    }

    /// Resolve `include` arguments through `relations`
    pub fn with_relations(mut self, relations: Weak<RelationManager>) -> Self {
        self.relations = relations;
        self
    }

    /// Table name, also the first part of every primary key
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Effective schema, including generated fields
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Key codec for this table's schema
    pub fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    /// Whether writes stamp `createdAt`/`updatedAt`
    pub fn timestamps(&self) -> bool {
        self.timestamps
    }

    pub(crate) fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    // =========================================================================
    // Hooks
    // =========================================================================

    async fn observe<T, Fut, A>(&self, action: QueryAction, affected: A, fut: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
        A: FnOnce(&T) -> usize,
    {
        self.hooks.emit(&CrudEvent::BeforeQuery {
            table: &self.table,
            action,
        });

        let result = fut.await;
        match &result {
            Ok(value) => self.hooks.emit(&CrudEvent::AfterQuery {
                table: &self.table,
                action,
                affected: affected(value),
            }),
            Err(error) => {
                debug!(target: "driftkv::crud", table = %self.table, %action, %error, "Query failed");
                self.hooks.emit(&CrudEvent::QueryFailed {
                    table: &self.table,
                    action,
                    error,
                });
            }
        }
        result
    }

    // =========================================================================
    // Read resolution
    // =========================================================================

    /// Key values bound by `expected` for `field`, or `None` if unusable
    fn bound_values(&self, field: &str, expected: &Value) -> Option<Vec<Value>> {
        let timestamp = self
            .schema
            .field(field)
            .is_some_and(|f| f.kind == FieldKind::Timestamp);

        let values: Vec<Value> = match expected {
            Value::Array(items) => items.clone(),
            other => vec![other.clone()],
        };
        values
            .into_iter()
            .map(|value| match value {
                Value::String(s) if timestamp => Timestamp::parse_rfc3339(&s).map(Value::Timestamp),
                other => Some(other),
            })
            .map(|value| value.filter(|v| KeyPart::try_from(v).is_ok()))
            .collect()
    }

    fn bound_by_role(&self, where_: &Record, role: KeyRole) -> Option<(String, Vec<Value>)> {
        self.schema
            .keyed_fields()
            .filter(|(_, r)| *r == role)
            .find_map(|(field, _)| {
                let expected = where_.get(field)?;
                self.bound_values(field, expected)
                    .map(|values| (field.to_string(), values))
            })
    }

    /// Choose how to fetch the candidates of `where_`
    pub fn plan(&self, where_: Option<&Record>) -> ReadPlan {
        let Some(where_) = where_ else {
            return ReadPlan::TableScan;
        };

        if let Some((_, values)) = self.bound_by_role(where_, KeyRole::Primary) {
            if let Ok(keys) = values
                .iter()
                .map(|v| self.codec.primary_key(v))
                .collect::<Result<Vec<_>>>()
            {
                return ReadPlan::PointReads(keys);
            }
        }
        if let Some((field, values)) = self.bound_by_role(where_, KeyRole::Unique) {
            if let Ok(keys) = values
                .iter()
                .map(|v| self.codec.unique_key(&field, v))
                .collect::<Result<Vec<_>>>()
            {
                return ReadPlan::PointReads(keys);
            }
        }
        if let Some((field, values)) = self.bound_by_role(where_, KeyRole::Index) {
            if let Ok(prefixes) = values
                .iter()
                .map(|v| self.codec.index_prefix(&field, v))
                .collect::<Result<Vec<_>>>()
            {
                return ReadPlan::IndexScan(prefixes);
            }
        }
        ReadPlan::TableScan
    }

    async fn scan(&self, prefixes: &[PhysicalKey]) -> Result<Vec<KvEntry>> {
        let mut entries = Vec::new();
        for prefix in prefixes {
            let mut listed: Vec<KvEntry> = self.store.list(prefix).try_collect().await?;
            entries.append(&mut listed);
        }
        Ok(entries)
    }

    fn dedup(&self, records: Vec<VersionedRecord>) -> Vec<VersionedRecord> {
        let Some(primary) = self.schema.primary_field() else {
            return records;
        };
        let mut seen = HashSet::new();
        records
            .into_iter()
            .filter(|record| {
                match record.value.get(&primary.name).map(KeyPart::try_from) {
                    Some(Ok(part)) => seen.insert(part),
                    _ => true,
                }
            })
            .collect()
    }

    /// Fetch and filter every record matching `where_`
    async fn fetch(&self, where_: Option<&Record>) -> Result<Vec<VersionedRecord>> {
        let plan = self.plan(where_);
        trace!(target: "driftkv::crud", table = %self.table, ?plan, "Resolving where clause");

        let entries: Vec<KvEntryMaybe> = match plan {
            ReadPlan::PointReads(keys) => self.batch.read_many(&keys).await?,
            ReadPlan::IndexScan(prefixes) => self
                .scan(&prefixes)
                .await?
                .into_iter()
                .map(KvEntryMaybe::from)
                .collect(),
            ReadPlan::TableScan => self
                .scan(&[self.codec.table_prefix()])
                .await?
                .into_iter()
                .map(KvEntryMaybe::from)
                .collect(),
        };
        Ok(self.dedup(filter_entries(entries, where_)))
    }

    fn require_where(where_: Option<&Record>) -> Result<&Record> {
        match where_ {
            Some(w) if !w.is_empty() => Ok(w),
            _ => Err(DriftError::InvalidQuery(
                "a non-empty where clause is required".to_string(),
            )),
        }
    }

    async fn find_many_inner(&self, args: &FindManyArgs) -> Result<Vec<VersionedRecord>> {
        let candidates = self.fetch(args.where_.as_ref()).await?;
        let primary = self.schema.primary_field().map(|f| f.name.as_str());
        let mut records = query::shape(candidates, args, primary);

        if !args.include.is_empty() {
            let relations = self.relations.upgrade().ok_or_else(|| {
                DriftError::InvalidQuery(format!(
                    "table '{}' has no relations to include",
                    self.table
                ))
            })?;
            records = relations
                .resolve(&self.table, records, &args.include)
                .await?;
        }
        Ok(query::select_fields(records, args))
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Every record matching `args`, shaped by order, pagination and select
    pub async fn find_many(&self, args: FindManyArgs) -> Result<Vec<VersionedRecord>> {
        self.observe(QueryAction::FindMany, Vec::len, self.find_many_inner(&args))
            .await
    }

    /// First record matching a non-empty `where`, or `NotFound`
    pub async fn find_first(&self, args: FindManyArgs) -> Result<VersionedRecord> {
        self.observe(QueryAction::FindFirst, |_| 1, async {
            Self::require_where(args.where_.as_ref())?;
            self.find_many_inner(&args)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| DriftError::not_found(&self.table))
        })
        .await
    }

    /// First record matching a non-empty `where`, if any
    pub async fn find_unique(&self, args: FindManyArgs) -> Result<Option<VersionedRecord>> {
        self.observe(
            QueryAction::FindUnique,
            |found: &Option<_>| usize::from(found.is_some()),
            async {
                Self::require_where(args.where_.as_ref())?;
                Ok(self.find_many_inner(&args).await?.into_iter().next())
            },
        )
        .await
    }

    /// Number of records matching `where_`
    pub async fn count(&self, where_: Option<Record>) -> Result<usize> {
        self.observe(QueryAction::Count, |n: &usize| *n, async {
            Ok(self.fetch(where_.as_ref()).await?.len())
        })
        .await
    }

    /// Every entry under the table prefix, unfiltered
    pub async fn list_table(&self) -> Result<Vec<KvEntry>> {
        self.scan(&[self.codec.table_prefix()]).await
    }

    /// Every entry under each prefix, unfiltered, in prefix order
    ///
    /// With no prefixes, scans every unique and index prefix of the table.
    pub async fn list_table_with_index_prefixes(
        &self,
        prefixes: &[PhysicalKey],
    ) -> Result<Vec<KvEntry>> {
        if prefixes.is_empty() {
            self.scan(&self.codec.secondary_prefixes()).await
        } else {
            self.scan(prefixes).await
        }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    fn primary_key_of(&self, record: &Record) -> Result<PhysicalKey> {
        let primary = self.schema.primary_field().ok_or_else(|| {
            DriftError::SchemaConfiguration(format!("table '{}' has no primary field", self.table))
        })?;
        match record.get(&primary.name) {
            Some(value) if !value.is_null() => self.codec.primary_key(value),
            _ => Err(DriftError::validation(
                &primary.name,
                "primary field is missing",
            )),
        }
    }

    fn record_keys(&self, record: &Record) -> Result<Vec<PhysicalKey>> {
        Ok(self
            .codec
            .record_keys(record)?
            .into_iter()
            .map(|tagged| tagged.key)
            .collect())
    }

    fn prepare_create(&self, mut data: Record) -> Result<WriteIntent> {
        if let Some(primary) = self.schema.primary_field() {
            let absent = data.get(&primary.name).map_or(true, Value::is_null);
            if absent && matches!(primary.kind, FieldKind::String | FieldKind::Any) {
                data.insert(
                    primary.name.clone(),
                    Value::String(Uuid::new_v4().to_string()),
                );
            }
        }

        let record = self.schema.parse(data)?;
        self.primary_key_of(&record)?;
        let keys = self.record_keys(&record)?;
        Ok(WriteIntent {
            record,
            keys,
            previous: None,
        })
    }

    fn previous_of(&self, existing: &VersionedRecord) -> Result<Previous> {
        Ok(Previous {
            primary: self.primary_key_of(&existing.value)?,
            keys: self.record_keys(&existing.value)?,
            version: existing.version,
        })
    }

    fn prepare_update(&self, existing: VersionedRecord, data: &Record) -> Result<WriteIntent> {
        let previous = self.previous_of(&existing)?;

        let mut merged = existing.value;
        merged.extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));

        let record = self.schema.parse(merged)?;
        self.primary_key_of(&record)?;
        let keys = self.record_keys(&record)?;
        Ok(WriteIntent {
            record,
            keys,
            previous: Some(previous),
        })
    }

    fn prepare_delete(&self, existing: VersionedRecord) -> Result<WriteIntent> {
        let previous = self.previous_of(&existing)?;
        Ok(WriteIntent {
            record: existing.value,
            keys: Vec::new(),
            previous: Some(previous),
        })
    }

    fn options(&self) -> BatchOptions {
        BatchOptions {
            timestamps: self.timestamps,
        }
    }

    async fn create_inner(&self, data: Vec<Record>) -> Result<Vec<VersionedRecord>> {
        let intents = data
            .into_iter()
            .map(|record| self.prepare_create(record))
            .collect::<Result<Vec<_>>>()?;
        reject_key_collisions(&intents, OperationKind::Create, self.batch.limit())?;

        self.batch
            .execute(intents, write_created, OperationKind::Create, self.options())
            .await
    }

    /// Create one record
    ///
    /// An absent string primary is filled with a generated UUID. Fails with
    /// `BatchOperation` if any of the record's keys already exists.
    pub async fn create(&self, data: Record) -> Result<VersionedRecord> {
        self.observe(QueryAction::Create, |_| 1, async {
            self.create_inner(vec![data])
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| DriftError::Storage("create returned no record".to_string()))
        })
        .await
    }

    /// Create several records, `operation_limit` per atomic operation
    ///
    /// Validation runs for every record before the first write, and two
    /// records claiming the same primary or unique value fail the call
    /// before anything is committed. When a later chunk is rejected,
    /// earlier chunks stay committed.
    pub async fn create_many(&self, data: Vec<Record>) -> Result<Vec<VersionedRecord>> {
        self.observe(QueryAction::CreateMany, Vec::len, self.create_inner(data))
            .await
    }

    async fn update_inner(
        &self,
        existing: Vec<VersionedRecord>,
        data: &Record,
    ) -> Result<Vec<VersionedRecord>> {
        let intents = existing
            .into_iter()
            .map(|record| self.prepare_update(record, data))
            .collect::<Result<Vec<_>>>()?;
        reject_key_collisions(&intents, OperationKind::Update, self.batch.limit())?;

        self.batch
            .execute(intents, write_updated, OperationKind::Update, self.options())
            .await
    }

    /// Merge `data` over the first record matching `where_`
    ///
    /// Fails with `NotFound` when nothing matches, and with `BatchOperation`
    /// when the record changed since it was read.
    pub async fn update(&self, where_: Record, data: Record) -> Result<VersionedRecord> {
        self.observe(QueryAction::Update, |_| 1, async {
            let existing = self
                .fetch(Some(&where_))
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| DriftError::not_found(&self.table))?;

            self.update_inner(vec![existing], &data)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| DriftError::not_found(&self.table))
        })
        .await
    }

    /// Merge `data` over every record matching `where_`
    ///
    /// An empty `where_` matches every record.
    pub async fn update_many(
        &self,
        where_: Record,
        data: Record,
    ) -> Result<Vec<VersionedRecord>> {
        self.observe(QueryAction::UpdateMany, Vec::len, async {
            let existing = self.fetch(Some(&where_)).await?;
            self.update_inner(existing, &data).await
        })
        .await
    }

    async fn delete_inner(&self, existing: Vec<VersionedRecord>) -> Result<Vec<VersionedRecord>> {
        let intents = existing
            .into_iter()
            .map(|record| self.prepare_delete(record))
            .collect::<Result<Vec<_>>>()?;

        self.batch
            .execute(
                intents,
                write_deleted,
                OperationKind::Delete,
                BatchOptions::default(),
            )
            .await
    }

    /// Delete the first record matching `where_`, returning it
    pub async fn delete(&self, where_: Record) -> Result<VersionedRecord> {
        self.observe(QueryAction::Delete, |_| 1, async {
            let existing = self
                .fetch(Some(&where_))
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| DriftError::not_found(&self.table))?;

            self.delete_inner(vec![existing])
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| DriftError::not_found(&self.table))
        })
        .await
    }

    /// Delete every record matching `where_`, returning them
    ///
    /// An empty `where_` matches every record.
    pub async fn delete_many(&self, where_: Record) -> Result<Vec<VersionedRecord>> {
        self.observe(QueryAction::DeleteMany, Vec::len, async {
            let existing = self.fetch(Some(&where_)).await?;
            self.delete_inner(existing).await
        })
        .await
    }
}
