//! RelationManager: foreign-key relations between tables
//!
//! A relation on table `A` named `r` links `A.local_field` to
//! `target.foreign_field`. Resolving it for a parent record runs a nested
//! `find_many` on the target with `where = { foreign_field: parent[local_field] }`
//! merged over the include's own arguments, then stores the result in the
//! parent under `r`:
//!
//! - `OneToOne`: the first match as an object, or `Null`
//! - `OneToMany`: every match as an array
//!
//! The manager also owns the table registry, so it holds the only strong
//! references to each `CrudManager`; managers point back with a `Weak`.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use tracing::trace;

use driftkv_core::{DriftError, Record, Result, Value, VersionedRecord};

use crate::crud::CrudManager;
use crate::query::FindManyArgs;

/// Cardinality of a relation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// At most one target record
    OneToOne,
    /// Any number of target records
    OneToMany,
}

/// A declared relation from one table to another
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    /// Field the resolved value is stored under
    pub name: String,
    pub kind: RelationKind,
    /// Target table
    pub target: String,
    /// Field of the parent record
    pub local_field: String,
    /// Field of the target record matched against `local_field`
    pub foreign_field: String,
}

impl Relation {
    /// Include resolves to the target record or `null`
    pub fn one_to_one(
        name: impl Into<String>,
        target: impl Into<String>,
        local_field: impl Into<String>,
        foreign_field: impl Into<String>,
    ) -> Self {
        Relation {
            name: name.into(),
            kind: RelationKind::OneToOne,
            target: target.into(),
            local_field: local_field.into(),
            foreign_field: foreign_field.into(),
        }
    }

    /// Include resolves to an array of target records, possibly empty
    pub fn one_to_many(
        name: impl Into<String>,
        target: impl Into<String>,
        local_field: impl Into<String>,
        foreign_field: impl Into<String>,
    ) -> Self {
        Relation {
            kind: RelationKind::OneToMany,
            ..Self::one_to_one(name, target, local_field, foreign_field)
        }
    }
}

/// Table registry plus declared relations
#[derive(Debug, Default)]
pub struct RelationManager {
    tables: RwLock<BTreeMap<String, Arc<CrudManager>>>,
    relations: RwLock<BTreeMap<String, BTreeMap<String, Relation>>>,
}

impl RelationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table. Fails if the name is taken.
    pub fn add_table(&self, crud: Arc<CrudManager>) -> Result<()> {
        let mut tables = self.tables.write();
        if tables.contains_key(crud.table()) {
            return Err(DriftError::SchemaConfiguration(format!(
                "table '{}' is already registered",
                crud.table()
            )));
        }
        tables.insert(crud.table().to_string(), crud);
        Ok(())
    }

    /// Look up a registered table
    pub fn table(&self, name: &str) -> Option<Arc<CrudManager>> {
        self.tables.read().get(name).cloned()
    }

    /// Names of registered tables, sorted
    pub fn table_names(&self) -> Vec<String> {
        self.tables.read().keys().cloned().collect()
    }

    /// Declare a relation on `table`
    ///
    /// Both tables must be registered and both fields must exist in their
    /// schemas. A relation of the same name on `table` is replaced.
    pub fn relate(&self, table: &str, relation: Relation) -> Result<()> {
        let source = self.table(table).ok_or_else(|| unknown_table(table))?;
        let target = self
            .table(&relation.target)
            .ok_or_else(|| unknown_table(&relation.target))?;

        if source.schema().field(&relation.local_field).is_none() {
            return Err(DriftError::SchemaConfiguration(format!(
                "relation '{}' refers to unknown field '{}.{}'",
                relation.name, table, relation.local_field
            )));
        }
        if target.schema().field(&relation.foreign_field).is_none() {
            return Err(DriftError::SchemaConfiguration(format!(
                "relation '{}' refers to unknown field '{}.{}'",
                relation.name, relation.target, relation.foreign_field
            )));
        }
        if source.schema().field(&relation.name).is_some() {
            return Err(DriftError::SchemaConfiguration(format!(
                "relation '{}' shadows a field of '{}'",
                relation.name, table
            )));
        }

        self.relations
            .write()
            .entry(table.to_string())
            .or_default()
            .insert(relation.name.clone(), relation);
        Ok(())
    }

    /// Relations declared on `table`
    pub fn relations_of(&self, table: &str) -> Vec<Relation> {
        self.relations
            .read()
            .get(table)
            .map(|r| r.values().cloned().collect())
            .unwrap_or_default()
    }

    fn relation(&self, table: &str, name: &str) -> Result<Relation> {
        self.relations
            .read()
            .get(table)
            .and_then(|r| r.get(name))
            .cloned()
            .ok_or_else(|| {
                DriftError::InvalidQuery(format!(
                    "relation '{}' is not declared on table '{}'",
                    name, table
                ))
            })
    }

    /// Resolve every relation in `include` for every record
    pub fn resolve<'a>(
        &'a self,
        table: &'a str,
        mut records: Vec<VersionedRecord>,
        include: &'a BTreeMap<String, FindManyArgs>,
    ) -> BoxFuture<'a, Result<Vec<VersionedRecord>>> {
        async move {
            for (name, args) in include {
                let relation = self.relation(table, name)?;
                let target = self
                    .table(&relation.target)
                    .ok_or_else(|| unknown_table(&relation.target))?;

                trace!(
                    target: "driftkv::relation",
                    table,
                    relation = %name,
                    parents = records.len(),
                    "Resolving relation"
                );

                for record in records.iter_mut() {
                    let resolved = self
                        .resolve_one(&target, &relation, &record.value, args)
                        .await?;
                    record.value.insert(relation.name.clone(), resolved);
                }
            }
            Ok(records)
        }
        .boxed()
    }

    async fn resolve_one(
        &self,
        target: &CrudManager,
        relation: &Relation,
        parent: &Record,
        args: &FindManyArgs,
    ) -> Result<Value> {
        let local = match parent.get(&relation.local_field) {
            Some(value) if !value.is_null() => value.clone(),
            _ => return Ok(empty(relation.kind)),
        };

        let mut nested = args.clone();
        let mut where_ = nested.where_.take().unwrap_or_default();
        where_.insert(relation.foreign_field.clone(), local);
        nested.where_ = Some(where_);
        if relation.kind == RelationKind::OneToOne {
            nested.take = Some(1);
        }

        let found = target.find_many(nested).await?;
        Ok(match relation.kind {
            RelationKind::OneToOne => found
                .into_iter()
                .next()
                .map_or(Value::Null, |r| Value::Object(r.value)),
            RelationKind::OneToMany => {
                Value::Array(found.into_iter().map(|r| Value::Object(r.value)).collect())
            }
        })
    }
}

fn empty(kind: RelationKind) -> Value {
    match kind {
        RelationKind::OneToOne => Value::Null,
        RelationKind::OneToMany => Value::Array(Vec::new()),
    }
}

fn unknown_table(name: &str) -> DriftError {
    DriftError::SchemaConfiguration(format!("table '{}' is not registered", name))
}
