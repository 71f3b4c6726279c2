//! KeyCodec: record + role metadata to physical keys
//!
//! Key derivation runs in two steps:
//!
//! 1. [`derive_access_keys`] walks the schema in declaration order and emits
//!    one [`AccessKey`] per role-bearing field present in the record.
//! 2. [`access_keys_to_physical_keys`] expands each access key into one or
//!    more physical keys. An array value expands to one key per element,
//!    which is how multi-value index fields work.
//!
//! Physical key forms:
//!
//! | Role | Key |
//! |------|-----|
//! | Primary | `[table, value]` |
//! | Unique | `[table_by_unique_field, value]` |
//! | Index | `[table_by_index_field, value, primary]` |
//!
//! Identical (table, schema, record) input always yields the same keys in
//! the same order; the keys double as index structures other readers rely on.

use driftkv_core::{DriftError, KeyPart, PhysicalKey, Record, Result, Value};

use crate::schema::{KeyRole, Schema};

/// Suffix appended to the table name for a unique or index key
///
/// Returns `None` for `Primary`, which uses the bare table name.
pub fn role_suffix(role: KeyRole, field: &str) -> Option<String> {
    match role {
        KeyRole::Primary => None,
        KeyRole::Unique | KeyRole::Index => Some(format!("_by_{}_{}", role.as_str(), field)),
    }
}

/// Role-tagged value derived from one field of a record
#[derive(Debug, Clone, PartialEq)]
pub struct AccessKey {
    /// Source field
    pub field: String,
    /// Role of the field
    pub role: KeyRole,
    /// Table-name suffix (`None` for primary)
    pub suffix: Option<String>,
    /// Field value
    pub value: Value,
}

/// A physical key tagged with the role that produced it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaggedKey {
    /// Role of the source field
    pub role: KeyRole,
    /// Table-name suffix (`None` for primary)
    pub suffix: Option<String>,
    /// Physical key
    pub key: PhysicalKey,
}

/// Emit one access key per role-bearing field present in `record`
///
/// Fields without a role, and fields absent or null in the record, are
/// skipped. Fails if more than one primary access key results.
pub fn derive_access_keys(schema: &Schema, record: &Record) -> Result<Vec<AccessKey>> {
    let keys: Vec<AccessKey> = schema
        .keyed_fields()
        .filter_map(|(field, role)| {
            record
                .get(field)
                .filter(|v| !v.is_null())
                .map(|value| AccessKey {
                    field: field.to_string(),
                    role,
                    suffix: role_suffix(role, field),
                    value: value.clone(),
                })
        })
        .collect();

    let primaries = keys.iter().filter(|k| k.role == KeyRole::Primary).count();
    if primaries > 1 {
        return Err(DriftError::SchemaConfiguration(format!(
            "only one primary field is allowed, found {}",
            primaries
        )));
    }
    Ok(keys)
}

/// Expand a value into key parts, one per array element
fn key_parts(value: &Value) -> Result<Vec<KeyPart>> {
    match value {
        Value::Array(items) => items.iter().map(KeyPart::try_from).collect(),
        other => Ok(vec![KeyPart::try_from(other)?]),
    }
}

/// Expand access keys into physical keys
///
/// The outer vector is aligned with `access_keys`. Index keys need the
/// primary access key from the same list and fail without it.
pub fn access_keys_to_physical_keys(
    table: &str,
    access_keys: &[AccessKey],
) -> Result<Vec<Vec<TaggedKey>>> {
    let primary = access_keys.iter().find(|k| k.role == KeyRole::Primary);

    access_keys
        .iter()
        .map(|access| {
            let values = key_parts(&access.value)?;
            let tag = |key: PhysicalKey| TaggedKey {
                role: access.role,
                suffix: access.suffix.clone(),
                key,
            };

            match access.role {
                KeyRole::Primary => Ok(values
                    .into_iter()
                    .map(|v| tag(PhysicalKey::new(vec![table.into(), v])))
                    .collect()),
                KeyRole::Unique => {
                    let name = suffixed(table, access);
                    Ok(values
                        .into_iter()
                        .map(|v| tag(PhysicalKey::new(vec![name.clone().into(), v])))
                        .collect())
                }
                KeyRole::Index => {
                    let primary = primary.ok_or_else(|| {
                        DriftError::SchemaConfiguration(format!(
                            "index field '{}' requires a primary field",
                            access.field
                        ))
                    })?;
                    let primary_values = key_parts(&primary.value)?;
                    let name = suffixed(table, access);
                    Ok(values
                        .iter()
                        .flat_map(|v| {
                            primary_values.iter().map(move |p| (v.clone(), p.clone()))
                        })
                        .map(|(v, p)| tag(PhysicalKey::new(vec![name.clone().into(), v, p])))
                        .collect())
                }
            }
        })
        .collect()
}

fn suffixed(table: &str, access: &AccessKey) -> String {
    format!("{}{}", table, access.suffix.as_deref().unwrap_or_default())
}

/// Key layout of one table
///
/// Wraps the free functions above with the table name and schema bound.
#[derive(Debug, Clone)]
pub struct KeyCodec {
    table: String,
    schema: Schema,
}

impl KeyCodec {
    /// Create a codec for `table`
    pub fn new(table: impl Into<String>, schema: Schema) -> Self {
        KeyCodec {
            table: table.into(),
            schema,
        }
    }

    /// Table name
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Schema the codec derives keys from
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Every physical key of a record, flattened in derivation order
    pub fn record_keys(&self, record: &Record) -> Result<Vec<TaggedKey>> {
        let access = derive_access_keys(&self.schema, record)?;
        Ok(access_keys_to_physical_keys(&self.table, &access)?
            .into_iter()
            .flatten()
            .collect())
    }

    /// Prefix holding every primary key of the table
    pub fn table_prefix(&self) -> PhysicalKey {
        PhysicalKey::new(vec![self.table.as_str().into()])
    }

    /// Primary key for a primary value
    pub fn primary_key(&self, value: &Value) -> Result<PhysicalKey> {
        Ok(self.table_prefix().child(KeyPart::try_from(value)?))
    }

    /// Unique key for a unique field value
    pub fn unique_key(&self, field: &str, value: &Value) -> Result<PhysicalKey> {
        let name = self.suffixed_table(KeyRole::Unique, field);
        Ok(PhysicalKey::new(vec![name.into(), KeyPart::try_from(value)?]))
    }

    /// Prefix holding every index key for one index field value
    pub fn index_prefix(&self, field: &str, value: &Value) -> Result<PhysicalKey> {
        let name = self.suffixed_table(KeyRole::Index, field);
        Ok(PhysicalKey::new(vec![name.into(), KeyPart::try_from(value)?]))
    }

    /// Table-level prefixes of every unique and index field
    pub fn secondary_prefixes(&self) -> Vec<PhysicalKey> {
        self.schema
            .keyed_fields()
            .filter(|(_, role)| *role != KeyRole::Primary)
            .map(|(field, role)| PhysicalKey::new(vec![self.suffixed_table(role, field).into()]))
            .collect()
    }

    fn suffixed_table(&self, role: KeyRole, field: &str) -> String {
        format!(
            "{}{}",
            self.table,
            role_suffix(role, field).unwrap_or_default()
        )
    }
}
