//! Schema and key-role metadata
//!
//! A `Schema` is an ordered list of fields. Each field may carry one key role
//! (`Primary`, `Unique` or `Index`) declared as a typed tag when the schema
//! is built. Role consistency is checked once, in [`SchemaBuilder::build`]:
//!
//! - at most one `Primary` field
//! - an `Index` field requires a `Primary` field (index keys embed the
//!   primary value)
//! - field names are unique
//!
//! `Schema` also acts as the validation collaborator through [`Validator`].

use std::fmt;
use std::str::FromStr;

use driftkv_core::{DriftError, Limits, Record, Result, Timestamp, Value};

/// Field stamped with the creation instant when timestamps are enabled
pub const CREATED_AT: &str = "createdAt";
/// Field stamped with the last write instant when timestamps are enabled
pub const UPDATED_AT: &str = "updatedAt";
/// Primary field added to schemas that declare none
pub const DEFAULT_PRIMARY: &str = "id";

/// Key role of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyRole {
    /// Record identity, stored at `[table, value]`
    Primary,
    /// Unique secondary key, stored at `[table_by_unique_field, value]`
    Unique,
    /// Non-unique secondary key, stored at `[table_by_index_field, value, primary]`
    Index,
}

impl KeyRole {
    /// Lowercase role name
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyRole::Primary => "primary",
            KeyRole::Unique => "unique",
            KeyRole::Index => "index",
        }
    }
}

impl fmt::Display for KeyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyRole {
    type Err = DriftError;

    /// Import a legacy role annotation
    ///
    /// Accepts exactly one role name, optionally surrounded by whitespace or
    /// written as a one-element comma list. Lists naming more than one role
    /// are rejected.
    fn from_str(s: &str) -> Result<Self> {
        let names: Vec<&str> = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect();

        let role = match names.as_slice() {
            [single] => *single,
            [] => {
                return Err(DriftError::SchemaConfiguration(
                    "empty key role annotation".to_string(),
                ))
            }
            _ => {
                return Err(DriftError::SchemaConfiguration(format!(
                    "key role annotation '{}' names more than one role",
                    s
                )))
            }
        };

        match role.to_ascii_lowercase().as_str() {
            "primary" => Ok(KeyRole::Primary),
            "unique" => Ok(KeyRole::Unique),
            "index" => Ok(KeyRole::Index),
            other => Err(DriftError::SchemaConfiguration(format!(
                "unknown key role '{}'",
                other
            ))),
        }
    }
}

/// Accepted value type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// UTF-8 string
    String,
    /// Integer
    Int,
    /// Integer or float
    Number,
    /// Boolean
    Bool,
    /// Raw bytes
    Bytes,
    /// Instant; RFC 3339 strings are coerced
    Timestamp,
    /// Array of any values
    Array,
    /// Nested object
    Object,
    /// Anything but null
    Any,
}

impl FieldKind {
    /// Check `value` against this kind, coercing where allowed
    fn coerce(&self, field: &str, value: Value) -> Result<Value> {
        let ok = match (self, &value) {
            (FieldKind::Any, _) => true,
            (FieldKind::String, Value::String(_)) => true,
            (FieldKind::Int, Value::Int(_)) => true,
            (FieldKind::Number, Value::Int(_) | Value::Float(_)) => true,
            (FieldKind::Bool, Value::Bool(_)) => true,
            (FieldKind::Bytes, Value::Bytes(_)) => true,
            (FieldKind::Timestamp, Value::Timestamp(_)) => true,
            (FieldKind::Timestamp, Value::String(s)) => {
                return Timestamp::parse_rfc3339(s).map(Value::Timestamp).ok_or_else(|| {
                    DriftError::validation(field, format!("'{}' is not an RFC 3339 date-time", s))
                });
            }
            (FieldKind::Array, Value::Array(_)) => true,
            (FieldKind::Object, Value::Object(_)) => true,
            _ => false,
        };
        if ok {
            Ok(value)
        } else {
            Err(DriftError::validation(
                field,
                format!("expected {:?}, got {}", self, value.type_name()),
            ))
        }
    }
}

/// One field of a schema
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    /// Field name
    pub name: String,
    /// Accepted value type
    pub kind: FieldKind,
    /// Whether the field may be absent or null
    pub optional: bool,
    /// Key role, if any
    pub role: Option<KeyRole>,
}

impl FieldDef {
    /// A required field without a key role
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        FieldDef {
            name: name.into(),
            kind,
            optional: false,
            role: None,
        }
    }

    /// Mark the field optional
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Attach a key role
    pub fn role(mut self, role: KeyRole) -> Self {
        self.role = Some(role);
        self
    }
}

/// Validated, role-consistent list of fields
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    fields: Vec<FieldDef>,
    limits: Limits,
}

impl Schema {
    /// Start building a schema
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Fields in declaration order
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The primary field, if declared
    pub fn primary_field(&self) -> Option<&FieldDef> {
        self.fields
            .iter()
            .find(|f| f.role == Some(KeyRole::Primary))
    }

    /// Role-bearing fields in declaration order
    pub fn keyed_fields(&self) -> impl Iterator<Item = (&str, KeyRole)> {
        self.fields
            .iter()
            .filter_map(|f| f.role.map(|role| (f.name.as_str(), role)))
    }

    /// Role of a field, if it has one
    pub fn role_of(&self, name: &str) -> Option<KeyRole> {
        self.field(name).and_then(|f| f.role)
    }

    /// Copy of this schema with a primary field guaranteed
    ///
    /// Schemas without a primary get an optional string `id` primary,
    /// generated on create when absent.
    pub fn with_default_primary(self) -> Result<Schema> {
        if self.primary_field().is_some() {
            return Ok(self);
        }
        if self.field(DEFAULT_PRIMARY).is_some() {
            return Err(DriftError::SchemaConfiguration(format!(
                "field '{}' exists but is not primary, and no other primary is declared",
                DEFAULT_PRIMARY
            )));
        }
        let mut fields = vec![FieldDef::new(DEFAULT_PRIMARY, FieldKind::String)
            .optional()
            .role(KeyRole::Primary)];
        fields.extend(self.fields);
        SchemaBuilder {
            fields,
            limits: self.limits,
        }
        .build()
    }

    /// Copy of this schema with optional `createdAt`/`updatedAt` fields
    ///
    /// Existing timestamp fields are kept but may not carry a key role and
    /// must be of timestamp kind.
    pub fn with_timestamps(mut self) -> Result<Schema> {
        for name in [CREATED_AT, UPDATED_AT] {
            match self.field(name) {
                Some(field) if field.role.is_some() => {
                    return Err(DriftError::SchemaConfiguration(format!(
                        "timestamp field '{}' cannot carry a key role",
                        name
                    )))
                }
                Some(field) if field.kind != FieldKind::Timestamp => {
                    return Err(DriftError::SchemaConfiguration(format!(
                        "timestamp field '{}' must have timestamp kind",
                        name
                    )))
                }
                Some(_) => {}
                None => self
                    .fields
                    .push(FieldDef::new(name, FieldKind::Timestamp).optional()),
            }
        }
        Ok(self)
    }
}

/// Builder for [`Schema`]
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    fields: Vec<FieldDef>,
    limits: Limits,
}

impl SchemaBuilder {
    /// Add a fully specified field
    pub fn field_def(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Add a required field without a key role
    pub fn field(self, name: &str, kind: FieldKind) -> Self {
        self.field_def(FieldDef::new(name, kind))
    }

    /// Add an optional field without a key role
    pub fn optional(self, name: &str, kind: FieldKind) -> Self {
        self.field_def(FieldDef::new(name, kind).optional())
    }

    /// Add the primary field
    pub fn primary(self, name: &str, kind: FieldKind) -> Self {
        self.field_def(FieldDef::new(name, kind).role(KeyRole::Primary))
    }

    /// Add a unique field
    pub fn unique(self, name: &str, kind: FieldKind) -> Self {
        self.field_def(FieldDef::new(name, kind).role(KeyRole::Unique))
    }

    /// Add an indexed field
    pub fn index(self, name: &str, kind: FieldKind) -> Self {
        self.field_def(FieldDef::new(name, kind).role(KeyRole::Index))
    }

    /// Override value limits used during validation
    pub fn limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Validate role metadata and produce the schema
    pub fn build(self) -> Result<Schema> {
        for (i, field) in self.fields.iter().enumerate() {
            if field.name.is_empty() {
                return Err(DriftError::SchemaConfiguration(
                    "field names cannot be empty".to_string(),
                ));
            }
            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(DriftError::SchemaConfiguration(format!(
                    "field '{}' is declared twice",
                    field.name
                )));
            }
        }

        let primaries: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.role == Some(KeyRole::Primary))
            .map(|f| f.name.as_str())
            .collect();
        if primaries.len() > 1 {
            return Err(DriftError::SchemaConfiguration(format!(
                "only one primary field is allowed, found {}",
                primaries.join(", ")
            )));
        }

        if primaries.is_empty() {
            if let Some(index) = self
                .fields
                .iter()
                .find(|f| f.role == Some(KeyRole::Index))
            {
                return Err(DriftError::SchemaConfiguration(format!(
                    "index field '{}' requires a primary field",
                    index.name
                )));
            }
        }

        Ok(Schema {
            fields: self.fields,
            limits: self.limits,
        })
    }
}

/// Validation collaborator
pub trait Validator: Send + Sync {
    /// Validate a record, returning the normalised record
    fn parse(&self, input: Record) -> Result<Record>;
}

impl Validator for Schema {
    fn parse(&self, mut input: Record) -> Result<Record> {
        if let Some(unknown) = input.keys().find(|k| self.field(k).is_none()) {
            return Err(DriftError::validation(unknown.as_str(), "unknown field"));
        }

        let mut output = Record::new();
        for field in &self.fields {
            match input.remove(&field.name) {
                None | Some(Value::Null) if field.optional => {}
                None | Some(Value::Null) => {
                    return Err(DriftError::validation(&field.name, "required field is missing"));
                }
                Some(value) => {
                    self.limits.validate_value(&field.name, &value)?;
                    let value = field.kind.coerce(&field.name, value)?;
                    output.insert(field.name.clone(), value);
                }
            }
        }
        Ok(output)
    }
}
