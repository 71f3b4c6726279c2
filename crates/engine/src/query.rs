//! Query arguments and the post-filter pipeline
//!
//! After candidates are filtered, `findMany` shapes them in a fixed order:
//!
//! 1. `distinct`: keep the first record per distinct tuple of fields
//! 2. `order_by`: stable multi-key sort
//! 3. `cursor`: drop everything up to and including the cursor record
//! 4. `skip`, then `take`
//! 5. `include`: resolve relations (done by the caller, needs I/O)
//! 6. `select`: project named fields; included relations always survive

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use driftkv_core::{Record, Value, VersionedRecord};

/// Sort direction of one `order_by` field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Ascending
    #[default]
    Asc,
    /// Descending
    Desc,
}

/// Arguments of `find_many` and friends
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindManyArgs {
    /// Field equality constraints
    pub where_: Option<Record>,
    /// Sort keys, first one wins, later ones break ties
    pub order_by: Vec<(String, SortOrder)>,
    /// Records dropped from the front after sorting
    pub skip: Option<usize>,
    /// Maximum records returned
    pub take: Option<usize>,
    /// Fields kept in each result
    pub select: Option<Vec<String>>,
    /// Fields whose value tuple must be distinct
    pub distinct: Option<Vec<String>>,
    /// Primary value to start after
    pub cursor: Option<Value>,
    /// Relations to resolve, by relation name
    pub include: BTreeMap<String, FindManyArgs>,
}

impl FindManyArgs {
    /// No constraints
    pub fn new() -> Self {
        Self::default()
    }

    /// Constrain by a `where` clause
    pub fn where_(mut self, where_: Record) -> Self {
        self.where_ = Some(where_);
        self
    }

    /// Append a sort key
    pub fn order_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.order_by.push((field.into(), order));
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn take(mut self, take: usize) -> Self {
        self.take = Some(take);
        self
    }

    pub fn select<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.select = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn distinct<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.distinct = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn cursor(mut self, primary: impl Into<Value>) -> Self {
        self.cursor = Some(primary.into());
        self
    }

    /// Resolve relation `name` with its own nested arguments
    pub fn include(mut self, name: impl Into<String>, args: FindManyArgs) -> Self {
        self.include.insert(name.into(), args);
        self
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Int(_) | Value::Float(_) => 2,
        Value::String(_) => 3,
        Value::Bytes(_) => 4,
        Value::Timestamp(_) => 5,
        Value::Array(_) => 6,
        Value::Object(_) => 7,
    }
}

/// Total order over present values: type rank first, then by value
///
/// Numbers compare across `Int`/`Float` with `f64::total_cmp`, so NaN has a
/// fixed place. Objects of the same rank tie.
fn compare_present(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Float(x), Value::Float(y)) => x.total_cmp(y),
        (Value::Int(x), Value::Float(y)) => (*x as f64).total_cmp(y),
        (Value::Float(x), Value::Int(y)) => x.total_cmp(&(*y as f64)),
        (Value::Bytes(x), Value::Bytes(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y)
            .map(|(x, y)| compare_present(x, y))
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        _ => match type_rank(a).cmp(&type_rank(b)) {
            Ordering::Equal => a.compare(b).unwrap_or(Ordering::Equal),
            unequal => unequal,
        },
    }
}

fn compare_field(a: Option<&Value>, b: Option<&Value>, order: SortOrder) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (Some(a), Some(b)) => match order {
            SortOrder::Asc => compare_present(a, b),
            SortOrder::Desc => compare_present(a, b).reverse(),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Stable multi-key sort
///
/// Missing and null values sort after every present value in both
/// directions. Present values of different types order by type (booleans,
/// numbers, strings, bytes, timestamps, arrays, objects) before value.
pub fn sort_records(records: &mut [VersionedRecord], order_by: &[(String, SortOrder)]) {
    if order_by.is_empty() {
        return;
    }
    records.sort_by(|a, b| {
        order_by
            .iter()
            .map(|(field, order)| compare_field(a.value.get(field), b.value.get(field), *order))
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}

/// Keep the first record per distinct tuple of `fields`
pub fn distinct_by(records: Vec<VersionedRecord>, fields: &[String]) -> Vec<VersionedRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| {
            let tuple: Vec<serde_json::Value> = fields
                .iter()
                .map(|f| record.value.get(f).cloned().map_or(serde_json::Value::Null, Into::into))
                .collect();
            seen.insert(serde_json::Value::Array(tuple).to_string())
        })
        .collect()
}

/// Drop records up to and including the one whose `primary` equals `cursor`
///
/// An unknown cursor leaves the records untouched.
pub fn apply_cursor(
    records: Vec<VersionedRecord>,
    primary: &str,
    cursor: &Value,
) -> Vec<VersionedRecord> {
    match records
        .iter()
        .position(|r| r.value.get(primary) == Some(cursor))
    {
        Some(pos) => records.into_iter().skip(pos + 1).collect(),
        None => records,
    }
}

/// Apply `skip`, then `take`
pub fn paginate(
    records: Vec<VersionedRecord>,
    skip: Option<usize>,
    take: Option<usize>,
) -> Vec<VersionedRecord> {
    records
        .into_iter()
        .skip(skip.unwrap_or(0))
        .take(take.unwrap_or(usize::MAX))
        .collect()
}

/// Keep only `select` fields plus `keep`; absent fields stay absent
pub fn project(record: Record, select: &[String], keep: &[&str]) -> Record {
    record
        .into_iter()
        .filter(|(field, _)| select.contains(field) || keep.contains(&field.as_str()))
        .collect()
}

/// Steps 1 to 4 of the pipeline
pub fn shape(
    mut records: Vec<VersionedRecord>,
    args: &FindManyArgs,
    primary: Option<&str>,
) -> Vec<VersionedRecord> {
    if let Some(fields) = &args.distinct {
        records = distinct_by(records, fields);
    }
    sort_records(&mut records, &args.order_by);
    if let (Some(cursor), Some(primary)) = (&args.cursor, primary) {
        records = apply_cursor(records, primary, cursor);
    }
    paginate(records, args.skip, args.take)
}

/// Step 6 of the pipeline
pub fn select_fields(records: Vec<VersionedRecord>, args: &FindManyArgs) -> Vec<VersionedRecord> {
    let Some(select) = &args.select else {
        return records;
    };
    let keep: Vec<&str> = args.include.keys().map(String::as_str).collect();
    records
        .into_iter()
        .map(|r| r.map(|value| project(value, select, &keep)))
        .collect()
}
