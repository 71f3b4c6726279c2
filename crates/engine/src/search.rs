//! SearchManager: in-memory where-clause matching
//!
//! Candidates are fetched by the caller; nothing here touches the store.
//! Every field of a `where` clause must match (implicit AND):
//!
//! - a timestamp on either side compares by instant, with RFC 3339 strings
//!   accepted on the expected side
//! - an array on the expected side matches when the actual value is a
//!   member ("in" semantics)
//! - anything else uses strict equality
//!
//! Candidates with no value or no version are tombstones and never pass.

use driftkv_core::{KvEntryMaybe, Record, Timestamp, Value, VersionedRecord};

/// Field of a `where` clause that refers to the version token, not the record
pub const VERSION_FIELD: &str = "versionstamp";

/// Instant carried by a timestamp or an RFC 3339 string
fn as_instant(value: &Value) -> Option<Timestamp> {
    match value {
        Value::Timestamp(ts) => Some(*ts),
        Value::String(s) => Timestamp::parse_rfc3339(s),
        _ => None,
    }
}

/// Match one field value against its expected value
pub fn is_matching_value(actual: Option<&Value>, expected: &Value) -> bool {
    let Some(actual) = actual else {
        return false;
    };

    if actual.is_timestamp() || expected.is_timestamp() {
        return match (as_instant(actual), as_instant(expected)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        };
    }

    match expected {
        Value::Array(options) if !matches!(actual, Value::Array(_)) => {
            options.iter().any(|option| is_matching_value(Some(actual), option))
        }
        _ => actual == expected,
    }
}

/// True when `record` satisfies every field of `where_`
pub fn matches_where(record: &Record, where_: &Record) -> bool {
    where_
        .iter()
        .filter(|(field, _)| field.as_str() != VERSION_FIELD)
        .all(|(field, expected)| is_matching_value(record.get(field), expected))
}

/// Drop tombstones and non-matching candidates
///
/// Values that are not objects cannot be records and are dropped as well.
/// Input order is kept.
pub fn filter_entries(candidates: Vec<KvEntryMaybe>, where_: Option<&Record>) -> Vec<VersionedRecord> {
    candidates
        .into_iter()
        .filter_map(KvEntryMaybe::into_versioned)
        .filter_map(|versioned| {
            let version = versioned.version;
            versioned
                .into_value()
                .into_object()
                .map(|record| VersionedRecord::new(record, version))
        })
        .filter(|record| where_.map_or(true, |w| matches_where(&record.value, w)))
        .collect()
}
