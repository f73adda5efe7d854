//! Render-agnostic report trees and the deep merge that combines them.
//!
//! Every analyzer can hand back its result as a [`Report`]: a map from entity
//! name to a tree of strings, numbers, booleans, sequences and nested maps.
//! Independent views of the same entities (say, an `info` and a `config` view
//! of a topic) are combined with [`merge_reports`] without either view knowing
//! about the other.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value, json};

use crate::error::Error;

/// Rendered in place of an empty, null or unavailable value.
pub const PLACEHOLDER: &str = "-";

/// Entity-keyed tree.
pub type Report = Map<String, Value>;

/// Deep merge `reports` from first to last.
///
/// - maps present on both sides are merged key by key
/// - any other value from a later report replaces the earlier one, sequences
///   included (they are not concatenated)
/// - no key present in any input is dropped
///
/// The merge is associative for reports that agree on which paths are maps.
pub fn merge_reports<I>(reports: I) -> Report
where
    I: IntoIterator<Item = Report>,
{
    reports.into_iter().fold(Report::new(), |mut merged, report| {
        merge_into(&mut merged, report);
        merged
    })
}

/// Deep merge `source` into `target`; `source` wins on leaf collisions.
pub fn merge_into(target: &mut Report, source: Report) {
    for (key, incoming) in source {
        match target.get_mut(&key) {
            Some(Value::Object(existing)) if incoming.is_object() => {
                if let Value::Object(incoming) = incoming {
                    merge_into(existing, incoming);
                }
            }
            _ => {
                target.insert(key, incoming);
            }
        }
    }
}

/// The marker embedded in place of an entity whose request failed.
pub fn error_marker(error: &Error) -> Value {
    json!({ "error": error.to_string() })
}

/// Turn per-entity outcomes into a report, embedding failures as [`error_marker`]s.
pub fn to_report<K, T>(entries: &BTreeMap<K, Result<T, Error>>) -> Report
where
    K: ToString,
    T: Serialize,
{
    entries
        .iter()
        .map(|(key, outcome)| {
            let value = match outcome {
                Ok(v) => to_value(v),
                Err(e) => error_marker(e),
            };
            (key.to_string(), value)
        })
        .collect()
}

/// Serialize `value`, embedding the serializer error instead of failing.
pub(crate) fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| json!({ "error": e.to_string() }))
}

/// Serialize `None` as [`PLACEHOLDER`].
pub(crate) fn or_placeholder<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
where
    T: Serialize,
    S: Serializer,
{
    match value {
        Some(v) => v.serialize(serializer),
        None => serializer.serialize_str(PLACEHOLDER),
    }
}
