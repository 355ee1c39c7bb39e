//! Backend record shapes.
//!
//! Both backends store flat maps of field name to [`FieldValue`]. Field maps
//! are ordered so that diffs, documents and query output are deterministic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::key::{DocumentId, EntityKey};
use super::value::FieldValue;

/// Ordered map of field name to value.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// A record as held by the primary store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryRecord {
    /// The record key.
    pub key: EntityKey,
    /// Stored fields, encoded for the primary store.
    pub fields: FieldMap,
}

impl PrimaryRecord {
    /// Creates a record.
    pub fn new(key: EntityKey, fields: FieldMap) -> Self {
        Self { key, fields }
    }

    /// Returns a stored field.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}

/// A document as held by the search index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchDocument {
    /// Document id; `None` until the index assigns one.
    pub id: Option<DocumentId>,
    /// Indexed fields, encoded for the search index.
    pub fields: FieldMap,
}

impl SearchDocument {
    /// Creates a document that has not been written yet.
    pub fn new(fields: FieldMap) -> Self {
        Self { id: None, fields }
    }

    /// Creates a document with a known id.
    pub fn with_id(id: DocumentId, fields: FieldMap) -> Self {
        Self {
            id: Some(id),
            fields,
        }
    }

    /// Returns an indexed field.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}

/// Returns the names of pending fields that are missing from, or differ in,
/// the persisted map. A pending null matches a missing field.
pub fn diff_fields(pending: &FieldMap, persisted: &FieldMap) -> Vec<String> {
    pending
        .iter()
        .filter(|(name, value)| match persisted.get(*name) {
            Some(stored) => stored != *value,
            None => !value.is_null(),
        })
        .map(|(name, _)| name.clone())
        .collect()
}

/// Overlays pending fields on the persisted ones, keeping persisted fields
/// that are not part of the pending map.
pub fn merge_fields(persisted: &FieldMap, pending: &FieldMap) -> FieldMap {
    let mut merged = persisted.clone();
    for (name, value) in pending {
        merged.insert(name.clone(), value.clone());
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, FieldValue)]) -> FieldMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_diff_detects_missing_and_changed() {
        let persisted = map(&[("a", FieldValue::Integer(1)), ("b", "x".into())]);
        let pending = map(&[
            ("a", FieldValue::Integer(1)),
            ("b", "y".into()),
            ("c", FieldValue::Bool(true)),
        ]);
        assert_eq!(diff_fields(&pending, &persisted), vec!["b", "c"]);
    }

    #[test]
    fn test_diff_ignores_extra_persisted_fields() {
        let persisted = map(&[("a", FieldValue::Integer(1)), ("legacy", "keep".into())]);
        let pending = map(&[("a", FieldValue::Integer(1))]);
        assert!(diff_fields(&pending, &persisted).is_empty());
    }

    #[test]
    fn test_diff_treats_null_as_absent() {
        let persisted = map(&[("a", FieldValue::Integer(1))]);
        let pending = map(&[("a", FieldValue::Integer(1)), ("b", FieldValue::Null)]);
        assert!(diff_fields(&pending, &persisted).is_empty());

        let pending = map(&[("a", FieldValue::Null)]);
        assert_eq!(diff_fields(&pending, &persisted), vec!["a"]);
    }

    #[test]
    fn test_merge_keeps_unrelated_fields() {
        let persisted = map(&[("a", FieldValue::Integer(1)), ("legacy", "keep".into())]);
        let pending = map(&[("a", FieldValue::Integer(2))]);
        let merged = merge_fields(&persisted, &pending);
        assert_eq!(merged.get("a"), Some(&FieldValue::Integer(2)));
        assert_eq!(merged.get("legacy"), Some(&FieldValue::Text("keep".into())));
    }
}
