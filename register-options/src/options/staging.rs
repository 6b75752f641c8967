//! In-memory overlay of option values pending persistence

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Where a staged value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Hydrated from the backend
    Stored,
    /// Sanitized schema default, never written
    Seed,
    /// Set by the caller
    Explicit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StagedValue {
    pub key: String,
    pub value: Value,
    pub origin: Origin,
    /// Changed locally since the last read or commit
    pub dirty: bool,
}

/// Key-ordered overlay; distinct from the last-read snapshot
#[derive(Debug, Clone, Default)]
pub struct StagingBuffer {
    values: BTreeMap<String, StagedValue>,
}

impl StagingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overlay hydrated from a stored record, nothing dirty
    pub fn from_stored(record: &Map<String, Value>) -> Self {
        let values = record
            .iter()
            .map(|(key, value)| {
                (
                    key.clone(),
                    StagedValue {
                        key: key.clone(),
                        value: value.clone(),
                        origin: Origin::Stored,
                        dirty: false,
                    },
                )
            })
            .collect();
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&StagedValue> {
        self.values.get(key)
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key).map(|staged| &staged.value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Seed a default unless the key already has a value. Returns whether it
    /// was seeded.
    pub fn seed(&mut self, key: &str, value: Value) -> bool {
        if self.values.contains_key(key) {
            return false;
        }
        self.values.insert(
            key.to_string(),
            StagedValue {
                key: key.to_string(),
                value,
                origin: Origin::Seed,
                dirty: false,
            },
        );
        true
    }

    /// Stage an explicit value, marking it dirty
    pub fn stage(&mut self, key: &str, value: Value) {
        self.values.insert(
            key.to_string(),
            StagedValue {
                key: key.to_string(),
                value,
                origin: Origin::Explicit,
                dirty: true,
            },
        );
    }

    pub fn remove(&mut self, key: &str) -> Option<StagedValue> {
        self.values.remove(key)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// The record as it would be persisted
    pub fn to_map(&self) -> Map<String, Value> {
        self.values
            .iter()
            .map(|(key, staged)| (key.clone(), staged.value.clone()))
            .collect()
    }

    pub fn dirty_keys(&self) -> Vec<String> {
        self.values
            .values()
            .filter(|staged| staged.dirty)
            .map(|staged| staged.key.clone())
            .collect()
    }

    pub fn mark_clean(&mut self) {
        for staged in self.values.values_mut() {
            staged.dirty = false;
        }
    }

    /// Take fresh backend values for every key not changed locally
    ///
    /// Non-dirty keys absent from `record` are dropped; callers reseed
    /// defaults afterwards.
    pub fn merge_stored(&mut self, record: &Map<String, Value>) {
        self.values
            .retain(|key, staged| staged.dirty || record.contains_key(key));

        for (key, value) in record {
            let fresh = StagedValue {
                key: key.clone(),
                value: value.clone(),
                origin: Origin::Stored,
                dirty: false,
            };
            match self.values.get(key) {
                Some(staged) if staged.dirty => {}
                _ => {
                    self.values.insert(key.clone(), fresh);
                }
            }
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    #[test]
    fn test_seed_does_not_override_stored() {
        let mut buffer = StagingBuffer::from_stored(&record(json!({"a": 1})));
        assert!(!buffer.seed("a", json!(9)));
        assert!(buffer.seed("b", json!(2)));

        assert_eq!(buffer.value("a"), Some(&json!(1)));
        assert_eq!(buffer.get("b").unwrap().origin, Origin::Seed);
        assert!(buffer.dirty_keys().is_empty());
    }

    #[test]
    fn test_stage_marks_dirty() {
        let mut buffer = StagingBuffer::new();
        buffer.stage("a", json!(1));
        buffer.stage("a", json!(1));

        assert_eq!(buffer.dirty_keys(), vec!["a".to_string()]);
        buffer.mark_clean();
        assert!(buffer.dirty_keys().is_empty());
        assert_eq!(buffer.get("a").unwrap().origin, Origin::Explicit);
    }

    #[test]
    fn test_merge_stored_keeps_dirty_keys() {
        let mut buffer = StagingBuffer::from_stored(&record(json!({"a": 1, "b": 2, "c": 3})));
        buffer.stage("a", json!(10));

        buffer.merge_stored(&record(json!({"a": 5, "b": 20})));

        assert_eq!(buffer.value("a"), Some(&json!(10)));
        assert_eq!(buffer.value("b"), Some(&json!(20)));
        assert!(!buffer.contains("c"));
        assert_eq!(
            buffer.to_map(),
            record(json!({"a": 10, "b": 20}))
        );
    }
}
