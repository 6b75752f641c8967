//! Order-insensitive normalization used to detect no-op writes
//!
//! Canonical forms are only ever compared; they are never handed back to
//! callers.

use serde_json::{Map, Value};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CanonicalMode {
    /// Normalize nested maps and lists recursively
    #[default]
    Deep,
    /// Normalize only the top-level container
    Shallow,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Canonicalizer {
    mode: CanonicalMode,
}

impl Canonicalizer {
    pub fn new(mode: CanonicalMode) -> Self {
        Self { mode }
    }

    pub fn deep() -> Self {
        Self::new(CanonicalMode::Deep)
    }

    pub fn shallow() -> Self {
        Self::new(CanonicalMode::Shallow)
    }

    pub fn mode(&self) -> CanonicalMode {
        self.mode
    }

    pub fn canonicalize(&self, value: &Value) -> Value {
        match self.mode {
            CanonicalMode::Deep => deep(value),
            CanonicalMode::Shallow => shallow(value),
        }
    }

    /// Whether two values have the same canonical form
    pub fn equivalent(&self, a: &Value, b: &Value) -> bool {
        self.canonicalize(a) == self.canonicalize(b)
    }
}

fn deep(value: &Value) -> Value {
    match value {
        Value::Array(items) => {
            let mut items: Vec<Value> = items.iter().map(deep).collect();
            items.sort_by(compare);
            Value::Array(items)
        }
        Value::Object(map) => Value::Object(sorted_map(map, deep)),
        scalar => scalar.clone(),
    }
}

fn shallow(value: &Value) -> Value {
    match value {
        Value::Array(items) => {
            let mut items = items.clone();
            items.sort_by(compare);
            Value::Array(items)
        }
        Value::Object(map) => Value::Object(sorted_map(map, Value::clone)),
        scalar => scalar.clone(),
    }
}

fn sorted_map(map: &Map<String, Value>, normalize: impl Fn(&Value) -> Value) -> Map<String, Value> {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
        .into_iter()
        .map(|(k, v)| (k.clone(), normalize(v)))
        .collect()
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values: null < bool < number < string < list < map
pub fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let fx = x.as_f64().unwrap_or(f64::NAN);
            let fy = y.as_f64().unwrap_or(f64::NAN);
            fx.total_cmp(&fy)
                .then_with(|| x.to_string().cmp(&y.to_string()))
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y.iter())
            .map(|(l, r)| compare(l, r))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Value::Object(x), Value::Object(y)) => {
            let mut xs: Vec<_> = x.iter().collect();
            let mut ys: Vec<_> = y.iter().collect();
            xs.sort_by(|l, r| l.0.cmp(r.0));
            ys.sort_by(|l, r| l.0.cmp(r.0));
            xs.iter()
                .zip(ys.iter())
                .map(|(l, r)| l.0.cmp(r.0).then_with(|| compare(l.1, r.1)))
                .find(|o| o.is_ne())
                .unwrap_or_else(|| xs.len().cmp(&ys.len()))
        }
        _ => rank(a).cmp(&rank(b)),
    }
}
