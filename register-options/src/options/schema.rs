//! Option schema: declarations and the two-bucket registry
//!
//! Every key carries sanitize and validate chains in two buckets. The
//! component bucket is contributed by the library and always runs first; the
//! schema bucket is contributed by the application. Registering appends to one
//! bucket and never touches the other.

use super::callable::{CallableKind, Sanitizer, Validator, WarningSink};
use super::types::OptionKey;
use crate::error::{OptionsError, Result};
use once_cell::sync::OnceCell;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Provenance of a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Component,
    Schema,
}

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Component => "component",
            Bucket::Schema => "schema",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A literal default or a generator producing one
#[derive(Clone)]
pub enum DefaultValue {
    Literal(Value),
    Generator(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl DefaultValue {
    pub fn generator<F>(func: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        DefaultValue::Generator(Arc::new(func))
    }

    pub fn produce(&self) -> Value {
        match self {
            DefaultValue::Literal(value) => value.clone(),
            DefaultValue::Generator(func) => func(),
        }
    }

    fn same_as(&self, other: &DefaultValue) -> bool {
        match (self, other) {
            (DefaultValue::Literal(a), DefaultValue::Literal(b)) => a == b,
            (DefaultValue::Generator(a), DefaultValue::Generator(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            DefaultValue::Generator(_) => f.write_str("Generator"),
        }
    }
}

impl From<Value> for DefaultValue {
    fn from(value: Value) -> Self {
        DefaultValue::Literal(value)
    }
}

/// What one registration call declares for a key
#[derive(Debug, Clone, Default)]
pub struct SchemaEntry {
    pub default: Option<DefaultValue>,
    pub description: Option<String>,
    pub sanitize: Vec<Sanitizer>,
    pub validate: Vec<Validator>,
}

impl SchemaEntry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Literal(value.into()));
        self
    }

    pub fn default_with<F>(mut self, generator: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default = Some(DefaultValue::generator(generator));
        self
    }

    pub fn description(mut self, text: &str) -> Self {
        self.description = Some(text.to_string());
        self
    }

    /// Append a sanitizing function or closure
    pub fn sanitize<F>(self, func: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.sanitizer(Sanitizer::new(func))
    }

    pub fn sanitizer(mut self, sanitizer: Sanitizer) -> Self {
        self.sanitize.push(sanitizer);
        self
    }

    /// Append a validating function or closure
    pub fn validate<F>(self, func: F) -> Self
    where
        F: Fn(&Value, &mut WarningSink) -> bool + Send + Sync + 'static,
    {
        self.validator(Validator::new(func))
    }

    pub fn validator(mut self, validator: Validator) -> Self {
        self.validate.push(validator);
        self
    }
}

/// Ordered keys with their declarations, as passed to one registration call
#[derive(Debug, Clone, Default)]
pub struct Schema {
    entries: Vec<(String, SchemaEntry)>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn option(mut self, key: &str, entry: SchemaEntry) -> Self {
        self.insert(key, entry);
        self
    }

    pub fn insert(&mut self, key: &str, entry: SchemaEntry) {
        self.entries.push((key.to_string(), entry));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SchemaEntry)> {
        self.entries.iter().map(|(k, e)| (k.as_str(), e))
    }
}

impl IntoIterator for Schema {
    type Item = (String, SchemaEntry);
    type IntoIter = std::vec::IntoIter<(String, SchemaEntry)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<K: Into<String>> FromIterator<(K, SchemaEntry)> for Schema {
    fn from_iter<I: IntoIterator<Item = (K, SchemaEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, e)| (k.into(), e)).collect(),
        }
    }
}

/// Two ordered sequences, concatenated only when iterated
#[derive(Debug, Clone)]
pub struct Chains<T> {
    pub component: Vec<T>,
    pub schema: Vec<T>,
}

impl<T> Default for Chains<T> {
    fn default() -> Self {
        Self {
            component: Vec::new(),
            schema: Vec::new(),
        }
    }
}

impl<T> Chains<T> {
    pub fn bucket(&self, bucket: Bucket) -> &[T] {
        match bucket {
            Bucket::Component => &self.component,
            Bucket::Schema => &self.schema,
        }
    }

    fn bucket_mut(&mut self, bucket: Bucket) -> &mut Vec<T> {
        match bucket {
            Bucket::Component => &mut self.component,
            Bucket::Schema => &mut self.schema,
        }
    }

    /// Component steps, then schema steps
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.component.iter().chain(self.schema.iter())
    }

    /// Steps paired with their bucket, in evaluation order
    pub fn iter_tagged(&self) -> impl Iterator<Item = (Bucket, &T)> {
        self.component
            .iter()
            .map(|s| (Bucket::Component, s))
            .chain(self.schema.iter().map(|s| (Bucket::Schema, s)))
    }

    pub fn len(&self) -> usize {
        self.component.len() + self.schema.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The merged view of a key across every registration call
#[derive(Debug, Clone)]
pub struct RegisteredOption {
    key: String,
    default: Option<DefaultValue>,
    description: Option<String>,
    sanitize: Chains<Sanitizer>,
    validate: Chains<Validator>,
    resolved_default: OnceCell<Value>,
}

impl RegisteredOption {
    fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            default: None,
            description: None,
            sanitize: Chains::default(),
            validate: Chains::default(),
            resolved_default: OnceCell::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    pub fn sanitizers(&self) -> &Chains<Sanitizer> {
        &self.sanitize
    }

    pub fn validators(&self) -> &Chains<Validator> {
        &self.validate
    }

    /// Default value, produced once and memoized
    pub fn default_value(&self) -> Option<&Value> {
        let default = self.default.as_ref()?;
        Some(self.resolved_default.get_or_init(|| default.produce()))
    }

    /// Comparable description of the merged entry
    pub fn summary(&self) -> SchemaSummary {
        SchemaSummary {
            key: self.key.clone(),
            has_default: self.default.is_some(),
            description: self.description.clone(),
            sanitizers: self
                .sanitize
                .iter_tagged()
                .map(|(b, s)| (b, s.kind().clone()))
                .collect(),
            validators: self
                .validate
                .iter_tagged()
                .map(|(b, v)| (b, v.kind().clone()))
                .collect(),
        }
    }

    fn merge(&mut self, entry: SchemaEntry, bucket: Bucket) {
        if let Some(incoming) = entry.default {
            let conflicting = self
                .default
                .as_ref()
                .map(|existing| !existing.same_as(&incoming));
            match conflicting {
                None => self.default = Some(incoming),
                Some(true) => log::warn!(
                    "Option '{}' already has a default; ignoring the one from the {} bucket",
                    self.key,
                    bucket
                ),
                Some(false) => {}
            }
        }

        if self.description.is_none() {
            self.description = entry.description;
        }

        let sanitizers = self.sanitize.bucket_mut(bucket);
        for sanitizer in entry.sanitize {
            if !sanitizers.iter().any(|s| s.same_callable(&sanitizer)) {
                sanitizers.push(sanitizer);
            }
        }

        let validators = self.validate.bucket_mut(bucket);
        for validator in entry.validate {
            if !validators.iter().any(|v| v.same_callable(&validator)) {
                validators.push(validator);
            }
        }
    }
}

/// Inspectable shape of a merged entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaSummary {
    pub key: String,
    pub has_default: bool,
    pub description: Option<String>,
    pub sanitizers: Vec<(Bucket, CallableKind)>,
    pub validators: Vec<(Bucket, CallableKind)>,
}

/// Registry of merged option entries, owned by one options instance
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    entries: BTreeMap<String, RegisteredOption>,
}

impl SchemaRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one key into a bucket
    ///
    /// Returns the normalized key. Fails if the merged entry has no validator
    /// in either bucket, leaving the registry untouched.
    pub fn register(&mut self, key: &str, entry: SchemaEntry, bucket: Bucket) -> Result<String> {
        let mut keys = self.register_all(Schema::new().option(key, entry), bucket)?;
        keys.pop()
            .ok_or_else(|| OptionsError::configuration("empty schema registration"))
    }

    /// Merge a whole schema into a bucket, atomically
    ///
    /// Returns the normalized keys in declaration order.
    pub fn register_all(&mut self, schema: Schema, bucket: Bucket) -> Result<Vec<String>> {
        let mut staged: BTreeMap<String, RegisteredOption> = BTreeMap::new();
        let mut keys = Vec::with_capacity(schema.len());

        for (raw_key, entry) in schema {
            let key = OptionKey::new(&raw_key)?.into_string();
            let merged = staged.entry(key.clone()).or_insert_with(|| {
                self.entries
                    .get(&key)
                    .cloned()
                    .unwrap_or_else(|| RegisteredOption::new(&key))
            });
            merged.merge(entry, bucket);
            if !keys.contains(&key) {
                keys.push(key);
            }
        }

        for (key, merged) in &staged {
            if merged.validate.is_empty() {
                return Err(OptionsError::configuration(format!(
                    "option '{}' must declare at least one validator",
                    key
                )));
            }
        }

        for (key, merged) in staged {
            log::debug!(
                "Registered option: {} ({} bucket, {} sanitizers, {} validators)",
                key,
                bucket,
                merged.sanitize.len(),
                merged.validate.len()
            );
            self.entries.insert(key, merged);
        }
        Ok(keys)
    }

    /// Get a merged entry by (normalized) key
    pub fn get(&self, key: &str) -> Option<&RegisteredOption> {
        self.entries.get(key)
    }

    /// Check if an option is registered
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Registered keys in sorted order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredOption> {
        self.entries.values()
    }

    /// Resolved default of a key, unsanitized
    pub fn default_for(&self, key: &str) -> Option<Value> {
        self.entries.get(key)?.default_value().cloned()
    }

    /// Get total number of registered options
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
