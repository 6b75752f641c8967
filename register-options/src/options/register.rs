//! The options instance: one named record, its schema and its staged values

use super::canonical::{CanonicalMode, Canonicalizer};
use super::pipeline::SanitizeValidatePipeline;
use super::policy::{WriteContext, WriteOperation, WritePolicy, WritePolicyGate};
use super::schema::{Bucket, Schema, SchemaRegistry};
use super::staging::{StagedValue, StagingBuffer};
use super::types::{Messages, OptionKey};
use crate::error::{OptionsError, Result};
use crate::logging::{LogFacade, Logger};
use crate::storage::{Scope, StorageBackend, StorageContext, StorageFactory};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::any::type_name;
use std::sync::Arc;

/// Schema-driven, policy-gated access to one persisted options record
///
/// Construction reads the record once. Reads are served from the in-memory
/// overlay; only `set_option`, `delete_option`, `clear`, the commits and
/// `seed_if_missing` write, and each of them writes at most once.
pub struct RegisterOptions {
    record: String,
    context: StorageContext,
    backend: Box<dyn StorageBackend>,
    registry: SchemaRegistry,
    pipeline: SanitizeValidatePipeline,
    canonicalizer: Canonicalizer,
    staging: StagingBuffer,
    snapshot: Map<String, Value>,
    record_exists: bool,
    gate: WritePolicyGate,
    logger: Arc<dyn Logger>,
    messages: Messages,
    autoload: Option<bool>,
}

impl std::fmt::Debug for RegisterOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterOptions")
            .field("record", &self.record)
            .field("context", &self.context)
            .field("registered", &self.registry.len())
            .field("staged", &self.staging.len())
            .field("record_exists", &self.record_exists)
            .finish()
    }
}

impl RegisterOptions {
    /// Site-scoped instance over a factory's platform
    pub fn new(record: &str, factory: &StorageFactory) -> Result<Self> {
        Self::builder(record).build(factory)
    }

    pub fn builder(record: &str) -> RegisterOptionsBuilder {
        RegisterOptionsBuilder::new(record)
    }

    /// Instance over an already resolved backend
    pub fn with_backend(
        record: &str,
        context: StorageContext,
        backend: Box<dyn StorageBackend>,
    ) -> Result<Self> {
        Self::open(
            record,
            context,
            backend,
            Arc::new(LogFacade),
            WritePolicyGate::new(),
            None,
            CanonicalMode::Deep,
        )
    }

    fn open(
        record: &str,
        context: StorageContext,
        backend: Box<dyn StorageBackend>,
        logger: Arc<dyn Logger>,
        mut gate: WritePolicyGate,
        autoload: Option<bool>,
        mode: CanonicalMode,
    ) -> Result<Self> {
        let record = record.trim();
        if record.is_empty() {
            return Err(OptionsError::configuration("options record name is empty"));
        }
        gate.set_logger(Arc::clone(&logger));

        let mut options = Self {
            record: record.to_string(),
            context,
            backend,
            registry: SchemaRegistry::new(),
            pipeline: SanitizeValidatePipeline::new(),
            canonicalizer: Canonicalizer::new(mode),
            staging: StagingBuffer::new(),
            snapshot: Map::new(),
            record_exists: false,
            gate,
            logger,
            messages: Messages::new(),
            autoload,
        };

        let (exists, stored) = options.read_record();
        options.record_exists = exists;
        options.staging = StagingBuffer::from_stored(&stored);
        options.snapshot = stored;

        options.logger.debug(
            "options record loaded",
            &json!({
                "record": options.record,
                "scope": options.context.scope.as_str(),
                "exists": exists,
                "keys": options.snapshot.len(),
            }),
        );
        Ok(options)
    }

    /// Register application schema (schema bucket) and seed its defaults
    pub fn register_schema(&mut self, schema: Schema) -> Result<Vec<String>> {
        self.register_in(schema, Bucket::Schema)
    }

    /// Register library schema (component bucket) and seed its defaults
    pub fn register_component_schema(&mut self, schema: Schema) -> Result<Vec<String>> {
        self.register_in(schema, Bucket::Component)
    }

    fn register_in(&mut self, schema: Schema, bucket: Bucket) -> Result<Vec<String>> {
        let keys = self.registry.register_all(schema, bucket)?;
        let seeded = self.seed_defaults();
        self.logger.debug(
            "schema registered",
            &json!({
                "record": self.record,
                "bucket": bucket.as_str(),
                "keys": keys,
                "seeded": seeded,
            }),
        );
        Ok(keys)
    }

    /// Seed sanitized defaults for every registered key without a value
    fn seed_defaults(&mut self) -> Vec<String> {
        let mut seeded = Vec::new();
        for entry in self.registry.iter() {
            if self.staging.contains(entry.key()) {
                continue;
            }
            if let Some(default) = entry.default_value() {
                let value = self.pipeline.sanitize(entry, default.clone());
                if self.staging.seed(entry.key(), value) {
                    seeded.push(entry.key().to_string());
                }
            }
        }
        seeded
    }

    /// Current value: the overlay, else the sanitized default
    ///
    /// Never reads the backend.
    pub fn get_option(&self, key: &str) -> Option<Value> {
        let key = OptionKey::new(key).ok()?;
        if let Some(value) = self.staging.value(key.as_str()) {
            return Some(value.clone());
        }
        let entry = self.registry.get(key.as_str())?;
        let default = entry.default_value()?;
        Some(self.pipeline.sanitize(entry, default.clone()))
    }

    pub fn get_option_or(&self, key: &str, fallback: Value) -> Value {
        self.get_option(key).unwrap_or(fallback)
    }

    /// Current value deserialized into `T`
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_option(key) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value).map(Some).map_err(|e| {
                OptionsError::configuration(format!(
                    "option '{}' cannot be read as {}: {}",
                    key,
                    type_name::<T>(),
                    e
                ))
            }),
        }
    }

    /// The whole overlay, as it would be persisted
    pub fn get_options(&self) -> Map<String, Value> {
        self.staging.to_map()
    }

    /// Overlay entry with its origin and dirty flag
    pub fn staged(&self, key: &str) -> Option<&StagedValue> {
        let key = OptionKey::new(key).ok()?;
        self.staging.get(key.as_str())
    }

    pub fn has_option(&self, key: &str) -> bool {
        OptionKey::new(key)
            .map(|key| self.staging.contains(key.as_str()))
            .unwrap_or(false)
    }

    /// Validate and stage a value in memory
    pub fn stage_option(&mut self, key: &str, value: Value) -> Result<()> {
        let (key, sanitized) = self.prepare(key, value)?;
        self.staging.stage(&key, sanitized);
        Ok(())
    }

    /// Validate every value, then stage them all. Nothing is staged if any
    /// value fails.
    pub fn stage_options<I, K>(&mut self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        let prepared = values
            .into_iter()
            .map(|(key, value)| self.prepare(key.as_ref(), value))
            .collect::<Result<Vec<_>>>()?;

        for (key, sanitized) in prepared {
            self.staging.stage(&key, sanitized);
        }
        Ok(())
    }

    /// Validate a value and persist the whole record immediately
    ///
    /// Returns `Ok(false)` when the write was denied or the backend refused
    /// it; the overlay is then left as it was.
    pub fn set_option(&mut self, key: &str, value: Value) -> Result<bool> {
        let (key, sanitized) = self.prepare(key, value)?;

        let unchanged = self
            .staging
            .value(&key)
            .is_some_and(|current| self.canonicalizer.equivalent(current, &sanitized));
        if unchanged {
            self.logger.debug(
                "set_option: value unchanged, skipping write",
                &json!({"record": self.record, "key": key}),
            );
            return Ok(true);
        }

        let mut candidate = self.staging.clone();
        candidate.stage(&key, sanitized);

        let operation = self.write_operation();
        let ctx = self.write_context(operation, Some(&key), vec![key.clone()]);
        Ok(self.persist_candidate(candidate, &ctx))
    }

    /// Remove a key from the record and persist
    pub fn delete_option(&mut self, key: &str) -> Result<bool> {
        let key = OptionKey::new(key)?.into_string();
        if !self.staging.contains(&key) {
            return Ok(true);
        }

        let mut candidate = self.staging.clone();
        candidate.remove(&key);

        if !self.record_exists || !self.snapshot.contains_key(&key) {
            // Never persisted, nothing to write
            self.staging = candidate;
            return Ok(true);
        }

        let ctx = self.write_context(WriteOperation::Delete, Some(&key), vec![key.clone()]);
        Ok(self.persist_candidate(candidate, &ctx))
    }

    /// Remove every key and persist an empty record
    pub fn clear(&mut self) -> Result<bool> {
        if !self.record_exists || self.snapshot.is_empty() {
            self.staging.clear();
            return Ok(true);
        }

        let keys: Vec<String> = self.snapshot.keys().cloned().collect();
        let ctx = self.write_context(WriteOperation::Delete, None, keys);
        Ok(self.persist_candidate(StagingBuffer::new(), &ctx))
    }

    /// Persist the overlay as the whole record
    ///
    /// Skips the backend entirely when the overlay is canonically equal to
    /// the last persisted record.
    pub fn commit_replace(&mut self) -> Result<bool> {
        let staged = self.staging.to_map();
        if self.same_record(&staged, &self.snapshot) {
            self.logger.debug(
                "commit_replace: nothing changed, skipping write",
                &json!({"record": self.record}),
            );
            self.staging.mark_clean();
            self.messages.clear();
            return Ok(true);
        }

        let keys = self.changed_keys(&staged, &self.snapshot);
        let operation = self.write_operation();
        let ctx = self.write_context(operation, None, keys);
        if !self.gate_allows(&ctx) || !self.persist(operation, &staged) {
            return Ok(false);
        }

        self.snapshot = staged;
        self.record_exists = true;
        self.staging.mark_clean();
        self.messages.clear();
        Ok(true)
    }

    /// Re-read the record and persist only locally changed keys on top of it
    pub fn commit_merge(&mut self) -> Result<bool> {
        let (exists, fresh) = self.read_record();
        let dirty = self.staging.dirty_keys();

        let mut merged = fresh.clone();
        for key in &dirty {
            if let Some(value) = self.staging.value(key) {
                merged.insert(key.clone(), value.clone());
            }
        }

        self.record_exists = exists;
        let unchanged = if exists {
            self.same_record(&merged, &fresh)
        } else {
            merged.is_empty()
        };

        if !unchanged {
            let operation = self.write_operation();
            let ctx = self.write_context(operation, None, dirty);
            if !self.gate_allows(&ctx) || !self.persist(operation, &merged) {
                return Ok(false);
            }
            self.record_exists = true;
        }

        self.staging.merge_stored(&merged);
        self.staging.mark_clean();
        self.seed_defaults();
        self.snapshot = merged;
        self.messages.clear();
        Ok(true)
    }

    /// Persist the seeded overlay when the record does not exist yet
    pub fn seed_if_missing(&mut self) -> Result<bool> {
        if self.record_exists {
            return Ok(true);
        }

        let staged = self.staging.to_map();
        if staged.is_empty() {
            return Ok(true);
        }

        let keys: Vec<String> = staged.keys().cloned().collect();
        let ctx = self.write_context(WriteOperation::Seed, None, keys);
        if !self.gate_allows(&ctx) || !self.persist(WriteOperation::Seed, &staged) {
            return Ok(false);
        }

        self.snapshot = staged;
        self.record_exists = true;
        self.staging.mark_clean();
        Ok(true)
    }

    /// Re-read the record, keeping local changes
    ///
    /// Keys neither stored nor changed locally fall back to their defaults.
    pub fn refresh_options(&mut self) {
        let (exists, fresh) = self.read_record();
        self.staging.merge_stored(&fresh);
        self.seed_defaults();
        self.snapshot = fresh;
        self.record_exists = exists;
    }

    pub fn messages(&self) -> &Messages {
        &self.messages
    }

    pub fn take_messages(&mut self) -> Messages {
        std::mem::take(&mut self.messages)
    }

    /// Keys changed locally and not yet persisted
    pub fn pending_keys(&self) -> Vec<String> {
        self.staging.dirty_keys()
    }

    pub fn is_dirty(&self) -> bool {
        !self.staging.dirty_keys().is_empty()
    }

    pub fn storage_context(&self) -> &StorageContext {
        &self.context
    }

    pub fn record_name(&self) -> &str {
        &self.record
    }

    /// Whether the record is known to exist in the backend
    pub fn record_exists(&self) -> bool {
        self.record_exists
    }

    pub fn supports_autoload(&self) -> bool {
        self.backend.supports_autoload()
    }

    pub fn gate(&self) -> &WritePolicyGate {
        &self.gate
    }

    pub fn gate_mut(&mut self) -> &mut WritePolicyGate {
        &mut self.gate
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Normalize the key, require registration, run the pipeline
    fn prepare(&mut self, key: &str, value: Value) -> Result<(String, Value)> {
        let key = OptionKey::new(key)?.into_string();
        let entry = self.registry.get(&key).ok_or_else(|| {
            OptionsError::configuration(format!(
                "option '{}' is not registered for record '{}'",
                key, self.record
            ))
        })?;

        match self.pipeline.process(entry, value, &mut self.messages) {
            Ok(sanitized) => Ok((key, sanitized)),
            Err(err) => {
                self.logger.warning(
                    "option rejected by validator",
                    &json!({"record": self.record, "key": key, "error": err.to_string()}),
                );
                Err(err)
            }
        }
    }

    /// Gate, persist and, on success, adopt `candidate` as the clean overlay
    fn persist_candidate(&mut self, mut candidate: StagingBuffer, ctx: &WriteContext) -> bool {
        let record = candidate.to_map();
        if !self.gate_allows(ctx) || !self.persist(ctx.operation, &record) {
            return false;
        }

        candidate.mark_clean();
        self.staging = candidate;
        if ctx.operation == WriteOperation::Delete {
            self.seed_defaults();
        }
        self.snapshot = record;
        self.record_exists = true;
        true
    }

    fn gate_allows(&self, ctx: &WriteContext) -> bool {
        let allowed = self.gate.allow(ctx);
        if !allowed {
            self.logger.warning(
                "write denied by policy",
                &json!({
                    "record": self.record,
                    "operation": ctx.operation,
                    "keys": ctx.keys,
                }),
            );
        }
        allowed
    }

    /// Exactly one backend write: `add` for a new record, else `update`
    ///
    /// A refused `add` is followed by one read. If another writer created the
    /// record meanwhile, the instance adopts it so the next write updates it.
    fn persist(&mut self, operation: WriteOperation, record: &Map<String, Value>) -> bool {
        let value = Value::Object(record.clone());
        let ok = if self.record_exists {
            self.backend.update(&self.record, &value, None)
        } else {
            let added = self.backend.add(&self.record, &value, self.autoload);
            if !added {
                self.adopt_foreign_record();
            }
            added
        };

        if ok {
            self.logger.debug(
                "options record persisted",
                &json!({"record": self.record, "operation": operation, "keys": record.len()}),
            );
        } else {
            self.logger.error(
                "backend refused options write",
                &json!({"record": self.record, "operation": operation}),
            );
        }
        ok
    }

    fn adopt_foreign_record(&mut self) {
        let (exists, stored) = self.read_record();
        if !exists {
            return;
        }
        self.logger.warning(
            "options record was created by another writer",
            &json!({"record": self.record, "keys": stored.len()}),
        );
        self.record_exists = true;
        self.snapshot = stored;
    }

    fn read_record(&self) -> (bool, Map<String, Value>) {
        match self.backend.read(&self.record) {
            None => (false, Map::new()),
            Some(Value::Object(map)) => (true, map),
            Some(other) => {
                self.logger.warning(
                    "stored options record is not a map, starting empty",
                    &json!({"record": self.record, "found": super::pipeline::describe_value(&other)}),
                );
                (true, Map::new())
            }
        }
    }

    fn write_operation(&self) -> WriteOperation {
        if self.record_exists {
            WriteOperation::Update
        } else {
            WriteOperation::Add
        }
    }

    fn write_context(
        &self,
        operation: WriteOperation,
        key: Option<&str>,
        keys: Vec<String>,
    ) -> WriteContext {
        WriteContext {
            operation,
            record: self.record.clone(),
            key: key.map(str::to_string),
            keys,
            scope: self.context.scope,
            entity_id: self.context.entity_id,
            user_storage: (self.context.scope == Scope::User).then_some(self.context.user_storage),
        }
    }

    fn same_record(&self, a: &Map<String, Value>, b: &Map<String, Value>) -> bool {
        self.canonicalizer
            .equivalent(&Value::Object(a.clone()), &Value::Object(b.clone()))
    }

    /// Keys whose values differ between `staged` and `stored`, sorted
    fn changed_keys(&self, staged: &Map<String, Value>, stored: &Map<String, Value>) -> Vec<String> {
        let mut keys: Vec<String> = staged
            .iter()
            .filter(|(key, value)| match stored.get(*key) {
                Some(old) => !self.canonicalizer.equivalent(old, value),
                None => true,
            })
            .map(|(key, _)| key.clone())
            .chain(stored.keys().filter(|k| !staged.contains_key(*k)).cloned())
            .collect();
        keys.sort();
        keys
    }
}

/// Fluent construction of [`RegisterOptions`]
pub struct RegisterOptionsBuilder {
    record: String,
    context: StorageContext,
    autoload: Option<bool>,
    policy: Option<Arc<dyn WritePolicy>>,
    logger: Option<Arc<dyn Logger>>,
    canonical_mode: CanonicalMode,
    schemas: Vec<(Schema, Bucket)>,
}

impl RegisterOptionsBuilder {
    pub fn new(record: &str) -> Self {
        Self {
            record: record.to_string(),
            context: StorageContext::default(),
            autoload: None,
            policy: None,
            logger: None,
            canonical_mode: CanonicalMode::Deep,
            schemas: Vec::new(),
        }
    }

    pub fn context(mut self, context: StorageContext) -> Self {
        self.context = context;
        self
    }

    /// Autoload hint used when the record is first created
    pub fn autoload(mut self, autoload: bool) -> Self {
        self.autoload = Some(autoload);
        self
    }

    pub fn policy(mut self, policy: impl WritePolicy + 'static) -> Self {
        self.policy = Some(Arc::new(policy));
        self
    }

    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn canonical_mode(mut self, mode: CanonicalMode) -> Self {
        self.canonical_mode = mode;
        self
    }

    pub fn schema(mut self, schema: Schema) -> Self {
        self.schemas.push((schema, Bucket::Schema));
        self
    }

    pub fn component_schema(mut self, schema: Schema) -> Self {
        self.schemas.push((schema, Bucket::Component));
        self
    }

    pub fn build(self, factory: &StorageFactory) -> Result<RegisterOptions> {
        let backend = factory.create(&self.context)?;

        let mut gate = WritePolicyGate::new();
        if let Some(policy) = self.policy {
            gate.set_policy(policy);
        }

        let mut options = RegisterOptions::open(
            &self.record,
            self.context,
            backend,
            self.logger.unwrap_or_else(|| Arc::new(LogFacade)),
            gate,
            self.autoload,
            self.canonical_mode,
        )?;

        for (schema, bucket) in self.schemas {
            options.register_in(schema, bucket)?;
        }
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::RecordingLogger;
    use crate::options::callable::WarningSink;
    use crate::options::policy::DenyAll;
    use crate::options::schema::SchemaEntry;
    use crate::storage::{MemoryPlatform, Namespace};

    fn is_positive_int(value: &Value, _: &mut WarningSink) -> bool {
        value.as_i64().is_some_and(|n| n > 0)
    }

    fn is_string(value: &Value, _: &mut WarningSink) -> bool {
        value.is_string()
    }

    fn setup() -> (Arc<MemoryPlatform>, StorageFactory) {
        let platform = Arc::new(MemoryPlatform::new());
        let factory = StorageFactory::new(platform.clone());
        (platform, factory)
    }

    fn schema() -> Schema {
        Schema::new()
            .option("retries", SchemaEntry::new().default_value(3).validate(is_positive_int))
            .option(
                "label",
                SchemaEntry::new()
                    .default_value("  hello ")
                    .sanitize(|v: Value| match v {
                        Value::String(s) => Value::String(s.trim().to_string()),
                        other => other,
                    })
                    .validate(is_string),
            )
    }

    #[test]
    fn test_empty_record_name_is_rejected() {
        let (_, factory) = setup();
        let err = RegisterOptions::new("  ", &factory).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_defaults_are_sanitized_and_unwritten() {
        let (platform, factory) = setup();
        let mut options = RegisterOptions::new("plugin", &factory).unwrap();
        options.register_schema(schema()).unwrap();

        assert_eq!(options.get_option("label"), Some(json!("hello")));
        assert_eq!(options.get_option("retries"), Some(json!(3)));
        assert_eq!(platform.stats().mutations(), 0);
        assert!(!options.is_dirty());
    }

    #[test]
    fn test_stored_values_win_over_defaults() {
        let (platform, factory) = setup();
        platform.seed(Namespace::Site, "plugin", json!({"retries": 7}));

        let mut options = RegisterOptions::new("plugin", &factory).unwrap();
        options.register_schema(schema()).unwrap();
        assert_eq!(options.get_option("retries"), Some(json!(7)));
    }

    #[test]
    fn test_unregistered_key_is_configuration_error() {
        let (_, factory) = setup();
        let mut options = RegisterOptions::new("plugin", &factory).unwrap();
        options.register_schema(schema()).unwrap();

        assert!(options.stage_option("nope", json!(1)).unwrap_err().is_configuration());
        assert!(options.set_option("nope", json!(1)).unwrap_err().is_configuration());
    }

    #[test]
    fn test_stage_options_is_atomic() {
        let (_, factory) = setup();
        let mut options = RegisterOptions::new("plugin", &factory).unwrap();
        options.register_schema(schema()).unwrap();

        let result = options.stage_options([("label", json!("x")), ("retries", json!(0))]);
        assert!(result.unwrap_err().is_validation());
        assert_eq!(options.get_option("label"), Some(json!("hello")));
        assert!(options.pending_keys().is_empty());
    }

    #[test]
    fn test_get_as_deserializes() {
        let (_, factory) = setup();
        let mut options = RegisterOptions::new("plugin", &factory).unwrap();
        options.register_schema(schema()).unwrap();

        assert_eq!(options.get_as::<u32>("retries").unwrap(), Some(3));
        assert!(options.get_as::<bool>("retries").is_err());
        assert_eq!(options.get_as::<u32>("missing").unwrap(), None);
    }

    #[test]
    fn test_denied_write_is_logged() {
        let (_, factory) = setup();
        let logger = Arc::new(RecordingLogger::new());
        let mut options = RegisterOptions::builder("plugin")
            .policy(DenyAll)
            .logger(logger.clone())
            .schema(schema())
            .build(&factory)
            .unwrap();

        assert!(!options.set_option("retries", json!(5)).unwrap());
        assert_eq!(logger.matching("write denied").len(), 1);
        assert_eq!(logger.matching("write gate:").len(), 6);
    }

    #[test]
    fn test_delete_option_reverts_to_default() {
        let (platform, factory) = setup();
        platform.seed(Namespace::Site, "plugin", json!({"retries": 9}));
        let mut options = RegisterOptions::new("plugin", &factory).unwrap();
        options.register_schema(schema()).unwrap();

        assert!(options.delete_option("retries").unwrap());
        assert_eq!(options.get_option("retries"), Some(json!(3)));

        let stored = platform.row(Namespace::Site, "plugin").unwrap().value;
        assert!(stored.get("retries").is_none());
    }
}
