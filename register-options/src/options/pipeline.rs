//! Sanitize-then-validate processing of candidate values

use super::callable::WarningSink;
use super::schema::RegisteredOption;
use super::types::Messages;
use crate::error::{OptionsError, Result};
use serde_json::Value;

/// Longest string rendered verbatim in diagnostics
const MAX_RENDERED_CHARS: usize = 100;

/// Runs a key's full sanitize chain, then its full validate chain
#[derive(Debug, Default, Clone, Copy)]
pub struct SanitizeValidatePipeline;

impl SanitizeValidatePipeline {
    pub fn new() -> Self {
        Self
    }

    /// Feed the value through every sanitizer, component bucket first
    pub fn sanitize(&self, entry: &RegisteredOption, value: Value) -> Value {
        entry
            .sanitizers()
            .iter()
            .fold(value, |value, sanitizer| sanitizer.apply(value))
    }

    /// Sanitize and validate a candidate
    ///
    /// Validator warnings land in `messages` whether or not the value passes.
    /// The first validator returning `false` rejects the value.
    pub fn process(
        &self,
        entry: &RegisteredOption,
        candidate: Value,
        messages: &mut Messages,
    ) -> Result<Value> {
        let key = entry.key();
        let submitted = candidate.clone();
        let sanitized = self.sanitize(entry, candidate);

        if sanitized != submitted {
            messages.notice(
                key,
                format!(
                    "value {} was normalized to {}",
                    describe_value(&submitted),
                    describe_value(&sanitized)
                ),
            );
        }

        let mut warnings = WarningSink::new();
        let rejected_by = entry
            .validators()
            .iter()
            .find(|validator| !validator.check(&sanitized, &mut warnings));

        for warning in warnings.into_vec() {
            messages.warn(key, warning);
        }

        match rejected_by {
            Some(validator) => Err(OptionsError::Validation {
                key: key.to_string(),
                value: describe_value(&sanitized),
                validator: validator.kind().to_string(),
            }),
            None => Ok(sanitized),
        }
    }
}

/// Short, human-readable rendering of a value for diagnostics
pub fn describe_value(value: &Value) -> String {
    match value {
        Value::Array(items) => format!("Array({})", items.len()),
        Value::Object(_) => "Object(Map)".to_string(),
        Value::String(s) => {
            if s.chars().count() > MAX_RENDERED_CHARS {
                let head: String = s.chars().take(MAX_RENDERED_CHARS).collect();
                format!("\"{}...\"", head)
            } else {
                format!("\"{}\"", s)
            }
        }
        scalar => scalar.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::callable::Validator;
    use crate::options::schema::{Bucket, SchemaEntry, SchemaRegistry};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn is_positive_int(value: &Value, _: &mut WarningSink) -> bool {
        value.as_i64().is_some_and(|n| n > 0)
    }

    fn registry_with(entry: SchemaEntry, bucket: Bucket) -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry.register("k", entry, bucket).unwrap();
        registry
    }

    #[test]
    fn test_component_chain_runs_before_schema_chain() {
        let mut registry = registry_with(
            SchemaEntry::new()
                .sanitize(|v: Value| json!(format!("{}+component", v.as_str().unwrap_or(""))))
                .validate(|v: &Value, _: &mut WarningSink| v.is_string()),
            Bucket::Component,
        );
        registry
            .register(
                "k",
                SchemaEntry::new()
                    .sanitize(|v: Value| json!(format!("{}+schema", v.as_str().unwrap_or("")))),
                Bucket::Schema,
            )
            .unwrap();

        let mut messages = Messages::new();
        let out = SanitizeValidatePipeline::new()
            .process(registry.get("k").unwrap(), json!("v"), &mut messages)
            .unwrap();

        assert_eq!(out, json!("v+component+schema"));
        assert_eq!(messages.notices("k").len(), 1);
    }

    #[test]
    fn test_validators_see_sanitized_value_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::clone(&seen);
        let second = Arc::clone(&seen);

        let mut registry = registry_with(
            SchemaEntry::new()
                .sanitize(|v: Value| json!(v.as_i64().unwrap_or(0) * 2))
                .validate(move |v: &Value, _: &mut WarningSink| {
                    first.lock().unwrap().push(format!("component:{}", v));
                    true
                }),
            Bucket::Component,
        );
        registry
            .register(
                "k",
                SchemaEntry::new().validate(move |v: &Value, _: &mut WarningSink| {
                    second.lock().unwrap().push(format!("schema:{}", v));
                    true
                }),
                Bucket::Schema,
            )
            .unwrap();

        let mut messages = Messages::new();
        SanitizeValidatePipeline::new()
            .process(registry.get("k").unwrap(), json!(4), &mut messages)
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["component:8", "schema:8"]);
    }

    #[test]
    fn test_rejection_short_circuits_and_names_validator() {
        let later_called = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&later_called);

        let registry = registry_with(
            SchemaEntry::new()
                .validate(is_positive_int)
                .validate(move |_: &Value, _: &mut WarningSink| {
                    *flag.lock().unwrap() = true;
                    true
                }),
            Bucket::Schema,
        );

        let mut messages = Messages::new();
        let err = SanitizeValidatePipeline::new()
            .process(registry.get("k").unwrap(), json!(-1), &mut messages)
            .unwrap_err();

        match err {
            OptionsError::Validation {
                key,
                value,
                validator,
            } => {
                assert_eq!(key, "k");
                assert_eq!(value, "-1");
                assert!(validator.starts_with("function "));
                assert!(validator.ends_with("is_positive_int"));
            }
            other => panic!("Expected validation error, got {:?}", other),
        }
        assert!(!*later_called.lock().unwrap());
    }

    #[test]
    fn test_warnings_kept_on_pass_and_fail() {
        let registry = registry_with(
            SchemaEntry::new().validator(Validator::method(
                "Limits",
                "check",
                |v: &Value, w: &mut WarningSink| {
                    w.emit("looked at value");
                    v.as_i64() != Some(0)
                },
            )),
            Bucket::Schema,
        );
        let entry = registry.get("k").unwrap();
        let pipeline = SanitizeValidatePipeline::new();
        let mut messages = Messages::new();

        assert!(pipeline.process(entry, json!(1), &mut messages).is_ok());
        let err = pipeline.process(entry, json!(0), &mut messages).unwrap_err();

        assert_eq!(messages.warnings("k").len(), 2);
        assert!(err.to_string().contains("method Limits::check"));
    }

    #[test]
    fn test_describe_value() {
        assert_eq!(describe_value(&json!([1, 2, 3])), "Array(3)");
        assert_eq!(describe_value(&json!({"a": 1})), "Object(Map)");
        assert_eq!(describe_value(&json!(true)), "true");
        assert_eq!(describe_value(&json!(null)), "null");
        assert_eq!(describe_value(&json!("short")), "\"short\"");

        let long = "x".repeat(150);
        let rendered = describe_value(&json!(long));
        assert!(rendered.ends_with("...\""));
        assert_eq!(rendered.len(), MAX_RENDERED_CHARS + 5);
    }
}
