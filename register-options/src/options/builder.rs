//! Fluent builder API for typed schema entries

use super::callable::{Sanitizer, Validator, WarningSink};
use super::rules::OptionType;
use super::schema::SchemaEntry;
use crate::error::{OptionsError, Result};
use serde_json::Value;

/// Builder for a schema entry backed by an [`OptionType`]
///
/// The type contributes a coercing sanitizer and a constraint validator;
/// further steps can be appended with [`sanitize`](Self::sanitize) and
/// [`validate`](Self::validate).
pub struct SchemaEntryBuilder {
    key: String,
    description: Option<String>,
    ty: Option<OptionType>,
    default: Option<Value>,
    sanitizers: Vec<Sanitizer>,
    validators: Vec<Validator>,
}

impl SchemaEntryBuilder {
    /// Create a new builder for an option key
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            description: None,
            ty: None,
            default: None,
            sanitizers: Vec::new(),
            validators: Vec::new(),
        }
    }

    /// Set the description (help text)
    pub fn description(mut self, desc: &str) -> Self {
        self.description = Some(desc.to_string());
        self
    }

    /// Define as a boolean type with default value
    pub fn bool_type(mut self, default: bool) -> Self {
        self.ty = Some(OptionType::Bool);
        self.default = Some(Value::Bool(default));
        self
    }

    /// Define as an unsigned integer type with default and optional constraints
    pub fn uint_type(mut self, default: u64, min: Option<u64>, max: Option<u64>) -> Self {
        self.ty = Some(OptionType::UInt { min, max });
        self.default = Some(Value::from(default));
        self
    }

    /// Define as a signed integer type with default and optional constraints
    pub fn int_type(mut self, default: i64, min: Option<i64>, max: Option<i64>) -> Self {
        self.ty = Some(OptionType::Int { min, max });
        self.default = Some(Value::from(default));
        self
    }

    /// Define as a float type with default and optional constraints
    pub fn float_type(mut self, default: f64, min: Option<f64>, max: Option<f64>) -> Self {
        self.ty = Some(OptionType::Float { min, max });
        self.default = Some(Value::from(default));
        self
    }

    /// Define as a string type with default and optional max length
    pub fn string_type(mut self, default: &str, max_length: Option<usize>) -> Self {
        self.ty = Some(OptionType::String { max_length });
        self.default = Some(Value::String(default.to_string()));
        self
    }

    /// Define as an enum type with allowed variants and default value
    pub fn enum_type(mut self, variants: Vec<&str>, default: &str) -> Self {
        self.ty = Some(OptionType::Enum {
            variants: variants.iter().map(|s| s.to_string()).collect(),
        });
        self.default = Some(Value::String(default.to_string()));
        self
    }

    pub fn list_type(mut self, default: Vec<Value>) -> Self {
        self.ty = Some(OptionType::List);
        self.default = Some(Value::Array(default));
        self
    }

    pub fn map_type(mut self, default: serde_json::Map<String, Value>) -> Self {
        self.ty = Some(OptionType::Map);
        self.default = Some(Value::Object(default));
        self
    }

    /// Use an already constructed type, with an optional default
    pub fn typed(mut self, ty: OptionType, default: Option<Value>) -> Self {
        self.ty = Some(ty);
        self.default = default;
        self
    }

    pub fn sanitize<F>(mut self, func: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.sanitizers.push(Sanitizer::new(func));
        self
    }

    pub fn validate<F>(mut self, func: F) -> Self
    where
        F: Fn(&Value, &mut WarningSink) -> bool + Send + Sync + 'static,
    {
        self.validators.push(Validator::new(func));
        self
    }

    pub fn sanitizer(mut self, sanitizer: Sanitizer) -> Self {
        self.sanitizers.push(sanitizer);
        self
    }

    pub fn validator(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    /// Build the schema entry
    ///
    /// Returns an error if no type was chosen or the default does not satisfy
    /// the type.
    pub fn build(self) -> Result<SchemaEntry> {
        let ty = self.ty.ok_or_else(|| {
            OptionsError::configuration(format!(
                "option '{}' needs a type (use bool_type, uint_type, enum_type, etc.)",
                self.key
            ))
        })?;

        if let Some(default) = &self.default {
            let coerced = ty.coerce(default.clone());
            ty.validate(&coerced).map_err(|reason| {
                OptionsError::configuration(format!(
                    "default for option '{}' is invalid: {}",
                    self.key, reason
                ))
            })?;
        }

        let mut entry = SchemaEntry::new()
            .sanitizer(Sanitizer::rule(ty.clone()))
            .validator(Validator::rule(ty));
        entry.default = self.default.map(Into::into);
        entry.description = self.description;
        entry.sanitize.extend(self.sanitizers);
        entry.validate.extend(self.validators);
        Ok(entry)
    }
}
