//! On-disk schema descriptions (TOML or JSON)
//!
//! ```toml
//! [options.retries]
//! type = "uint"
//! default = 3
//! min = 1
//! max = 10
//! description = "Maximum number of retries"
//! validators = ["positive_int"]
//! ```

use super::builder::SchemaEntryBuilder;
use super::callable::{Sanitizer, Validator};
use super::rules::{self, OptionType};
use super::schema::Schema;
use crate::error::{OptionsError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaDescriptor {
    #[serde(default)]
    pub options: BTreeMap<String, OptionDescriptor>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OptionDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    pub default: Option<Value>,
    pub description: Option<String>,
    pub min: Option<Value>,
    pub max: Option<Value>,
    pub max_length: Option<usize>,
    #[serde(default)]
    pub variants: Vec<String>,
    /// Names of built-in sanitizers run after the type's coercion
    #[serde(default)]
    pub sanitizers: Vec<String>,
    /// Names of built-in validators run after the type check
    #[serde(default)]
    pub validators: Vec<String>,
}

impl SchemaDescriptor {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text)
            .map_err(|e| OptionsError::configuration(format!("invalid schema TOML: {}", e)))
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| OptionsError::configuration(format!("invalid schema JSON: {}", e)))
    }

    /// Build registrable entries, in key order
    pub fn into_schema(self) -> Result<Schema> {
        let mut schema = Schema::new();
        for (key, option) in self.options {
            let entry = option.into_builder(&key)?.build()?;
            schema.insert(&key, entry);
        }
        Ok(schema)
    }
}

impl OptionDescriptor {
    fn option_type(&self, key: &str) -> Result<OptionType> {
        let ty = match self.kind.trim().to_ascii_lowercase().as_str() {
            "bool" => OptionType::Bool,
            "int" => OptionType::Int {
                min: bound(key, "min", &self.min, Value::as_i64)?,
                max: bound(key, "max", &self.max, Value::as_i64)?,
            },
            "uint" => OptionType::UInt {
                min: bound(key, "min", &self.min, Value::as_u64)?,
                max: bound(key, "max", &self.max, Value::as_u64)?,
            },
            "float" => OptionType::Float {
                min: bound(key, "min", &self.min, Value::as_f64)?,
                max: bound(key, "max", &self.max, Value::as_f64)?,
            },
            "string" => OptionType::String {
                max_length: self.max_length,
            },
            "enum" => {
                if self.variants.is_empty() {
                    return Err(OptionsError::configuration(format!(
                        "enum option '{}' declares no variants",
                        key
                    )));
                }
                OptionType::Enum {
                    variants: self.variants.clone(),
                }
            }
            "list" => OptionType::List,
            "map" => OptionType::Map,
            other => {
                return Err(OptionsError::configuration(format!(
                    "option '{}' has unknown type '{}'",
                    key, other
                )));
            }
        };
        Ok(ty)
    }

    fn into_builder(self, key: &str) -> Result<SchemaEntryBuilder> {
        let ty = self.option_type(key)?;
        let mut builder = SchemaEntryBuilder::new(key).typed(ty, self.default);
        if let Some(description) = &self.description {
            builder = builder.description(description);
        }
        for name in &self.sanitizers {
            builder = builder.sanitizer(named_sanitizer(key, name)?);
        }
        for name in &self.validators {
            builder = builder.validator(named_validator(key, name)?);
        }
        Ok(builder)
    }
}

fn bound<T>(
    key: &str,
    field: &str,
    raw: &Option<Value>,
    convert: impl Fn(&Value) -> Option<T>,
) -> Result<Option<T>> {
    match raw {
        None => Ok(None),
        Some(value) => convert(value).map(Some).ok_or_else(|| {
            OptionsError::configuration(format!(
                "option '{}' has an invalid {} bound: {}",
                key, field, value
            ))
        }),
    }
}

fn named_sanitizer(key: &str, name: &str) -> Result<Sanitizer> {
    match name {
        "trim" => Ok(Sanitizer::new(rules::trim_string)),
        "lowercase" => Ok(Sanitizer::new(rules::to_lowercase)),
        other => Err(OptionsError::configuration(format!(
            "option '{}' references unknown sanitizer '{}'",
            key, other
        ))),
    }
}

fn named_validator(key: &str, name: &str) -> Result<Validator> {
    match name {
        "positive_int" => Ok(Validator::new(rules::is_positive_int)),
        "non_negative_int" => Ok(Validator::new(rules::is_non_negative_int)),
        "non_empty_string" => Ok(Validator::new(rules::is_non_empty_string)),
        other => Err(OptionsError::configuration(format!(
            "option '{}' references unknown validator '{}'",
            key, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SCHEMA: &str = r#"
[options.retries]
type = "uint"
default = 3
min = 1
max = 10
description = "Maximum number of retries"

[options.mode]
type = "enum"
variants = ["click", "hover"]
default = "hover"
sanitizers = ["trim", "lowercase"]

[options.ratio]
type = "float"
min = 0
max = 1
"#;

    #[test]
    fn test_parse_toml_schema() {
        let descriptor = SchemaDescriptor::from_toml_str(SCHEMA).unwrap();
        assert_eq!(descriptor.options.len(), 3);

        let schema = descriptor.into_schema().unwrap();
        let keys: Vec<&str> = schema.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["mode", "ratio", "retries"]);

        let (_, mode) = schema.iter().find(|(k, _)| *k == "mode").unwrap();
        assert_eq!(mode.sanitize.len(), 3);
        let sanitized = mode
            .sanitize
            .iter()
            .fold(json!("  HOVER "), |v, s| s.apply(v));
        assert_eq!(sanitized, json!("hover"));
    }

    #[test]
    fn test_reregistered_descriptor_merges_once() {
        use crate::options::schema::{Bucket, SchemaRegistry};

        let schema = || SchemaDescriptor::from_toml_str(SCHEMA).unwrap().into_schema().unwrap();

        let mut once = SchemaRegistry::new();
        once.register_all(schema(), Bucket::Schema).unwrap();
        let mut twice = SchemaRegistry::new();
        twice.register_all(schema(), Bucket::Schema).unwrap();
        twice.register_all(schema(), Bucket::Schema).unwrap();

        for key in ["retries", "mode", "ratio"] {
            let summary = twice.get(key).unwrap().summary();
            assert_eq!(once.get(key).unwrap().summary(), summary);
        }
        assert_eq!(twice.get("retries").unwrap().validators().len(), 1);
        assert_eq!(twice.get("mode").unwrap().sanitizers().len(), 3);
    }

    #[test]
    fn test_parse_json_schema() {
        let descriptor = SchemaDescriptor::from_json_str(
            r#"{"options": {"name": {"type": "string", "max_length": 8, "validators": ["non_empty_string"]}}}"#,
        )
        .unwrap();
        let schema = descriptor.into_schema().unwrap();
        let (_, name) = schema.iter().next().unwrap();
        assert_eq!(name.validate.len(), 2);
        assert!(name.default.is_none());
    }

    #[test]
    fn test_rejects_unknown_names() {
        let unknown_type = SchemaDescriptor::from_toml_str("[options.a]\ntype = \"date\"\n")
            .unwrap()
            .into_schema();
        assert!(unknown_type.unwrap_err().is_configuration());

        let unknown_validator =
            SchemaDescriptor::from_toml_str("[options.a]\ntype = \"int\"\nvalidators = [\"prime\"]\n")
                .unwrap()
                .into_schema();
        assert!(unknown_validator.is_err());

        let unknown_field = SchemaDescriptor::from_toml_str("[options.a]\ntype = \"int\"\ncolour = 1\n");
        assert!(unknown_field.is_err());
    }

    #[test]
    fn test_enum_requires_variants() {
        let result = SchemaDescriptor::from_toml_str("[options.a]\ntype = \"enum\"\n")
            .unwrap()
            .into_schema();
        assert!(result.is_err());
    }
}
