//! Built-in typed rules and common validators/sanitizers

use super::callable::{SanitizeRule, ValidationRule, WarningSink};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// Type definition with constraints for validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OptionType {
    Bool,
    Int {
        min: Option<i64>,
        max: Option<i64>,
    },
    UInt {
        min: Option<u64>,
        max: Option<u64>,
    },
    Float {
        min: Option<f64>,
        max: Option<f64>,
    },
    String {
        max_length: Option<usize>,
    },
    Enum {
        variants: Vec<String>,
    },
    List,
    Map,
}

impl OptionType {
    pub fn label(&self) -> &'static str {
        match self {
            OptionType::Bool => "bool",
            OptionType::Int { .. } => "int",
            OptionType::UInt { .. } => "uint",
            OptionType::Float { .. } => "float",
            OptionType::String { .. } => "string",
            OptionType::Enum { .. } => "enum",
            OptionType::List => "list",
            OptionType::Map => "map",
        }
    }

    /// Check if a value has this type's JSON shape
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            OptionType::Bool => value.is_boolean(),
            OptionType::Int { .. } => value.is_i64(),
            OptionType::UInt { .. } => value.is_u64(),
            OptionType::Float { .. } => value.is_number(),
            OptionType::String { .. } | OptionType::Enum { .. } => value.is_string(),
            OptionType::List => value.is_array(),
            OptionType::Map => value.is_object(),
        }
    }

    /// Convert loosely typed input (form strings, integral floats) into this
    /// type's shape. Values that cannot be converted are returned unchanged
    /// so the validator can reject them.
    pub fn coerce(&self, value: Value) -> Value {
        match (self, value) {
            (OptionType::Bool, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Value::Bool(true),
                "false" | "0" | "no" | "off" | "" => Value::Bool(false),
                _ => Value::String(s),
            },
            (OptionType::Bool, Value::Number(n)) => match n.as_i64() {
                Some(0) => Value::Bool(false),
                Some(1) => Value::Bool(true),
                _ => Value::Number(n),
            },
            (OptionType::Int { .. }, Value::String(s)) => match s.trim().parse::<i64>() {
                Ok(n) => Value::from(n),
                Err(_) => Value::String(s),
            },
            (OptionType::UInt { .. }, Value::String(s)) => match s.trim().parse::<u64>() {
                Ok(n) => Value::from(n),
                Err(_) => Value::String(s),
            },
            (OptionType::Int { .. } | OptionType::UInt { .. }, Value::Number(n)) => integral(n),
            (OptionType::Float { .. }, Value::String(s)) => {
                match s.trim().parse::<f64>().ok().and_then(Number::from_f64) {
                    Some(n) => Value::Number(n),
                    None => Value::String(s),
                }
            }
            (OptionType::String { .. } | OptionType::Enum { .. }, Value::Number(n)) => {
                Value::String(n.to_string())
            }
            (OptionType::String { .. } | OptionType::Enum { .. }, Value::Bool(b)) => {
                Value::String(b.to_string())
            }
            (OptionType::List, Value::String(s)) => Value::Array(
                s.split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(|item| Value::String(item.to_string()))
                    .collect(),
            ),
            (_, other) => other,
        }
    }

    /// Validate that a value meets the constraints for this type
    pub fn validate(&self, value: &Value) -> std::result::Result<(), String> {
        if !self.matches(value) {
            return Err(format!("Type mismatch: expected {}, got {}", self.label(), value));
        }

        match self {
            OptionType::Int { min, max } => {
                let v = value.as_i64().unwrap_or_default();
                check_range(v, *min, *max)
            }
            OptionType::UInt { min, max } => {
                let v = value.as_u64().unwrap_or_default();
                check_range(v, *min, *max)
            }
            OptionType::Float { min, max } => {
                let v = value.as_f64().unwrap_or_default();
                check_range(v, *min, *max)
            }
            OptionType::String { max_length } => {
                let len = value.as_str().map(|s| s.chars().count()).unwrap_or(0);
                match max_length {
                    Some(max_length) if len > *max_length => Err(format!(
                        "String length {} exceeds maximum {}",
                        len, max_length
                    )),
                    _ => Ok(()),
                }
            }
            OptionType::Enum { variants } => {
                let v = value.as_str().unwrap_or_default();
                if variants.iter().any(|variant| variant == v) {
                    Ok(())
                } else {
                    Err(format!(
                        "Value '{}' is not a valid variant. Valid values: {:?}",
                        v, variants
                    ))
                }
            }
            _ => Ok(()),
        }
    }
}

fn check_range<T: PartialOrd + std::fmt::Display>(
    v: T,
    min: Option<T>,
    max: Option<T>,
) -> std::result::Result<(), String> {
    if let Some(min) = min {
        if v < min {
            return Err(format!("Value {} is below minimum {}", v, min));
        }
    }
    if let Some(max) = max {
        if v > max {
            return Err(format!("Value {} is above maximum {}", v, max));
        }
    }
    Ok(())
}

/// `3.0` -> `3`; anything else unchanged
fn integral(n: Number) -> Value {
    match n.as_f64() {
        Some(f) if !n.is_i64() && !n.is_u64() && f.fract() == 0.0 => {
            if f >= 0.0 && f <= u64::MAX as f64 {
                Value::from(f as u64)
            } else if f < 0.0 && f >= i64::MIN as f64 {
                Value::from(f as i64)
            } else {
                Value::Number(n)
            }
        }
        _ => Value::Number(n),
    }
}

impl ValidationRule for OptionType {
    fn check(&self, value: &Value, warnings: &mut WarningSink) -> bool {
        match self.validate(value) {
            Ok(()) => true,
            Err(reason) => {
                warnings.emit(reason);
                false
            }
        }
    }

    fn name(&self) -> String {
        format!("OptionType::{}", self.label())
    }

    fn fingerprint(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

impl SanitizeRule for OptionType {
    fn sanitize(&self, value: Value) -> Value {
        self.coerce(value)
    }

    fn name(&self) -> String {
        format!("OptionType::{}", self.label())
    }

    fn fingerprint(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

pub fn is_positive_int(value: &Value, _: &mut WarningSink) -> bool {
    value.as_i64().is_some_and(|n| n > 0)
}

pub fn is_non_negative_int(value: &Value, _: &mut WarningSink) -> bool {
    value.as_i64().is_some_and(|n| n >= 0)
}

pub fn is_non_empty_string(value: &Value, _: &mut WarningSink) -> bool {
    value.as_str().is_some_and(|s| !s.trim().is_empty())
}

pub fn is_bool(value: &Value, _: &mut WarningSink) -> bool {
    value.is_boolean()
}

pub fn is_string(value: &Value, _: &mut WarningSink) -> bool {
    value.is_string()
}

pub fn is_list(value: &Value, _: &mut WarningSink) -> bool {
    value.is_array()
}

pub fn is_map(value: &Value, _: &mut WarningSink) -> bool {
    value.is_object()
}

pub fn trim_string(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.trim().to_string()),
        other => other,
    }
}

pub fn to_lowercase(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.to_lowercase()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bool_coercion() {
        let ty = OptionType::Bool;
        assert_eq!(ty.coerce(json!("yes")), json!(true));
        assert_eq!(ty.coerce(json!(" Off ")), json!(false));
        assert_eq!(ty.coerce(json!(1)), json!(true));
        assert_eq!(ty.coerce(json!("maybe")), json!("maybe"));
        assert!(ty.validate(&json!("maybe")).is_err());
    }

    #[test]
    fn test_uint_constraints() {
        let ty = OptionType::UInt {
            min: Some(1),
            max: Some(10),
        };
        assert_eq!(ty.coerce(json!("5")), json!(5));
        assert_eq!(ty.coerce(json!(4.0)), json!(4));
        assert!(ty.validate(&json!(5)).is_ok());
        assert_eq!(
            ty.validate(&json!(0)).unwrap_err(),
            "Value 0 is below minimum 1"
        );
        assert_eq!(
            ty.validate(&json!(11)).unwrap_err(),
            "Value 11 is above maximum 10"
        );
        assert!(ty.validate(&json!(-1)).is_err());
    }

    #[test]
    fn test_float_and_int() {
        let float = OptionType::Float {
            min: Some(0.0),
            max: Some(1.0),
        };
        assert_eq!(float.coerce(json!("0.5")), json!(0.5));
        assert!(float.validate(&json!(1.5)).is_err());

        let int = OptionType::Int {
            min: Some(-5),
            max: None,
        };
        assert_eq!(int.coerce(json!(" -3 ")), json!(-3));
        assert!(int.validate(&json!(-3)).is_ok());
        assert!(int.validate(&json!(-6)).is_err());
    }

    #[test]
    fn test_string_and_enum() {
        let string = OptionType::String {
            max_length: Some(3),
        };
        assert_eq!(string.coerce(json!(42)), json!("42"));
        assert!(string.validate(&json!("abcd")).is_err());

        let variants = OptionType::Enum {
            variants: vec!["click".to_string(), "hover".to_string()],
        };
        assert!(variants.validate(&json!("hover")).is_ok());
        let err = variants.validate(&json!("drag")).unwrap_err();
        assert!(err.contains("not a valid variant"));
    }

    #[test]
    fn test_list_from_comma_string() {
        assert_eq!(OptionType::List.coerce(json!("a, b,,c")), json!(["a", "b", "c"]));
        assert!(OptionType::Map.validate(&json!([])).is_err());
    }

    #[test]
    fn test_rule_emits_reason_as_warning() {
        let ty = OptionType::UInt {
            min: Some(1),
            max: None,
        };
        let mut warnings = WarningSink::new();
        assert!(!ty.check(&json!(0), &mut warnings));
        assert_eq!(warnings.into_vec(), vec!["Value 0 is below minimum 1".to_string()]);
        assert_eq!(ValidationRule::name(&ty), "OptionType::uint");
    }

    #[test]
    fn test_free_functions() {
        let mut sink = WarningSink::new();
        assert!(is_positive_int(&json!(1), &mut sink));
        assert!(!is_positive_int(&json!(0), &mut sink));
        assert!(is_non_negative_int(&json!(0), &mut sink));
        assert!(!is_non_empty_string(&json!("  "), &mut sink));
        assert_eq!(trim_string(json!(" a ")), json!("a"));
        assert_eq!(to_lowercase(json!("AbC")), json!("abc"));
    }
}
