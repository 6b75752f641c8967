//! Error types for the options engine
//!
//! Only programmer misconfiguration and rejected values are errors. Policy
//! denials and backend refusals are reported as `Ok(false)` by the mutating
//! calls so callers can branch on "was this persisted" directly.

use thiserror::Error;

/// Errors raised by schema registration, storage resolution and validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionsError {
    /// Misconfiguration: missing validators, bad storage descriptor,
    /// unregistered key, empty key.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A candidate value was rejected by one of the key's validators.
    #[error("validation failed for option \"{key}\" with value {value} ({validator})")]
    Validation {
        key: String,
        value: String,
        validator: String,
    },
}

impl OptionsError {
    pub fn configuration(message: impl Into<String>) -> Self {
        OptionsError::Configuration(message.into())
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, OptionsError::Configuration(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, OptionsError::Validation { .. })
    }
}

pub type Result<T> = std::result::Result<T, OptionsError>;
