//! Core types for the options system

use crate::error::{OptionsError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// A normalized option key
///
/// Normalization trims, lowercases ASCII and keeps `[a-z0-9_.-]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OptionKey(String);

impl OptionKey {
    pub fn new(raw: &str) -> Result<Self> {
        let normalized: String = raw
            .trim()
            .chars()
            .map(|c| c.to_ascii_lowercase())
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            .collect();

        if normalized.is_empty() {
            return Err(OptionsError::configuration(format!(
                "option key '{}' is empty after normalization",
                raw
            )));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for OptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for OptionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Diagnostics attached to one key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KeyMessages {
    pub warnings: Vec<String>,
    pub notices: Vec<String>,
}

impl KeyMessages {
    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty() && self.notices.is_empty()
    }
}

/// Per-key warnings and notices gathered while sanitizing and validating
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Messages {
    entries: BTreeMap<String, KeyMessages>,
}

impl Messages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, key: &str, text: impl Into<String>) {
        self.entries
            .entry(key.to_string())
            .or_default()
            .warnings
            .push(text.into());
    }

    pub fn notice(&mut self, key: &str, text: impl Into<String>) {
        self.entries
            .entry(key.to_string())
            .or_default()
            .notices
            .push(text.into());
    }

    pub fn get(&self, key: &str) -> Option<&KeyMessages> {
        self.entries.get(key)
    }

    pub fn warnings(&self, key: &str) -> &[String] {
        self.entries
            .get(key)
            .map(|m| m.warnings.as_slice())
            .unwrap_or(&[])
    }

    pub fn notices(&self, key: &str) -> &[String] {
        self.entries
            .get(key)
            .map(|m| m.notices.as_slice())
            .unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &KeyMessages)> {
        self.entries.iter()
    }

    /// Number of keys carrying at least one warning or notice
    pub fn len(&self) -> usize {
        self.entries.values().filter(|m| !m.is_empty()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
