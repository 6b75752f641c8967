//! Command-line configuration
//!
//! Settings are layered: `config.toml` in the user's config directory, then
//! environment variables (`.env` files included), then command-line flags.

use crate::storage::StorageContext;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

pub const ENV_DATABASE: &str = "REGISTER_OPTIONS_DB";
pub const ENV_RECORD: &str = "REGISTER_OPTIONS_RECORD";

const DEFAULT_RECORD: &str = "register_options";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    /// SQLite database file; defaults to `options.db` in the config directory
    pub database: Option<PathBuf>,
    /// Name of the options record to manage
    pub record: String,
    pub scope: String,
    pub blog_id: Option<u64>,
    pub user_id: Option<u64>,
    /// `meta` or `option`
    pub user_storage: Option<String>,
    /// Share per-user option rows across every sub-site
    pub user_global: bool,
    /// Sub-site the platform treats as current
    pub current_blog: u64,
    /// Restrict writes to this user's own user-scoped record
    pub acting_user: Option<u64>,
    /// Allow-list used together with `acting_user`
    pub self_service_keys: Vec<String>,
    pub autoload: Option<bool>,
    /// TOML or JSON schema descriptor
    pub schema: Option<PathBuf>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            database: None,
            record: DEFAULT_RECORD.to_string(),
            scope: "site".to_string(),
            blog_id: None,
            user_id: None,
            user_storage: None,
            user_global: false,
            current_blog: 1,
            acting_user: None,
            self_service_keys: Vec::new(),
            autoload: None,
            schema: None,
        }
    }
}

impl CliConfig {
    /// Directory holding `config.toml` and the default database
    pub fn config_dir() -> Result<PathBuf> {
        let dir = if cfg!(target_os = "linux") {
            dirs::config_dir()
                .context("Failed to get XDG config directory")?
                .join("register-options")
        } else {
            dirs::home_dir()
                .context("Failed to get home directory")?
                .join(".register-options")
        };
        Ok(dir)
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load `config.toml` and apply environment overrides
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = Self::load_from(&path)?;
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Parse a config file; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml_str(&text).with_context(|| format!("Invalid config file: {:?}", path))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse config TOML")
    }

    /// Override settings from environment variables looked up by `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(db) = lookup(ENV_DATABASE).filter(|v| !v.trim().is_empty()) {
            log::debug!("{} overrides database path", ENV_DATABASE);
            self.database = Some(PathBuf::from(db));
        }
        if let Some(record) = lookup(ENV_RECORD).filter(|v| !v.trim().is_empty()) {
            log::debug!("{} overrides record name", ENV_RECORD);
            self.record = record;
        }
    }

    /// Get the path to the SQLite database file
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::config_dir()?.join("options.db")),
        }
    }

    /// Loosely typed descriptor for [`StorageContext::from_descriptor`]
    pub fn storage_descriptor(&self) -> Value {
        let mut descriptor = Map::new();
        if let Some(blog_id) = self.blog_id {
            descriptor.insert("blog_id".to_string(), Value::from(blog_id));
        }
        if let Some(user_id) = self.user_id {
            descriptor.insert("user_id".to_string(), Value::from(user_id));
        }
        if let Some(kind) = &self.user_storage {
            descriptor.insert("user_storage".to_string(), Value::String(kind.clone()));
        }
        if self.user_global {
            descriptor.insert("global".to_string(), Value::Bool(true));
        }
        Value::Object(descriptor)
    }

    pub fn storage_context(&self) -> Result<StorageContext> {
        StorageContext::from_descriptor(&self.scope, &self.storage_descriptor())
            .with_context(|| format!("Invalid storage settings for scope '{}'", self.scope))
    }
}
