//! Site-wide option rows

use super::platform::{HostPlatform, Namespace};
use super::{Scope, StorageBackend};
use serde_json::Value;
use std::sync::Arc;

/// Site scope supports the autoload hint natively
pub struct SiteStorage {
    platform: Arc<dyn HostPlatform>,
}

impl SiteStorage {
    pub fn new(platform: Arc<dyn HostPlatform>) -> Self {
        Self { platform }
    }
}

impl StorageBackend for SiteStorage {
    fn scope(&self) -> Scope {
        Scope::Site
    }

    fn supports_autoload(&self) -> bool {
        true
    }

    fn read(&self, key: &str) -> Option<Value> {
        self.platform.read(Namespace::Site, key)
    }

    fn update(&self, key: &str, value: &Value, autoload: Option<bool>) -> bool {
        self.platform.write(Namespace::Site, key, value, autoload)
    }

    fn add(&self, key: &str, value: &Value, autoload: Option<bool>) -> bool {
        self.platform.insert(Namespace::Site, key, value, autoload)
    }

    fn delete(&self, key: &str) -> bool {
        self.platform.remove(Namespace::Site, key)
    }
}
