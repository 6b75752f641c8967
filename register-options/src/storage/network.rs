//! Network-wide option rows

use super::platform::{HostPlatform, Namespace};
use super::{Scope, StorageBackend};
use serde_json::Value;
use std::sync::Arc;

/// Network scope has no autoload concept; hints are dropped
pub struct NetworkStorage {
    platform: Arc<dyn HostPlatform>,
}

impl NetworkStorage {
    pub fn new(platform: Arc<dyn HostPlatform>) -> Self {
        Self { platform }
    }
}

impl StorageBackend for NetworkStorage {
    fn scope(&self) -> Scope {
        Scope::Network
    }

    fn supports_autoload(&self) -> bool {
        false
    }

    fn read(&self, key: &str) -> Option<Value> {
        self.platform.read(Namespace::Network, key)
    }

    fn update(&self, key: &str, value: &Value, autoload: Option<bool>) -> bool {
        if autoload.is_some() {
            log::debug!("Network storage ignores autoload hint for '{}'", key);
        }
        self.platform.write(Namespace::Network, key, value, None)
    }

    fn add(&self, key: &str, value: &Value, autoload: Option<bool>) -> bool {
        if autoload.is_some() {
            log::debug!("Network storage ignores autoload hint for '{}'", key);
        }
        self.platform.insert(Namespace::Network, key, value, None)
    }

    fn delete(&self, key: &str) -> bool {
        self.platform.remove(Namespace::Network, key)
    }
}
