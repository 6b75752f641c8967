//! Per-sub-site option rows

use super::platform::{HostPlatform, Namespace};
use super::{Scope, StorageBackend};
use serde_json::Value;
use std::sync::Arc;

/// Sub-site scope
///
/// Autoload only applies when the target sub-site is the one the host is
/// currently running against; cross-site writes drop the hint. The check is
/// made at call time because the host may switch sites between calls.
pub struct BlogStorage {
    platform: Arc<dyn HostPlatform>,
    blog_id: u64,
}

impl BlogStorage {
    pub fn new(platform: Arc<dyn HostPlatform>, blog_id: u64) -> Self {
        Self { platform, blog_id }
    }

    fn namespace(&self) -> Namespace {
        Namespace::Blog(self.blog_id)
    }

    fn effective_autoload(&self, key: &str, autoload: Option<bool>) -> Option<bool> {
        if self.supports_autoload() {
            autoload
        } else {
            if autoload.is_some() {
                log::debug!(
                    "Dropping autoload hint for '{}': blog {} is not the current blog",
                    key,
                    self.blog_id
                );
            }
            None
        }
    }
}

impl StorageBackend for BlogStorage {
    fn scope(&self) -> Scope {
        Scope::Blog
    }

    fn blog_id(&self) -> Option<u64> {
        Some(self.blog_id)
    }

    fn supports_autoload(&self) -> bool {
        self.platform.current_blog_id() == self.blog_id
    }

    fn read(&self, key: &str) -> Option<Value> {
        self.platform.read(self.namespace(), key)
    }

    fn update(&self, key: &str, value: &Value, autoload: Option<bool>) -> bool {
        let autoload = self.effective_autoload(key, autoload);
        self.platform.write(self.namespace(), key, value, autoload)
    }

    fn add(&self, key: &str, value: &Value, autoload: Option<bool>) -> bool {
        let autoload = self.effective_autoload(key, autoload);
        self.platform.insert(self.namespace(), key, value, autoload)
    }

    fn delete(&self, key: &str) -> bool {
        self.platform.remove(self.namespace(), key)
    }
}
