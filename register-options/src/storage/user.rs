//! Per-user option records

use super::platform::{HostPlatform, Namespace};
use super::{Scope, StorageBackend, UserStorageKind};
use serde_json::Value;
use std::sync::Arc;

/// User scope, stored either as user meta or as a consolidated user option
///
/// Non-global user options are keyed by the sub-site that is current when the
/// call is made. Autoload is never supported.
pub struct UserStorage {
    platform: Arc<dyn HostPlatform>,
    user_id: u64,
    kind: UserStorageKind,
    global: bool,
}

impl UserStorage {
    pub fn new(
        platform: Arc<dyn HostPlatform>,
        user_id: u64,
        kind: UserStorageKind,
        global: bool,
    ) -> Self {
        Self {
            platform,
            user_id,
            kind,
            global,
        }
    }

    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    pub fn kind(&self) -> UserStorageKind {
        self.kind
    }

    fn namespace(&self) -> Namespace {
        match self.kind {
            UserStorageKind::Meta => Namespace::UserMeta(self.user_id),
            UserStorageKind::Option => Namespace::UserOption {
                user_id: self.user_id,
                blog_id: if self.global {
                    None
                } else {
                    Some(self.platform.current_blog_id())
                },
            },
        }
    }
}

impl StorageBackend for UserStorage {
    fn scope(&self) -> Scope {
        Scope::User
    }

    fn supports_autoload(&self) -> bool {
        false
    }

    fn read(&self, key: &str) -> Option<Value> {
        self.platform.read(self.namespace(), key)
    }

    fn update(&self, key: &str, value: &Value, _autoload: Option<bool>) -> bool {
        self.platform.write(self.namespace(), key, value, None)
    }

    fn add(&self, key: &str, value: &Value, _autoload: Option<bool>) -> bool {
        self.platform.insert(self.namespace(), key, value, None)
    }

    fn delete(&self, key: &str) -> bool {
        self.platform.remove(self.namespace(), key)
    }
}
