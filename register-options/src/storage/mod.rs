//! Scoped storage backends for options records
//!
//! The storage layer provides:
//! - One uniform contract ([`StorageBackend`]) over every ownership scope
//! - Per-scope autoload semantics
//! - A factory resolving a [`StorageContext`] to a concrete backend
//! - Host platforms: in-memory and SQLite

pub mod blog;
pub mod context;
pub mod factory;
pub mod memory;
pub mod network;
pub mod platform;
pub mod site;
pub mod sqlite;
pub mod user;

pub use blog::BlogStorage;
pub use context::{Scope, StorageContext, UserStorageKind};
pub use factory::StorageFactory;
pub use memory::{MemoryPlatform, PlatformStats, StoredRow};
pub use network::NetworkStorage;
pub use platform::{HostPlatform, Namespace};
pub use site::SiteStorage;
pub use sqlite::SqlitePlatform;
pub use user::UserStorage;

use serde_json::Value;

/// Read/update/add/delete of whole named records within one scope
pub trait StorageBackend: Send + Sync {
    fn scope(&self) -> Scope;

    /// Target sub-site, for blog-scoped backends
    fn blog_id(&self) -> Option<u64> {
        None
    }

    /// Whether an autoload hint passed to `update`/`add` has any effect
    fn supports_autoload(&self) -> bool;

    fn read(&self, key: &str) -> Option<Value>;

    /// Create or replace the record. `autoload: None` keeps the current flag.
    fn update(&self, key: &str, value: &Value, autoload: Option<bool>) -> bool;

    /// Create the record; fails if it already exists
    fn add(&self, key: &str, value: &Value, autoload: Option<bool>) -> bool;

    fn delete(&self, key: &str) -> bool;
}
