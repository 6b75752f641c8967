//! Host platform primitives the storage backends are built on
//!
//! A host stores named JSON rows in a handful of namespaces. The backends in
//! this module's siblings map a [`StorageContext`](super::StorageContext) onto
//! one of these namespaces and add the per-scope autoload semantics.

use serde_json::Value;
use std::fmt;

/// Row namespace on the host platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Site,
    Network,
    Blog(u64),
    UserMeta(u64),
    /// `blog_id: None` is the network-global user option row
    UserOption { user_id: u64, blog_id: Option<u64> },
}

impl Namespace {
    /// Stable (kind, entity) pair used as a storage address
    pub fn address(&self) -> (String, u64) {
        match self {
            Namespace::Site => ("site".to_string(), 0),
            Namespace::Network => ("network".to_string(), 0),
            Namespace::Blog(id) => ("blog".to_string(), *id),
            Namespace::UserMeta(id) => ("user_meta".to_string(), *id),
            Namespace::UserOption {
                user_id,
                blog_id: None,
            } => ("user_option".to_string(), *user_id),
            Namespace::UserOption {
                user_id,
                blog_id: Some(blog),
            } => (format!("user_option:{}", blog), *user_id),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (kind, entity) = self.address();
        write!(f, "{}#{}", kind, entity)
    }
}

/// Raw read/write primitives of the embedding host
///
/// `write` is an upsert, `insert` fails when the row already exists and
/// `remove` fails when it does not. Failures are reported as `false`; the
/// engine never retries.
pub trait HostPlatform: Send + Sync {
    /// Sub-site the current request runs against
    fn current_blog_id(&self) -> u64;

    fn read(&self, ns: Namespace, name: &str) -> Option<Value>;

    fn write(&self, ns: Namespace, name: &str, value: &Value, autoload: Option<bool>) -> bool;

    fn insert(&self, ns: Namespace, name: &str, value: &Value, autoload: Option<bool>) -> bool;

    fn remove(&self, ns: Namespace, name: &str) -> bool;
}
