//! In-process host platform
//!
//! Keeps rows in a map and counts every primitive call, which makes it the
//! platform of choice for tests and for dry runs.

use super::platform::{HostPlatform, Namespace};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A stored row and the autoload flag it was written with
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub value: Value,
    pub autoload: Option<bool>,
}

/// Primitive call counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PlatformStats {
    pub reads: usize,
    pub writes: usize,
    pub inserts: usize,
    pub removes: usize,
}

impl PlatformStats {
    /// Every call that attempted to change a row
    pub fn mutations(&self) -> usize {
        self.writes + self.inserts + self.removes
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    rows: HashMap<(Namespace, String), StoredRow>,
    stats: PlatformStats,
    fail_writes: bool,
}

/// Thread-safe in-memory [`HostPlatform`]
#[derive(Debug)]
pub struct MemoryPlatform {
    state: Mutex<MemoryState>,
    current_blog: AtomicU64,
}

impl Default for MemoryPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPlatform {
    /// Empty platform whose current sub-site is 1
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            current_blog: AtomicU64::new(1),
        }
    }

    pub fn with_current_blog(blog_id: u64) -> Self {
        let platform = Self::new();
        platform.set_current_blog(blog_id);
        platform
    }

    pub fn set_current_blog(&self, blog_id: u64) {
        self.current_blog.store(blog_id, Ordering::SeqCst);
    }

    /// Place a row directly, bypassing the counters
    pub fn seed(&self, ns: Namespace, name: &str, value: Value) {
        self.state().rows.insert(
            (ns, name.to_string()),
            StoredRow {
                value,
                autoload: None,
            },
        );
    }

    /// Inspect a row without counting a read
    pub fn row(&self, ns: Namespace, name: &str) -> Option<StoredRow> {
        self.state().rows.get(&(ns, name.to_string())).cloned()
    }

    pub fn stats(&self) -> PlatformStats {
        self.state().stats
    }

    pub fn reset_stats(&self) {
        self.state().stats = PlatformStats::default();
    }

    /// Make every mutating primitive report failure
    pub fn fail_writes(&self, fail: bool) {
        self.state().fail_writes = fail;
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl HostPlatform for MemoryPlatform {
    fn current_blog_id(&self) -> u64 {
        self.current_blog.load(Ordering::SeqCst)
    }

    fn read(&self, ns: Namespace, name: &str) -> Option<Value> {
        let mut state = self.state();
        state.stats.reads += 1;
        state
            .rows
            .get(&(ns, name.to_string()))
            .map(|row| row.value.clone())
    }

    fn write(&self, ns: Namespace, name: &str, value: &Value, autoload: Option<bool>) -> bool {
        let mut state = self.state();
        state.stats.writes += 1;
        if state.fail_writes {
            return false;
        }

        let row = state
            .rows
            .entry((ns, name.to_string()))
            .or_insert_with(|| StoredRow {
                value: Value::Null,
                autoload: None,
            });
        row.value = value.clone();
        if autoload.is_some() {
            row.autoload = autoload;
        }
        true
    }

    fn insert(&self, ns: Namespace, name: &str, value: &Value, autoload: Option<bool>) -> bool {
        let mut state = self.state();
        state.stats.inserts += 1;
        if state.fail_writes {
            return false;
        }

        let key = (ns, name.to_string());
        if state.rows.contains_key(&key) {
            return false;
        }
        state.rows.insert(
            key,
            StoredRow {
                value: value.clone(),
                autoload,
            },
        );
        true
    }

    fn remove(&self, ns: Namespace, name: &str) -> bool {
        let mut state = self.state();
        state.stats.removes += 1;
        if state.fail_writes {
            return false;
        }
        state.rows.remove(&(ns, name.to_string())).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_refuses_existing_rows() {
        let platform = MemoryPlatform::new();
        assert!(platform.insert(Namespace::Site, "a", &json!(1), Some(true)));
        assert!(!platform.insert(Namespace::Site, "a", &json!(2), None));

        let row = platform.row(Namespace::Site, "a").unwrap();
        assert_eq!(row.value, json!(1));
        assert_eq!(row.autoload, Some(true));
        assert_eq!(platform.stats().inserts, 2);
    }

    #[test]
    fn test_write_keeps_autoload_when_not_given() {
        let platform = MemoryPlatform::new();
        platform.insert(Namespace::Site, "a", &json!(1), Some(false));
        platform.write(Namespace::Site, "a", &json!(2), None);

        let row = platform.row(Namespace::Site, "a").unwrap();
        assert_eq!(row.value, json!(2));
        assert_eq!(row.autoload, Some(false));
    }

    #[test]
    fn test_failure_injection() {
        let platform = MemoryPlatform::new();
        platform.fail_writes(true);
        assert!(!platform.write(Namespace::Network, "a", &json!(1), None));
        assert!(!platform.insert(Namespace::Network, "a", &json!(1), None));
        assert!(platform.read(Namespace::Network, "a").is_none());
        assert_eq!(platform.stats().mutations(), 2);
        assert_eq!(platform.stats().reads, 1);
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let platform = MemoryPlatform::new();
        platform.seed(Namespace::Blog(2), "a", json!("two"));
        platform.seed(Namespace::Blog(3), "a", json!("three"));

        assert_eq!(platform.read(Namespace::Blog(2), "a"), Some(json!("two")));
        assert_eq!(platform.read(Namespace::Blog(3), "a"), Some(json!("three")));
        assert_eq!(platform.read(Namespace::Site, "a"), None);
        assert!(platform.remove(Namespace::Blog(2), "a"));
        assert!(!platform.remove(Namespace::Blog(2), "a"));
    }
}
