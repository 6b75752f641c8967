//! Integration tests for scoped storage
//!
//! Runs the options instance against the SQLite platform and checks the
//! per-scope autoload rules end to end.

use register_options::options::rules::is_positive_int;
use register_options::storage::{Namespace, Scope};
use register_options::{
    HostPlatform, MemoryPlatform, RegisterOptions, Schema, SchemaEntry, SqlitePlatform,
    StorageContext, StorageFactory,
};
use serde_json::json;
use std::sync::Arc;

fn schema() -> Schema {
    Schema::new().option(
        "retries",
        SchemaEntry::new().default_value(3).validate(is_positive_int),
    )
}

/// Test that a record written through SQLite is visible to a new instance
#[test]
fn test_sqlite_persists_across_instances() {
    let platform = Arc::new(SqlitePlatform::in_memory().unwrap());
    let factory = StorageFactory::new(platform.clone());

    let mut first = RegisterOptions::builder("plugin")
        .autoload(true)
        .schema(schema())
        .build(&factory)
        .unwrap();
    assert!(first.set_option("retries", json!(9)).unwrap());

    let second = RegisterOptions::builder("plugin")
        .schema(schema())
        .build(&factory)
        .unwrap();
    assert_eq!(second.get_option("retries"), Some(json!(9)));
    assert_eq!(platform.autoload(Namespace::Site, "plugin").unwrap(), Some(true));
}

/// Test that scopes map to separate SQLite rows
#[test]
fn test_sqlite_scopes_are_isolated() {
    let platform = Arc::new(SqlitePlatform::in_memory().unwrap());
    let factory = StorageFactory::new(platform.clone());

    for (ctx, value) in [
        (StorageContext::site(), 1),
        (StorageContext::network(), 2),
        (StorageContext::blog(5), 3),
        (StorageContext::user(7), 4),
        (StorageContext::user_option(7, false), 5),
    ] {
        let mut options = RegisterOptions::builder("shared")
            .context(ctx)
            .schema(schema())
            .build(&factory)
            .unwrap();
        assert!(options.set_option("retries", json!(value)).unwrap());
    }

    assert_eq!(platform.read(Namespace::Site, "shared"), Some(json!({"retries": 1})));
    assert_eq!(platform.read(Namespace::Network, "shared"), Some(json!({"retries": 2})));
    assert_eq!(platform.read(Namespace::Blog(5), "shared"), Some(json!({"retries": 3})));
    assert_eq!(platform.read(Namespace::UserMeta(7), "shared"), Some(json!({"retries": 4})));
    assert_eq!(
        platform.read(
            Namespace::UserOption {
                user_id: 7,
                blog_id: Some(1),
            },
            "shared"
        ),
        Some(json!({"retries": 5}))
    );
}

/// Test that a blog record for another sub-site does not support autoload
#[test]
fn test_blog_autoload_depends_on_current_sub_site() {
    let platform = Arc::new(MemoryPlatform::with_current_blog(1));
    let factory = StorageFactory::new(platform.clone());

    let mut other = RegisterOptions::builder("plugin")
        .context(StorageContext::blog(2))
        .autoload(true)
        .schema(schema())
        .build(&factory)
        .unwrap();
    assert!(!other.supports_autoload());
    assert!(other.set_option("retries", json!(4)).unwrap());
    assert_eq!(platform.row(Namespace::Blog(2), "plugin").unwrap().autoload, None);

    let current = RegisterOptions::builder("plugin")
        .context(StorageContext::blog(1))
        .build(&factory)
        .unwrap();
    assert!(current.supports_autoload());

    platform.set_current_blog(2);
    assert!(other.supports_autoload());
}

/// Test that network records never carry an autoload flag
#[test]
fn test_network_drops_autoload_hint() {
    let platform = Arc::new(MemoryPlatform::new());
    let factory = StorageFactory::new(platform.clone());

    let mut options = RegisterOptions::builder("plugin")
        .context(StorageContext::network())
        .autoload(true)
        .schema(schema())
        .build(&factory)
        .unwrap();

    assert!(!options.supports_autoload());
    assert!(options.seed_if_missing().unwrap());
    assert_eq!(platform.row(Namespace::Network, "plugin").unwrap().autoload, None);
}

/// Test that descriptors resolve to the expected backend
#[test]
fn test_factory_resolves_descriptors() {
    let factory = StorageFactory::new(Arc::new(MemoryPlatform::new()));

    let (ctx, backend) = factory.resolve("blog", &json!({"blog_id": 4})).unwrap();
    assert_eq!(ctx, StorageContext::blog(4));
    assert_eq!(backend.scope(), Scope::Blog);
    assert_eq!(backend.blog_id(), Some(4));

    let missing = factory.resolve("user", &json!({}));
    assert!(missing.err().unwrap().is_configuration());

    let unknown = factory.resolve("galaxy", &json!({}));
    assert!(unknown.is_err());
}

/// Test that an instance can run over a hand-built backend
#[test]
fn test_with_backend() {
    let platform: Arc<dyn HostPlatform> = Arc::new(MemoryPlatform::new());
    let factory = StorageFactory::new(Arc::clone(&platform));
    let ctx = StorageContext::user_option(2, true);
    let backend = factory.create(&ctx).unwrap();

    let mut options = RegisterOptions::with_backend("prefs", ctx.clone(), backend).unwrap();
    options.register_schema(schema()).unwrap();
    assert!(options.set_option("retries", json!(6)).unwrap());

    assert_eq!(options.storage_context(), &ctx);
    assert_eq!(
        platform.read(
            Namespace::UserOption {
                user_id: 2,
                blog_id: None,
            },
            "prefs"
        ),
        Some(json!({"retries": 6}))
    );
}
