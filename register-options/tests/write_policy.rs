//! Integration tests for write authorization
//!
//! Exercises policies and override hooks through the options instance.

use register_options::options::rules::is_positive_int;
use register_options::options::{
    AllowAll, DenyAll, OperationPolicy, UserSelfServicePolicy, WriteContext, WriteOperation,
};
use register_options::storage::{Namespace, Scope, UserStorageKind};
use register_options::{
    MemoryPlatform, RecordingLogger, RegisterOptions, Schema, SchemaEntry, StorageContext,
    StorageFactory,
};
use serde_json::json;
use std::sync::{Arc, Mutex};

fn factory() -> (Arc<MemoryPlatform>, StorageFactory) {
    let platform = Arc::new(MemoryPlatform::new());
    let factory = StorageFactory::new(platform.clone());
    (platform, factory)
}

fn schema() -> Schema {
    Schema::new()
        .option("theme", SchemaEntry::new().default_value(1).validate(is_positive_int))
        .option("admin", SchemaEntry::new().default_value(1).validate(is_positive_int))
}

/// Test that a general hook can override a denying policy
#[test]
fn test_general_hook_overrides_denial() {
    let (platform, factory) = factory();
    let mut options = RegisterOptions::builder("plugin")
        .policy(DenyAll)
        .schema(schema())
        .build(&factory)
        .unwrap();

    options.gate_mut().add_general_hook(|_, _| true);

    assert!(options.set_option("theme", json!(2)).unwrap());
    assert_eq!(platform.stats().inserts, 1);
}

/// Test that a scoped hook only sees writes to its scope
#[test]
fn test_scoped_hook_denies_its_scope() {
    let (_, factory) = factory();
    let mut site = RegisterOptions::builder("plugin")
        .schema(schema())
        .build(&factory)
        .unwrap();
    let mut blog = RegisterOptions::builder("plugin")
        .context(StorageContext::blog(2))
        .schema(schema())
        .build(&factory)
        .unwrap();

    site.gate_mut().add_scoped_hook(Scope::Blog, |_, _| false);
    blog.gate_mut().add_scoped_hook(Scope::Blog, |_, _| false);

    assert!(site.set_option("theme", json!(2)).unwrap());
    assert!(!blog.set_option("theme", json!(2)).unwrap());
}

/// Test that hooks receive the operation and changed keys
#[test]
fn test_hooks_receive_write_context() {
    let (platform, factory) = factory();
    platform.seed(Namespace::UserOption { user_id: 3, blog_id: None }, "prefs", json!({"theme": 1}));

    let seen: Arc<Mutex<Vec<WriteContext>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    let mut options = RegisterOptions::builder("prefs")
        .context(StorageContext::user_option(3, true))
        .policy(AllowAll)
        .schema(schema())
        .build(&factory)
        .unwrap();
    options.gate_mut().add_general_hook(move |decision, ctx| {
        sink.lock().unwrap().push(ctx.clone());
        decision
    });

    assert!(options.set_option("theme", json!(4)).unwrap());

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let ctx = &seen[0];
    assert_eq!(ctx.operation, WriteOperation::Update);
    assert_eq!(ctx.record, "prefs");
    assert_eq!(ctx.key.as_deref(), Some("theme"));
    assert_eq!(ctx.keys, vec!["theme".to_string()]);
    assert_eq!(ctx.scope, Scope::User);
    assert_eq!(ctx.entity_id, Some(3));
    assert_eq!(ctx.user_storage, Some(UserStorageKind::Option));
}

/// Test that each write operation reaches the policy with its own name
#[test]
fn test_operation_names() {
    let (platform, factory) = factory();
    let ops: Arc<Mutex<Vec<WriteOperation>>> = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&ops);

    let mut options = RegisterOptions::builder("plugin")
        .policy(move |op: WriteOperation, _: &WriteContext| {
            recorded.lock().unwrap().push(op);
            true
        })
        .schema(schema())
        .build(&factory)
        .unwrap();

    assert!(options.seed_if_missing().unwrap());
    assert!(options.set_option("theme", json!(2)).unwrap());
    assert!(options.delete_option("admin").unwrap());

    assert_eq!(
        *ops.lock().unwrap(),
        vec![WriteOperation::Seed, WriteOperation::Update, WriteOperation::Delete]
    );
    assert_eq!(
        platform.row(Namespace::Site, "plugin").unwrap().value,
        json!({"theme": 2})
    );
}

/// Test that an operation allow-list blocks other operations
#[test]
fn test_operation_policy_blocks_updates() {
    let (_, factory) = factory();
    let mut options = RegisterOptions::builder("plugin")
        .policy(OperationPolicy::new([WriteOperation::Add, WriteOperation::Seed]))
        .schema(schema())
        .build(&factory)
        .unwrap();

    assert!(options.set_option("theme", json!(2)).unwrap());
    assert!(!options.set_option("theme", json!(3)).unwrap());
    assert_eq!(options.get_option("theme"), Some(json!(2)));
}

/// Test that users may only change their own allow-listed keys
#[test]
fn test_user_self_service() {
    let (_, factory) = factory();
    let build = |user: u64| {
        RegisterOptions::builder("prefs")
            .context(StorageContext::user(user))
            .policy(UserSelfServicePolicy::new(7, ["theme"]))
            .schema(schema())
            .build(&factory)
            .unwrap()
    };

    let mut own = build(7);
    assert!(own.set_option("theme", json!(2)).unwrap());
    assert!(!own.set_option("admin", json!(2)).unwrap());

    let mut other = build(8);
    assert!(!other.set_option("theme", json!(2)).unwrap());
}

/// Test that every gate evaluation leaves six diagnostics
#[test]
fn test_gate_diagnostics_reach_logger() {
    let (_, factory) = factory();
    let logger = Arc::new(RecordingLogger::new());
    let mut options = RegisterOptions::builder("plugin")
        .logger(logger.clone())
        .schema(schema())
        .build(&factory)
        .unwrap();

    logger.clear();
    assert!(options.set_option("theme", json!(5)).unwrap());

    let gate_records = logger.matching("write gate:");
    assert_eq!(gate_records.len(), 6);
    assert_eq!(gate_records[5].context["decision"], json!(true));
    assert_eq!(gate_records[5].context["operation"], json!("add"));
}
