//! Schema-driven, policy-gated options records over scoped storage
//!
//! An options record is one named value holding a map of option keys to
//! sanitized values. [`RegisterOptions`] owns one record: it registers the
//! schema for its keys, stages changes in memory and persists them through a
//! [`StorageBackend`] once the [`WritePolicyGate`] allows it.

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod options;
pub mod storage;

pub use error::{OptionsError, Result};
pub use logging::{LogFacade, Logger, RecordingLogger};
pub use options::{
    Bucket, RegisterOptions, Schema, SchemaEntry, SchemaEntryBuilder, WriteContext,
    WriteOperation, WritePolicy, WritePolicyGate,
};
pub use storage::{
    HostPlatform, MemoryPlatform, Scope, SqlitePlatform, StorageBackend, StorageContext,
    StorageFactory,
};
