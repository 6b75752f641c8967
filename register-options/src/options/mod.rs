//! Options system for validated, policy-gated settings records
//!
//! The options system provides:
//! - Two-bucket schema registration (component and schema)
//! - Sanitize-then-validate processing with per-key messages
//! - Staged changes committed in a single write
//! - Write authorization through policies and override hooks

pub mod builder;
pub mod callable;
pub mod canonical;
pub mod descriptor;
pub mod pipeline;
pub mod policy;
pub mod register;
pub mod rules;
pub mod schema;
pub mod staging;
pub mod types;

pub use builder::SchemaEntryBuilder;
pub use callable::{
    CallableKind, SanitizeRule, Sanitizer, ValidationRule, Validator, WarningSink,
};
pub use canonical::{CanonicalMode, Canonicalizer};
pub use descriptor::{OptionDescriptor, SchemaDescriptor};
pub use pipeline::{SanitizeValidatePipeline, describe_value};
pub use policy::{
    AllowAll, DenyAll, GENERAL_HOOK, GateDecision, OperationPolicy, OverrideHook,
    UserSelfServicePolicy, WriteContext, WriteOperation, WritePolicy, WritePolicyGate,
    scoped_hook_name,
};
pub use register::{RegisterOptions, RegisterOptionsBuilder};
pub use rules::OptionType;
pub use schema::{
    Bucket, Chains, DefaultValue, RegisteredOption, Schema, SchemaEntry, SchemaRegistry,
    SchemaSummary,
};
pub use staging::{Origin, StagedValue, StagingBuffer};
pub use types::{KeyMessages, Messages, OptionKey};
