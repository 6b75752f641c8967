//! Write authorization: policy object plus override hooks
//!
//! Evaluation order is fixed: the policy (if any), then the general hooks,
//! then the hooks registered for the record's scope. Each hook receives the
//! decision so far and returns the new one. Hooks may loosen as well as
//! tighten; whatever the last hook returns is final.

use crate::logging::{LogFacade, Logger};
use crate::storage::{Scope, UserStorageKind};
use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// Name of the general override extension point
pub const GENERAL_HOOK: &str = "register_options/allow_persist";

/// Name of the scope-qualified override extension point
pub fn scoped_hook_name(scope: Scope) -> String {
    format!("{}/scope/{}", GENERAL_HOOK, scope)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteOperation {
    Add,
    Update,
    Delete,
    Seed,
}

impl WriteOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteOperation::Add => "add",
            WriteOperation::Update => "update",
            WriteOperation::Delete => "delete",
            WriteOperation::Seed => "seed",
        }
    }
}

impl fmt::Display for WriteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the gate knows about a pending persist
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteContext {
    pub operation: WriteOperation,
    /// Name of the persisted record
    pub record: String,
    /// The single key being written, for per-key operations
    pub key: Option<String>,
    /// Keys whose values differ from what is stored
    pub keys: Vec<String>,
    #[serde(serialize_with = "serialize_display")]
    pub scope: Scope,
    pub entity_id: Option<u64>,
    #[serde(serialize_with = "serialize_display_opt")]
    pub user_storage: Option<UserStorageKind>,
}

fn serialize_display<T: fmt::Display, S: serde::Serializer>(
    value: &T,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

fn serialize_display_opt<T: fmt::Display, S: serde::Serializer>(
    value: &Option<T>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) => serializer.collect_str(v),
        None => serializer.serialize_none(),
    }
}

/// Programmatic write policy
pub trait WritePolicy: Send + Sync {
    fn allow(&self, operation: WriteOperation, ctx: &WriteContext) -> bool;
}

impl<F> WritePolicy for F
where
    F: Fn(WriteOperation, &WriteContext) -> bool + Send + Sync,
{
    fn allow(&self, operation: WriteOperation, ctx: &WriteContext) -> bool {
        self(operation, ctx)
    }
}

/// Allows every write
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl WritePolicy for AllowAll {
    fn allow(&self, _operation: WriteOperation, _ctx: &WriteContext) -> bool {
        true
    }
}

/// Denies every write
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAll;

impl WritePolicy for DenyAll {
    fn allow(&self, _operation: WriteOperation, _ctx: &WriteContext) -> bool {
        false
    }
}

/// Allows only the listed operations
#[derive(Debug, Clone)]
pub struct OperationPolicy {
    allowed: Vec<WriteOperation>,
}

impl OperationPolicy {
    pub fn new(allowed: impl IntoIterator<Item = WriteOperation>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }
}

impl WritePolicy for OperationPolicy {
    fn allow(&self, operation: WriteOperation, _ctx: &WriteContext) -> bool {
        self.allowed.contains(&operation)
    }
}

/// Lets a user change an allow-list of keys in their own user-scoped record
///
/// Writes to any other scope or user, or touching any key outside the list,
/// are denied.
#[derive(Debug, Clone)]
pub struct UserSelfServicePolicy {
    acting_user: u64,
    keys: BTreeSet<String>,
}

impl UserSelfServicePolicy {
    pub fn new<I, S>(acting_user: u64, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            acting_user,
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }
}

impl WritePolicy for UserSelfServicePolicy {
    fn allow(&self, _operation: WriteOperation, ctx: &WriteContext) -> bool {
        ctx.scope == Scope::User
            && ctx.entity_id == Some(self.acting_user)
            && ctx.keys.iter().all(|k| self.keys.contains(k))
    }
}

/// Override hook: `(decision so far, context) -> decision`
pub type OverrideHook = Arc<dyn Fn(bool, &WriteContext) -> bool + Send + Sync>;

/// Every intermediate value of one gate evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateDecision {
    pub policy: bool,
    pub general_input: bool,
    pub general_output: bool,
    pub scoped_input: bool,
    pub scoped_output: bool,
    pub allowed: bool,
}

/// Combines the policy object with the general and scoped override hooks
#[derive(Clone)]
pub struct WritePolicyGate {
    policy: Option<Arc<dyn WritePolicy>>,
    general_hooks: Vec<OverrideHook>,
    scoped_hooks: HashMap<Scope, Vec<OverrideHook>>,
    logger: Arc<dyn Logger>,
}

impl Default for WritePolicyGate {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WritePolicyGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WritePolicyGate")
            .field("has_policy", &self.policy.is_some())
            .field("general_hooks", &self.general_hooks.len())
            .field(
                "scoped_hooks",
                &self
                    .scoped_hooks
                    .iter()
                    .map(|(scope, hooks)| (scope.as_str(), hooks.len()))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl WritePolicyGate {
    pub fn new() -> Self {
        Self {
            policy: None,
            general_hooks: Vec::new(),
            scoped_hooks: HashMap::new(),
            logger: Arc::new(LogFacade),
        }
    }

    pub fn with_policy(mut self, policy: impl WritePolicy + 'static) -> Self {
        self.set_policy(Arc::new(policy));
        self
    }

    pub fn set_policy(&mut self, policy: Arc<dyn WritePolicy>) {
        self.policy = Some(policy);
    }

    pub fn clear_policy(&mut self) {
        self.policy = None;
    }

    pub fn has_policy(&self) -> bool {
        self.policy.is_some()
    }

    pub fn set_logger(&mut self, logger: Arc<dyn Logger>) {
        self.logger = logger;
    }

    /// Attach a hook to the general extension point
    pub fn add_general_hook<F>(&mut self, hook: F)
    where
        F: Fn(bool, &WriteContext) -> bool + Send + Sync + 'static,
    {
        self.general_hooks.push(Arc::new(hook));
    }

    /// Attach a hook to one scope's extension point
    pub fn add_scoped_hook<F>(&mut self, scope: Scope, hook: F)
    where
        F: Fn(bool, &WriteContext) -> bool + Send + Sync + 'static,
    {
        self.scoped_hooks
            .entry(scope)
            .or_default()
            .push(Arc::new(hook));
    }

    pub fn clear_hooks(&mut self) {
        self.general_hooks.clear();
        self.scoped_hooks.clear();
    }

    /// Run every step and report each intermediate decision
    pub fn evaluate(&self, ctx: &WriteContext) -> GateDecision {
        let policy = match &self.policy {
            Some(policy) => policy.allow(ctx.operation, ctx),
            None => true,
        };
        self.logger.debug(
            "write gate: policy decision",
            &json!({
                "decision": policy,
                "policy_attached": self.policy.is_some(),
                "context": ctx,
            }),
        );

        let general_input = policy;
        self.logger.debug(
            "write gate: general hook input",
            &json!({"hook": GENERAL_HOOK, "decision": general_input, "hooks": self.general_hooks.len()}),
        );
        let general_output = run_hooks(&self.general_hooks, general_input, ctx);
        self.logger.debug(
            "write gate: general hook output",
            &json!({"hook": GENERAL_HOOK, "decision": general_output}),
        );

        let scoped_name = scoped_hook_name(ctx.scope);
        let scoped = self
            .scoped_hooks
            .get(&ctx.scope)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let scoped_input = general_output;
        self.logger.debug(
            "write gate: scoped hook input",
            &json!({"hook": scoped_name, "decision": scoped_input, "hooks": scoped.len()}),
        );
        let scoped_output = run_hooks(scoped, scoped_input, ctx);
        self.logger.debug(
            "write gate: scoped hook output",
            &json!({"hook": scoped_name, "decision": scoped_output}),
        );

        let allowed = scoped_output;
        self.logger.debug(
            "write gate: final decision",
            &json!({
                "decision": allowed,
                "operation": ctx.operation,
                "record": ctx.record,
                "scope": ctx.scope.as_str(),
            }),
        );

        GateDecision {
            policy,
            general_input,
            general_output,
            scoped_input,
            scoped_output,
            allowed,
        }
    }

    pub fn allow(&self, ctx: &WriteContext) -> bool {
        self.evaluate(ctx).allowed
    }
}

fn run_hooks(hooks: &[OverrideHook], input: bool, ctx: &WriteContext) -> bool {
    hooks.iter().fold(input, |decision, hook| hook(decision, ctx))
}
