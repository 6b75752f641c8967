//! Sanitize and validate steps held as shared callables
//!
//! Each step remembers what kind of callable it was built from so that
//! validation failures can say which validator rejected a value.

use serde_json::Value;
use std::any::{TypeId, type_name};
use std::fmt;
use std::mem::size_of;
use std::sync::Arc;

/// Shape of the callable behind a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallableKind {
    /// A named function item (`is_positive_int`)
    Function(String),
    /// A method bound to a receiver (`Owner::name`)
    Method { owner: String, name: String },
    /// An anonymous closure
    Closure,
    /// A rule object implementing [`ValidationRule`] or [`SanitizeRule`]
    Other(String),
}

impl CallableKind {
    fn infer<F>() -> Self {
        let name = type_name::<F>();
        if name.contains("{{closure}}") {
            CallableKind::Closure
        } else {
            CallableKind::Function(name.to_string())
        }
    }
}

impl fmt::Display for CallableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallableKind::Function(name) => write!(f, "function {}", name),
            CallableKind::Method { owner, name } => write!(f, "method {}::{}", owner, name),
            CallableKind::Closure => f.write_str("closure"),
            CallableKind::Other(name) => write!(f, "callable {}", name),
        }
    }
}

/// Type identity of a callable. Stateless callables of the same type always
/// behave the same, which is what makes repeated registration idempotent.
/// Stateful callables compare equal only through a matching fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Identity {
    type_id: TypeId,
    stateless: bool,
    fingerprint: Option<String>,
}

impl Identity {
    fn of<F: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<F>(),
            stateless: size_of::<F>() == 0,
            fingerprint: None,
        }
    }

    fn with_fingerprint(mut self, fingerprint: Option<String>) -> Self {
        self.fingerprint = fingerprint;
        self
    }

    fn matches(&self, other: &Identity) -> bool {
        self.type_id == other.type_id
            && (self.stateless
                || (self.fingerprint.is_some() && self.fingerprint == other.fingerprint))
    }
}

/// Collects non-fatal diagnostics emitted by validators
#[derive(Debug, Default)]
pub struct WarningSink {
    warnings: Vec<String>,
}

impl WarningSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, text: impl Into<String>) {
        self.warnings.push(text.into());
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.warnings
    }
}

/// Object form of a validator
pub trait ValidationRule: Send + Sync {
    fn check(&self, value: &Value, warnings: &mut WarningSink) -> bool;

    fn name(&self) -> String {
        short_type_name(type_name::<Self>())
    }

    /// Stable description of the rule's state. Two rules of the same type
    /// with equal fingerprints count as the same step when merging schema.
    fn fingerprint(&self) -> Option<String> {
        None
    }
}

/// Object form of a sanitizer
pub trait SanitizeRule: Send + Sync {
    fn sanitize(&self, value: Value) -> Value;

    fn name(&self) -> String {
        short_type_name(type_name::<Self>())
    }

    /// Stable description of the rule's state. Two rules of the same type
    /// with equal fingerprints count as the same step when merging schema.
    fn fingerprint(&self) -> Option<String> {
        None
    }
}

type SanitizeFn = dyn Fn(Value) -> Value + Send + Sync;
type ValidateFn = dyn Fn(&Value, &mut WarningSink) -> bool + Send + Sync;

/// One step of a sanitize chain. Must be pure and total.
#[derive(Clone)]
pub struct Sanitizer {
    func: Arc<SanitizeFn>,
    kind: CallableKind,
    identity: Identity,
}

impl Sanitizer {
    /// Wrap a function or closure, inferring its kind
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(func),
            kind: CallableKind::infer::<F>(),
            identity: Identity::of::<F>(),
        }
    }

    /// A function registered under an explicit name
    pub fn named<F>(name: &str, func: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        Self {
            kind: CallableKind::Function(name.to_string()),
            ..Self::new(func)
        }
    }

    /// A method bound to a receiver captured by `func`
    ///
    /// `owner` names the receiver: two methods built at the same site with the
    /// same owner and name are treated as one step when schema is merged.
    pub fn method<F>(owner: &str, name: &str, func: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        Self {
            kind: CallableKind::Method {
                owner: owner.to_string(),
                name: name.to_string(),
            },
            identity: Identity::of::<F>()
                .with_fingerprint(Some(format!("{}::{}", owner, name))),
            ..Self::new(func)
        }
    }

    pub fn rule<R: SanitizeRule + 'static>(rule: R) -> Self {
        let kind = CallableKind::Other(rule.name());
        let identity = Identity::of::<R>().with_fingerprint(rule.fingerprint());
        Self {
            func: Arc::new(move |value: Value| rule.sanitize(value)),
            kind,
            identity,
        }
    }

    pub fn apply(&self, value: Value) -> Value {
        (self.func)(value)
    }

    pub fn kind(&self) -> &CallableKind {
        &self.kind
    }

    /// Whether both steps are known to be the same callable
    pub fn same_callable(&self, other: &Sanitizer) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
            || (self.kind == other.kind && self.identity.matches(&other.identity))
    }
}

impl fmt::Debug for Sanitizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Sanitizer").field(&self.kind).finish()
    }
}

/// One step of a validate chain
#[derive(Clone)]
pub struct Validator {
    func: Arc<ValidateFn>,
    kind: CallableKind,
    identity: Identity,
}

impl Validator {
    /// Wrap a function or closure, inferring its kind
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&Value, &mut WarningSink) -> bool + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(func),
            kind: CallableKind::infer::<F>(),
            identity: Identity::of::<F>(),
        }
    }

    /// A function registered under an explicit name
    pub fn named<F>(name: &str, func: F) -> Self
    where
        F: Fn(&Value, &mut WarningSink) -> bool + Send + Sync + 'static,
    {
        Self {
            kind: CallableKind::Function(name.to_string()),
            ..Self::new(func)
        }
    }

    /// A method bound to a receiver captured by `func`
    ///
    /// `owner` names the receiver: two methods built at the same site with the
    /// same owner and name are treated as one step when schema is merged.
    pub fn method<F>(owner: &str, name: &str, func: F) -> Self
    where
        F: Fn(&Value, &mut WarningSink) -> bool + Send + Sync + 'static,
    {
        Self {
            kind: CallableKind::Method {
                owner: owner.to_string(),
                name: name.to_string(),
            },
            identity: Identity::of::<F>()
                .with_fingerprint(Some(format!("{}::{}", owner, name))),
            ..Self::new(func)
        }
    }

    pub fn rule<R: ValidationRule + 'static>(rule: R) -> Self {
        let kind = CallableKind::Other(rule.name());
        let identity = Identity::of::<R>().with_fingerprint(rule.fingerprint());
        Self {
            func: Arc::new(move |value: &Value, warnings: &mut WarningSink| {
                rule.check(value, warnings)
            }),
            kind,
            identity,
        }
    }

    pub fn check(&self, value: &Value, warnings: &mut WarningSink) -> bool {
        (self.func)(value, warnings)
    }

    pub fn kind(&self) -> &CallableKind {
        &self.kind
    }

    pub fn same_callable(&self, other: &Validator) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
            || (self.kind == other.kind && self.identity.matches(&other.identity))
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Validator").field(&self.kind).finish()
    }
}

/// `a::b::Type<c::D>` -> `Type<D>`
fn short_type_name(full: &str) -> String {
    let mut out = String::with_capacity(full.len());
    let mut segment = String::new();
    for c in full.chars() {
        match c {
            ':' => segment.clear(),
            '<' | '>' | ',' | ' ' | '(' | ')' | '&' | '[' | ']' | ';' => {
                out.push_str(&segment);
                segment.clear();
                out.push(c);
            }
            _ => segment.push(c),
        }
    }
    out.push_str(&segment);
    out
}
