//! Storage scopes and the resolved storage context of an options record

use crate::error::{OptionsError, Result};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Ownership domain of a persisted options record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    Site,
    Network,
    Blog,
    User,
}

impl Scope {
    pub const ALL: [Scope; 4] = [Scope::Site, Scope::Network, Scope::Blog, Scope::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Site => "site",
            Scope::Network => "network",
            Scope::Blog => "blog",
            Scope::User => "user",
        }
    }

    /// Whether this scope addresses a specific entity (sub-site or user)
    pub fn requires_entity(&self) -> bool {
        matches!(self, Scope::Blog | Scope::User)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = OptionsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "site" => Ok(Scope::Site),
            "network" => Ok(Scope::Network),
            "blog" => Ok(Scope::Blog),
            "user" => Ok(Scope::User),
            other => Err(OptionsError::configuration(format!(
                "unsupported storage scope '{}' (expected site, network, blog or user)",
                other
            ))),
        }
    }
}

/// How per-user records are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UserStorageKind {
    /// Per-user meta rows
    #[default]
    Meta,
    /// One consolidated per-user option row
    Option,
}

impl UserStorageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStorageKind::Meta => "meta",
            UserStorageKind::Option => "option",
        }
    }
}

impl fmt::Display for UserStorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserStorageKind {
    type Err = OptionsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "meta" => Ok(UserStorageKind::Meta),
            "option" => Ok(UserStorageKind::Option),
            other => Err(OptionsError::configuration(format!(
                "unsupported user storage kind '{}' (expected meta or option)",
                other
            ))),
        }
    }
}

/// Where an options record lives. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageContext {
    pub scope: Scope,
    pub entity_id: Option<u64>,
    pub user_storage: UserStorageKind,
    /// Per-user option rows shared across every sub-site
    pub user_global: bool,
}

impl Default for StorageContext {
    fn default() -> Self {
        Self::site()
    }
}

impl StorageContext {
    pub fn site() -> Self {
        Self {
            scope: Scope::Site,
            entity_id: None,
            user_storage: UserStorageKind::Meta,
            user_global: false,
        }
    }

    pub fn network() -> Self {
        Self {
            scope: Scope::Network,
            ..Self::site()
        }
    }

    pub fn blog(blog_id: u64) -> Self {
        Self {
            scope: Scope::Blog,
            entity_id: Some(blog_id),
            ..Self::site()
        }
    }

    /// Per-user meta storage
    pub fn user(user_id: u64) -> Self {
        Self {
            scope: Scope::User,
            entity_id: Some(user_id),
            ..Self::site()
        }
    }

    /// Per-user consolidated option storage
    pub fn user_option(user_id: u64, global: bool) -> Self {
        Self {
            scope: Scope::User,
            entity_id: Some(user_id),
            user_storage: UserStorageKind::Option,
            user_global: global,
        }
    }

    /// Entity id required by blog and user scopes
    pub fn require_entity(&self) -> Result<u64> {
        self.entity_id.ok_or_else(|| {
            OptionsError::configuration(format!(
                "{} scope requires an integer entity id",
                self.scope
            ))
        })
    }

    /// Resolve a loosely typed descriptor such as `{"blog_id": 5}` or
    /// `{"user_id": 7, "user_storage": "option", "global": true}`.
    ///
    /// `entity_id` is accepted as an alias for both `blog_id` and `user_id`.
    pub fn from_descriptor(scope: &str, descriptor: &Value) -> Result<Self> {
        let scope: Scope = scope.parse()?;

        if !descriptor.is_null() && !descriptor.is_object() {
            return Err(OptionsError::configuration(format!(
                "storage descriptor for {} scope must be an object",
                scope
            )));
        }

        match scope {
            Scope::Site => Ok(Self::site()),
            Scope::Network => Ok(Self::network()),
            Scope::Blog => {
                let blog_id = entity_field(descriptor, scope, "blog_id")?;
                Ok(Self::blog(blog_id))
            }
            Scope::User => {
                let user_id = entity_field(descriptor, scope, "user_id")?;
                let user_storage = match descriptor.get("user_storage") {
                    None | Some(Value::Null) => UserStorageKind::Meta,
                    Some(Value::String(kind)) => kind.parse()?,
                    Some(other) => {
                        return Err(OptionsError::configuration(format!(
                            "user_storage must be a string, got {}",
                            other
                        )));
                    }
                };
                let user_global = match descriptor.get("global") {
                    None | Some(Value::Null) => false,
                    Some(Value::Bool(flag)) => *flag,
                    Some(other) => {
                        return Err(OptionsError::configuration(format!(
                            "global must be a boolean, got {}",
                            other
                        )));
                    }
                };
                Ok(Self {
                    scope,
                    entity_id: Some(user_id),
                    user_storage,
                    user_global,
                })
            }
        }
    }
}

fn entity_field(descriptor: &Value, scope: Scope, field: &str) -> Result<u64> {
    let raw = descriptor
        .get(field)
        .or_else(|| descriptor.get("entity_id"))
        .filter(|v| !v.is_null())
        .ok_or_else(|| {
            OptionsError::configuration(format!("{} scope requires '{}'", scope, field))
        })?;

    raw.as_u64().ok_or_else(|| {
        OptionsError::configuration(format!(
            "{} scope requires '{}' to be a non-negative integer, got {}",
            scope, field, raw
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scope_parse() {
        assert_eq!("Site".parse::<Scope>().unwrap(), Scope::Site);
        assert_eq!(" network ".parse::<Scope>().unwrap(), Scope::Network);
        assert!("galaxy".parse::<Scope>().unwrap_err().is_configuration());
    }

    #[test]
    fn test_default_is_site() {
        let ctx = StorageContext::default();
        assert_eq!(ctx.scope, Scope::Site);
        assert_eq!(ctx.entity_id, None);
    }

    #[test]
    fn test_blog_descriptor_requires_integer_id() {
        let ctx = StorageContext::from_descriptor("blog", &json!({"blog_id": 5})).unwrap();
        assert_eq!(ctx, StorageContext::blog(5));

        let missing = StorageContext::from_descriptor("blog", &json!({}));
        assert!(missing.unwrap_err().is_configuration());

        let wrong_type = StorageContext::from_descriptor("blog", &json!({"blog_id": "5"}));
        assert!(wrong_type.unwrap_err().is_configuration());

        let negative = StorageContext::from_descriptor("blog", &json!({"blog_id": -2}));
        assert!(negative.is_err());
    }

    #[test]
    fn test_user_descriptor_options() {
        let ctx = StorageContext::from_descriptor(
            "user",
            &json!({"user_id": 7, "user_storage": "option", "global": true}),
        )
        .unwrap();
        assert_eq!(ctx, StorageContext::user_option(7, true));

        let meta = StorageContext::from_descriptor("user", &json!({"entity_id": 3})).unwrap();
        assert_eq!(meta.user_storage, UserStorageKind::Meta);
        assert_eq!(meta.entity_id, Some(3));

        let bad_kind =
            StorageContext::from_descriptor("user", &json!({"user_id": 1, "user_storage": "row"}));
        assert!(bad_kind.is_err());

        let bad_global =
            StorageContext::from_descriptor("user", &json!({"user_id": 1, "global": "yes"}));
        assert!(bad_global.is_err());
    }

    #[test]
    fn test_site_ignores_descriptor() {
        let ctx = StorageContext::from_descriptor("site", &Value::Null).unwrap();
        assert_eq!(ctx, StorageContext::site());
        assert!(StorageContext::from_descriptor("site", &json!([1])).is_err());
    }
}
