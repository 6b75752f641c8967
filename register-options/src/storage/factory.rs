//! Resolution of storage contexts to concrete backends

use super::{
    BlogStorage, HostPlatform, NetworkStorage, Scope, SiteStorage, StorageBackend,
    StorageContext, UserStorage,
};
use crate::error::Result;
use serde_json::Value;
use std::sync::Arc;

/// Builds backends over one shared host platform
#[derive(Clone)]
pub struct StorageFactory {
    platform: Arc<dyn HostPlatform>,
}

impl StorageFactory {
    pub fn new(platform: Arc<dyn HostPlatform>) -> Self {
        Self { platform }
    }

    pub fn platform(&self) -> &Arc<dyn HostPlatform> {
        &self.platform
    }

    /// Backend for an already resolved context
    ///
    /// Blog and user scopes fail with a configuration error when the context
    /// carries no entity id.
    pub fn create(&self, ctx: &StorageContext) -> Result<Box<dyn StorageBackend>> {
        let platform = Arc::clone(&self.platform);
        let backend: Box<dyn StorageBackend> = match ctx.scope {
            Scope::Site => Box::new(SiteStorage::new(platform)),
            Scope::Network => Box::new(NetworkStorage::new(platform)),
            Scope::Blog => Box::new(BlogStorage::new(platform, ctx.require_entity()?)),
            Scope::User => Box::new(UserStorage::new(
                platform,
                ctx.require_entity()?,
                ctx.user_storage,
                ctx.user_global,
            )),
        };

        log::debug!(
            "Resolved {} storage (entity: {:?}, user storage: {})",
            ctx.scope,
            ctx.entity_id,
            ctx.user_storage
        );
        Ok(backend)
    }

    /// Parse a scope name and loosely typed entity descriptor, then build
    pub fn resolve(
        &self,
        scope: &str,
        descriptor: &Value,
    ) -> Result<(StorageContext, Box<dyn StorageBackend>)> {
        let ctx = StorageContext::from_descriptor(scope, descriptor)?;
        let backend = self.create(&ctx)?;
        Ok((ctx, backend))
    }
}
