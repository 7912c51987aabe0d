// Pool lookup
// Resolves which identity pool a username signs into

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::types::PoolConfig;
use crate::http_client::UserManagementApi;

/// Resolves the identity-provider configuration for a username
#[async_trait]
pub trait PoolLocator: Send + Sync {
    async fn pool_for_username(&self, username: &str) -> Result<PoolConfig>;
}

/// Static pool configuration shared by every user
#[derive(Debug, Clone)]
pub struct StaticPoolLocator {
    pool: PoolConfig,
}

impl StaticPoolLocator {
    pub fn new(
        pool_id: impl Into<String>,
        client_id: impl Into<String>,
        identity_pool_id: impl Into<String>,
    ) -> Self {
        Self {
            pool: PoolConfig {
                pool_id: pool_id.into(),
                client_id: client_id.into(),
                identity_pool_id: identity_pool_id.into(),
            },
        }
    }
}

#[async_trait]
impl PoolLocator for StaticPoolLocator {
    async fn pool_for_username(&self, _username: &str) -> Result<PoolConfig> {
        Ok(self.pool.clone())
    }
}

/// Looks the pool up through the user-management API
pub struct UserManagementPoolLocator {
    api: UserManagementApi,
}

impl UserManagementPoolLocator {
    pub fn new(api: UserManagementApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl PoolLocator for UserManagementPoolLocator {
    async fn pool_for_username(&self, username: &str) -> Result<PoolConfig> {
        tracing::debug!(region = self.api.region(), "Looking up user pool");

        let value = self
            .api
            .get_user_pool_by_user_name(username)
            .await
            .context("User pool lookup request failed")?;

        serde_json::from_value(value).context("User pool response is missing pool identifiers")
    }
}
