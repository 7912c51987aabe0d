// Credential exchange
// Trades an identity session's ID token for federated access credentials

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;

use super::aws_json;
use super::types::{
    seconds, AccessCredentials, FederationRequest, GetCredentialsRequest, GetCredentialsResponse,
    GetIdRequest, GetIdResponse, IdentitySession, PoolConfig,
};
use crate::error::AuthError;

const GET_ID: &str = "AWSCognitoIdentityService.GetId";
const GET_CREDENTIALS_FOR_IDENTITY: &str = "AWSCognitoIdentityService.GetCredentialsForIdentity";

/// Default lifetime requested for access credentials
pub const DEFAULT_DURATION_SECONDS: u64 = 3600;

/// Longest credential lifetime the engine will request (12 hours)
pub const MAX_DURATION_SECONDS: u64 = 43_200;

/// Federation service that issues access credentials for an identity pool
#[async_trait]
pub trait FederationService: Send + Sync {
    async fn get_credentials(&self, request: &FederationRequest) -> Result<AccessCredentials>;
}

/// Cognito Identity federation over the AWS JSON protocol
pub struct CognitoFederationService {
    client: Client,
    endpoint: String,
}

impl CognitoFederationService {
    pub fn new(client: Client, region: &str) -> Self {
        Self::with_endpoint(client, aws_json::identity_url(region))
    }

    pub fn with_endpoint(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl FederationService for CognitoFederationService {
    async fn get_credentials(&self, request: &FederationRequest) -> Result<AccessCredentials> {
        let id: GetIdResponse = aws_json::call(
            &self.client,
            &self.endpoint,
            GET_ID,
            &GetIdRequest {
                identity_pool_id: &request.identity_pool_id,
                logins: &request.logins,
            },
        )
        .await
        .context("Failed to resolve identity id")?;

        tracing::debug!(identity_id = %id.identity_id, "Resolved federated identity");

        let response: GetCredentialsResponse = aws_json::call(
            &self.client,
            &self.endpoint,
            GET_CREDENTIALS_FOR_IDENTITY,
            &GetCredentialsRequest {
                identity_id: &id.identity_id,
                logins: &request.logins,
            },
        )
        .await
        .context("Failed to get credentials for identity")?;

        let creds = response.credentials;
        let expires_at = epoch_to_datetime(creds.expiration)?;

        Ok(AccessCredentials {
            access_key_id: creds.access_key_id,
            secret_access_key: creds.secret_key,
            session_token: creds.session_token,
            expires_at,
        })
    }
}

fn epoch_to_datetime(epoch_seconds: f64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(epoch_seconds as i64, 0)
        .single()
        .with_context(|| format!("Invalid credential expiration: {}", epoch_seconds))
}

/// Explicit exchange settings, owned by the engine rather than set globally
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub region: String,
    pub duration_seconds: u64,
}

impl ExchangeConfig {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            duration_seconds: DEFAULT_DURATION_SECONDS,
        }
    }
}

/// Exchanges ID tokens for access credentials; holds no token state
pub struct CredentialExchange {
    config: ExchangeConfig,
    federation: Arc<dyn FederationService>,
}

impl CredentialExchange {
    pub fn new(config: ExchangeConfig, federation: Arc<dyn FederationService>) -> Self {
        Self { config, federation }
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    /// Issuer identifier the federation service expects in the login map
    pub fn issuer(&self, pool: &PoolConfig) -> String {
        format!("cognito-idp.{}.amazonaws.com/{}", self.config.region, pool.pool_id)
    }

    /// Build the federation request for a session
    pub fn request_for(&self, session: &IdentitySession, pool: &PoolConfig) -> FederationRequest {
        FederationRequest {
            identity_pool_id: pool.identity_pool_id.clone(),
            logins: HashMap::from([(self.issuer(pool), session.id_token.clone())]),
            duration_seconds: self.config.duration_seconds,
        }
    }

    /// Exchange the session's current ID token, using the configured duration
    pub async fn exchange(
        &self,
        session: &IdentitySession,
        pool: &PoolConfig,
    ) -> Result<AccessCredentials, AuthError> {
        self.exchange_for(session, pool, self.config.duration_seconds)
            .await
    }

    /// Exchange with an explicit duration; nothing is cached between calls
    pub async fn exchange_for(
        &self,
        session: &IdentitySession,
        pool: &PoolConfig,
        duration_seconds: u64,
    ) -> Result<AccessCredentials, AuthError> {
        let lifetime = seconds(duration_seconds)
            .filter(|_| (1..=MAX_DURATION_SECONDS).contains(&duration_seconds))
            .ok_or_else(|| {
                AuthError::Config(format!(
                    "Credential duration must be between 1 and {} seconds, got {}",
                    MAX_DURATION_SECONDS, duration_seconds
                ))
            })?;

        let mut request = self.request_for(session, pool);
        request.duration_seconds = duration_seconds;

        tracing::info!(
            identity_pool_id = %request.identity_pool_id,
            duration_seconds,
            "Exchanging ID token for access credentials"
        );

        let mut credentials = self
            .federation
            .get_credentials(&request)
            .await
            .map_err(AuthError::CredentialExchange)?;

        // The service may issue longer-lived credentials than asked for
        if let Some(cap) = Utc::now().checked_add_signed(lifetime) {
            if credentials.expires_at > cap {
                credentials.expires_at = cap;
            }
        }

        tracing::info!(
            access_key_id = %credentials.access_key_id,
            expires = %credentials.expires_at.to_rfc3339(),
            "Access credentials issued"
        );

        Ok(credentials)
    }
}
