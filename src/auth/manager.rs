use anyhow::Context;
use chrono::{Duration, Utc};
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::exchange::{CognitoFederationService, CredentialExchange, ExchangeConfig};
use super::locator::{PoolLocator, StaticPoolLocator, UserManagementPoolLocator};
use super::provider::{strip_immutable_attributes, CognitoIdentityProvider, IdentityProvider};
use super::publisher::{CredentialSink, EnvCredentialSink};
use super::refresh::{
    RefreshGuard, RefreshOutcome, DEFAULT_EXPIRY_BUFFER_SECS, DEFAULT_MIN_INTERVAL_SECS,
};
use super::types::{
    redact, seconds, AccessCredentials, AuthOutcome, Challenge, ChallengeKind, IdentitySession,
    PoolConfig,
};
use crate::config::Config;
use crate::error::{AuthError, Result};
use crate::http_client::{ApiCredentials, UserManagementApi};

/// Refresh tuning for an `AuthManager`
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Credentials inside this window before expiry are refreshed
    pub expiry_buffer: Duration,
    /// Minimum time between two refresh round-trips
    pub refresh_min_interval: Duration,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            expiry_buffer: Duration::seconds(DEFAULT_EXPIRY_BUFFER_SECS),
            refresh_min_interval: Duration::seconds(DEFAULT_MIN_INTERVAL_SECS),
        }
    }
}

/// Pool and session of the signed-in user, always replaced together
#[derive(Debug, Clone)]
struct SignedIn {
    username: String,
    pool: PoolConfig,
    session: IdentitySession,
}

/// Authentication manager
/// Owns one identity session and the access credentials derived from it
///
/// Mutating operations take `&mut self`, so one manager serves one caller at a
/// time. Concurrent callers should go through [`SharedAuthManager`].
pub struct AuthManager {
    locator: Arc<dyn PoolLocator>,
    provider: Arc<dyn IdentityProvider>,
    exchange: CredentialExchange,
    sink: Arc<dyn CredentialSink>,

    /// Last successful sign-in or session refresh
    signed_in: Option<SignedIn>,

    /// Credentials derived from `signed_in.session`
    credentials: Option<AccessCredentials>,

    guard: RefreshGuard,
    expiry_buffer: Duration,
}

impl AuthManager {
    pub fn new(
        locator: Arc<dyn PoolLocator>,
        provider: Arc<dyn IdentityProvider>,
        exchange: CredentialExchange,
        sink: Arc<dyn CredentialSink>,
        options: ManagerOptions,
    ) -> Self {
        Self {
            locator,
            provider,
            exchange,
            sink,
            signed_in: None,
            credentials: None,
            guard: RefreshGuard::new(options.refresh_min_interval),
            expiry_buffer: options.expiry_buffer,
        }
    }

    /// Wire up the Cognito transports and environment publisher from config
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.http_request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        let locator: Arc<dyn PoolLocator> = match &config.user_management_uri {
            Some(uri) => {
                tracing::info!("Resolving user pools via user management API: {}", uri);
                let api = UserManagementApi::with_client(
                    client.clone(),
                    uri,
                    config.region.clone(),
                    ApiCredentials::None,
                )?;
                Arc::new(UserManagementPoolLocator::new(api))
            }
            None => Arc::new(StaticPoolLocator::new(
                config.user_pool_id.clone().unwrap_or_default(),
                config.client_id.clone().unwrap_or_default(),
                config.identity_pool_id.clone().unwrap_or_default(),
            )),
        };

        let provider = match &config.identity_provider_endpoint {
            Some(endpoint) => CognitoIdentityProvider::with_endpoint(client.clone(), endpoint),
            None => CognitoIdentityProvider::new(client.clone(), &config.region),
        };

        let federation = match &config.identity_endpoint {
            Some(endpoint) => CognitoFederationService::with_endpoint(client, endpoint),
            None => CognitoFederationService::new(client, &config.region),
        };

        let exchange = CredentialExchange::new(
            ExchangeConfig {
                region: config.region.clone(),
                duration_seconds: config.credential_duration,
            },
            Arc::new(federation),
        );

        Ok(Self::new(
            locator,
            Arc::new(provider),
            exchange,
            Arc::new(EnvCredentialSink::default()),
            ManagerOptions {
                expiry_buffer: config_seconds("CREDENTIAL_EXPIRY_BUFFER", config.expiry_buffer)?,
                refresh_min_interval: config_seconds(
                    "REFRESH_MIN_INTERVAL",
                    config.refresh_min_interval,
                )?,
            },
        ))
    }

    /// Sign a user in, answering a forced password change when `new_password` is given
    ///
    /// The stored session changes only on success; on any error the previous
    /// session (if any) stays in place and the caller should treat the user as
    /// not authenticated.
    pub async fn sign_in(
        &mut self,
        username: &str,
        password: &str,
        new_password: Option<&str>,
    ) -> Result<IdentitySession> {
        tracing::info!("Signing into AWS Cognito");

        let pool = self
            .locator
            .pool_for_username(username)
            .await
            .map_err(|source| AuthError::PoolLookup {
                username: username.to_string(),
                source,
            })?;

        let outcome = self
            .provider
            .authenticate(&pool, username, password)
            .await
            .map_err(|e| {
                tracing::warn!("Authentication failed: {:#}", e);
                AuthError::Authentication(e)
            })?;

        let session = match outcome {
            AuthOutcome::Authenticated(session) => session,
            AuthOutcome::Challenge(challenge) => {
                self.answer_challenge(&pool, challenge, new_password)
                    .await?
            }
        };

        tracing::info!(
            pool_id = %pool.pool_id,
            id_token = %redact(&session.id_token),
            expires = %session.expires_at.to_rfc3339(),
            "Signed in"
        );

        // Credentials from an earlier session must not outlive it
        self.credentials = None;
        self.signed_in = Some(SignedIn {
            username: username.to_string(),
            pool,
            session: session.clone(),
        });

        Ok(session)
    }

    async fn answer_challenge(
        &self,
        pool: &PoolConfig,
        challenge: Challenge,
        new_password: Option<&str>,
    ) -> Result<IdentitySession> {
        let (user_attributes, required_attributes) = match &challenge.kind {
            ChallengeKind::NewPasswordRequired {
                user_attributes,
                required_attributes,
            } => (user_attributes, required_attributes),
            ChallengeKind::MfaRequired { challenge_name, .. } => {
                tracing::warn!("Multi-factor auth is not currently supported");
                return Err(AuthError::UnsupportedChallenge(challenge_name.clone()));
            }
            ChallengeKind::Other(name) => {
                tracing::warn!("Challenge {} is not supported", name);
                return Err(AuthError::UnsupportedChallenge(name.clone()));
            }
        };

        let new_password = match new_password.filter(|p| !p.is_empty()) {
            Some(p) => p,
            None => return Err(AuthError::NewPasswordRequired),
        };

        tracing::info!("New password required, completing challenge");
        if !required_attributes.is_empty() {
            tracing::debug!(required = ?required_attributes, "Provider requires attributes");
        }

        let mut attributes = user_attributes.clone();
        strip_immutable_attributes(&mut attributes);

        let outcome = self
            .provider
            .complete_new_password(pool, &challenge, new_password, &attributes)
            .await
            .map_err(|e| {
                tracing::warn!("New password challenge failed: {:#}", e);
                AuthError::Challenge(e)
            })?;

        match outcome {
            AuthOutcome::Authenticated(session) => Ok(session),
            AuthOutcome::Challenge(next) => match next.kind {
                ChallengeKind::MfaRequired { challenge_name, .. } => {
                    Err(AuthError::UnsupportedChallenge(challenge_name))
                }
                other => Err(AuthError::Challenge(anyhow::anyhow!(
                    "Unexpected follow-up challenge {}",
                    other.name()
                ))),
            },
        }
    }

    /// Return valid access credentials, deriving or refreshing them as needed
    ///
    /// The first call after sign-in exchanges the ID token; later calls
    /// consult the refresh policy first. Credentials past `expires_at` are
    /// never returned.
    pub async fn credentials(&mut self) -> Result<AccessCredentials> {
        if self.signed_in.is_none() {
            return Err(AuthError::NotSignedIn);
        }

        if self.credentials.is_none() {
            return self.derive_initial_credentials().await;
        }

        self.ensure_fresh_credentials().await?;

        match &self.credentials {
            Some(creds) if !creds.is_expired() => Ok(creds.clone()),
            Some(creds) => {
                tracing::warn!(
                    "Credentials expired at {} and refresh was not allowed",
                    creds.expires_at.to_rfc3339()
                );
                Err(AuthError::CredentialsExpired(creds.expires_at))
            }
            None => Err(AuthError::NotSignedIn),
        }
    }

    async fn derive_initial_credentials(&mut self) -> Result<AccessCredentials> {
        let signed_in = self.signed_in.as_ref().ok_or(AuthError::NotSignedIn)?;

        let session = if signed_in
            .session
            .is_valid_at(Utc::now(), self.expiry_buffer)
        {
            signed_in.session.clone()
        } else {
            tracing::info!("Identity session expires before first exchange, refreshing");
            let fresh = self
                .provider
                .refresh_session(&signed_in.pool, &signed_in.session)
                .await
                .map_err(AuthError::SessionRefresh)?;
            self.replace_session(fresh.clone());
            fresh
        };

        let pool = self.pool().cloned().ok_or(AuthError::NotSignedIn)?;
        let creds = self.exchange.exchange(&session, &pool).await?;

        // Already expired: not published or stored, the next call exchanges again
        if creds.is_expired() {
            tracing::warn!(
                "Exchange returned credentials that expired at {}",
                creds.expires_at.to_rfc3339()
            );
            return Err(AuthError::CredentialsExpired(creds.expires_at));
        }

        self.sink.publish(&creds);
        self.credentials = Some(creds.clone());
        Ok(creds)
    }

    /// Refresh session and credentials if they are stale and the guard allows it
    ///
    /// Gates, in order: the refresh guard, then the expiry buffer. Neither
    /// gate performs network I/O. Called before the first `credentials()`,
    /// it refreshes the session too, since there are no credentials yet.
    pub async fn ensure_fresh_credentials(&mut self) -> Result<RefreshOutcome> {
        let (pool, current_session) = match &self.signed_in {
            Some(signed_in) => (signed_in.pool.clone(), signed_in.session.clone()),
            None => return Err(AuthError::NotSignedIn),
        };

        let now = Utc::now();
        if !self.guard.allows_at(now) {
            tracing::debug!("Refresh suppressed by minimum interval guard");
            return Ok(RefreshOutcome::SKIPPED);
        }

        if let Some(creds) = &self.credentials {
            if !creds.needs_refresh_at(now, self.expiry_buffer) {
                return Ok(RefreshOutcome::SKIPPED);
            }
        }

        tracing::info!("Refreshing Cognito credentials");

        let new_session = self
            .provider
            .refresh_session(&pool, &current_session)
            .await
            .map_err(|e| {
                tracing::error!("Session refresh failed: {:#}", e);
                AuthError::SessionRefresh(e)
            })?;

        self.replace_session(new_session.clone());

        // Not transactional: if the exchange below fails, the refreshed
        // session stays stored while the old credentials remain. Unclear
        // whether that is intended (the next retry starts from the newer
        // session) or an oversight; kept as observed.
        let creds = match self.exchange.exchange(&new_session, &pool).await {
            Ok(creds) => creds,
            Err(e) => {
                tracing::error!("Credential exchange after session refresh failed: {}", e);
                return Err(e);
            }
        };

        self.sink.publish(&creds);
        self.credentials = Some(creds);
        self.guard.record(Utc::now());

        tracing::info!("Cognito token successfully updated");
        Ok(RefreshOutcome::REFRESHED)
    }

    fn replace_session(&mut self, session: IdentitySession) {
        if let Some(signed_in) = self.signed_in.as_mut() {
            signed_in.session = session;
        }
    }

    pub fn is_signed_in(&self) -> bool {
        self.signed_in.is_some()
    }

    pub fn username(&self) -> Option<&str> {
        self.signed_in.as_ref().map(|s| s.username.as_str())
    }

    pub fn session(&self) -> Option<&IdentitySession> {
        self.signed_in.as_ref().map(|s| &s.session)
    }

    pub fn pool(&self) -> Option<&PoolConfig> {
        self.signed_in.as_ref().map(|s| &s.pool)
    }

    /// Stored credentials, without any refresh
    pub fn current_credentials(&self) -> Option<&AccessCredentials> {
        self.credentials.as_ref()
    }

    pub fn guard(&self) -> &RefreshGuard {
        &self.guard
    }

    /// Override the guard, e.g. zero interval to force eligibility
    pub fn guard_mut(&mut self) -> &mut RefreshGuard {
        &mut self.guard
    }
}

fn config_seconds(name: &str, secs: u64) -> Result<Duration> {
    seconds(secs).ok_or_else(|| AuthError::Config(format!("{} is out of range: {}", name, secs)))
}

/// Mutex-guarded facade for sharing one manager between tasks
///
/// Every operation holds the lock for its whole duration, including network
/// calls, so sign-in and refresh never interleave.
#[derive(Clone)]
pub struct SharedAuthManager {
    inner: Arc<Mutex<AuthManager>>,
}

impl SharedAuthManager {
    pub fn new(manager: AuthManager) -> Self {
        Self {
            inner: Arc::new(Mutex::new(manager)),
        }
    }

    pub async fn sign_in(
        &self,
        username: &str,
        password: &str,
        new_password: Option<&str>,
    ) -> Result<IdentitySession> {
        self.inner
            .lock()
            .await
            .sign_in(username, password, new_password)
            .await
    }

    pub async fn credentials(&self) -> Result<AccessCredentials> {
        self.inner.lock().await.credentials().await
    }

    pub async fn ensure_fresh_credentials(&self) -> Result<RefreshOutcome> {
        self.inner.lock().await.ensure_fresh_credentials().await
    }

    pub async fn session(&self) -> Option<IdentitySession> {
        self.inner.lock().await.session().cloned()
    }

    /// Exclusive access for anything not covered above
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, AuthManager> {
        self.inner.lock().await
    }
}
