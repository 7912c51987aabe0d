// Authentication types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identity-provider configuration for one user
///
/// Field names follow the user-management API's pool document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(rename = "UserPoolId")]
    pub pool_id: String,
    #[serde(rename = "ClientId")]
    pub client_id: String,
    #[serde(rename = "IdentityPoolId")]
    pub identity_pool_id: String,
}

/// Tokens proving a user authenticated with the identity provider
#[derive(Clone, PartialEq, Eq)]
pub struct IdentitySession {
    pub id_token: String,
    pub refresh_token: String,
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl IdentitySession {
    /// True while the ID token has not expired
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now(), Duration::zero())
    }

    /// True while the ID token outlives `now` by more than `buffer`
    pub fn is_valid_at(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        match now.checked_add_signed(buffer) {
            Some(deadline) => deadline < self.expires_at,
            None => false,
        }
    }
}

// Tokens stay out of debug output
impl std::fmt::Debug for IdentitySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentitySession")
            .field("id_token", &redact(&self.id_token))
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Short-lived federated credentials derived from an identity session
#[derive(Clone, PartialEq, Eq)]
pub struct AccessCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessCredentials {
    /// True once `now` is inside the buffer window before expiry
    pub fn needs_refresh_at(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        match now.checked_add_signed(buffer) {
            Some(deadline) => deadline >= self.expires_at,
            None => true,
        }
    }

    pub fn needs_refresh(&self, buffer: Duration) -> bool {
        self.needs_refresh_at(Utc::now(), buffer)
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

impl std::fmt::Debug for AccessCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// First few characters of a secret, for logs
/// Whole seconds as a chrono duration, `None` when out of range
pub(crate) fn seconds(secs: u64) -> Option<Duration> {
    i64::try_from(secs).ok().and_then(Duration::try_seconds)
}

pub fn redact(secret: &str) -> String {
    let prefix: String = secret.chars().take(8).collect();
    format!("{}...", prefix)
}

/// Terminal result of one authentication round-trip
///
/// Errors travel on the `Err` arm of the surrounding `Result`, so together
/// the three terminal outcomes are success, error and challenge.
#[derive(Debug, Clone)]
pub enum AuthOutcome {
    Authenticated(IdentitySession),
    Challenge(Challenge),
}

/// A follow-up step required before a session is issued
#[derive(Debug, Clone)]
pub struct Challenge {
    pub kind: ChallengeKind,
    /// Username the provider expects in the challenge response
    pub username: String,
    /// Opaque continuation token handed back with the response
    pub session: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChallengeKind {
    NewPasswordRequired {
        user_attributes: HashMap<String, String>,
        required_attributes: Vec<String>,
    },
    MfaRequired {
        challenge_name: String,
        delivery: HashMap<String, String>,
    },
    Other(String),
}

impl ChallengeKind {
    pub fn name(&self) -> &str {
        match self {
            ChallengeKind::NewPasswordRequired { .. } => "NEW_PASSWORD_REQUIRED",
            ChallengeKind::MfaRequired { challenge_name, .. } => challenge_name,
            ChallengeKind::Other(name) => name,
        }
    }
}

/// Federation exchange request
#[derive(Debug, Clone, PartialEq)]
pub struct FederationRequest {
    pub identity_pool_id: String,
    /// Issuer identifier mapped to the ID token
    pub logins: HashMap<String, String>,
    pub duration_seconds: u64,
}

/// Cognito InitiateAuth / RespondToAuthChallenge response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CognitoAuthResponse {
    pub authentication_result: Option<CognitoAuthenticationResult>,
    pub challenge_name: Option<String>,
    #[serde(default)]
    pub challenge_parameters: HashMap<String, String>,
    pub session: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CognitoAuthenticationResult {
    pub access_token: String,
    pub id_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
}

/// Cognito InitiateAuth request
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct InitiateAuthRequest<'a> {
    pub auth_flow: &'a str,
    pub client_id: &'a str,
    pub auth_parameters: HashMap<&'a str, &'a str>,
}

/// Cognito RespondToAuthChallenge request
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RespondToAuthChallengeRequest<'a> {
    pub challenge_name: &'a str,
    pub client_id: &'a str,
    pub session: &'a str,
    pub challenge_responses: HashMap<String, String>,
}

/// Cognito Identity GetId request
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetIdRequest<'a> {
    pub identity_pool_id: &'a str,
    pub logins: &'a HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetIdResponse {
    pub identity_id: String,
}

/// Cognito Identity GetCredentialsForIdentity request
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetCredentialsRequest<'a> {
    pub identity_id: &'a str,
    pub logins: &'a HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetCredentialsResponse {
    pub credentials: FederatedCredentials,
}

/// Credentials block; `Expiration` is epoch seconds
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FederatedCredentials {
    pub access_key_id: String,
    pub secret_key: String,
    pub session_token: String,
    pub expiration: f64,
}
