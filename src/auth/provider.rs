// Identity provider transport
// Drives the Cognito user pool challenge/response protocol

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::Client;
use std::collections::HashMap;

use super::aws_json;
use super::types::{
    AuthOutcome, Challenge, ChallengeKind, CognitoAuthResponse, IdentitySession,
    InitiateAuthRequest, PoolConfig, RespondToAuthChallengeRequest,
};

const INITIATE_AUTH: &str = "AWSCognitoIdentityProviderService.InitiateAuth";
const RESPOND_TO_AUTH_CHALLENGE: &str = "AWSCognitoIdentityProviderService.RespondToAuthChallenge";

const NEW_PASSWORD_REQUIRED: &str = "NEW_PASSWORD_REQUIRED";
const MFA_CHALLENGES: &[&str] = &["SMS_MFA", "SOFTWARE_TOKEN_MFA", "SELECT_MFA_TYPE", "MFA_SETUP"];

/// Attributes the provider marks read-only; submitting them fails the challenge
pub const IMMUTABLE_ATTRIBUTES: &[&str] =
    &["email_verified", "phone_number_verified", "custom:tenant_id"];

/// Default ID token lifetime when the provider omits `ExpiresIn`
const DEFAULT_EXPIRES_IN: i64 = 3600;

/// Challenge/response protocol against a hosted identity provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Start authentication with username and password
    async fn authenticate(
        &self,
        pool: &PoolConfig,
        username: &str,
        password: &str,
    ) -> Result<AuthOutcome>;

    /// Answer a forced password change challenge
    async fn complete_new_password(
        &self,
        pool: &PoolConfig,
        challenge: &Challenge,
        new_password: &str,
        user_attributes: &HashMap<String, String>,
    ) -> Result<AuthOutcome>;

    /// Trade the session's refresh token for a new session
    async fn refresh_session(
        &self,
        pool: &PoolConfig,
        session: &IdentitySession,
    ) -> Result<IdentitySession>;
}

/// Remove attributes the provider will not accept back
pub fn strip_immutable_attributes(attributes: &mut HashMap<String, String>) {
    for name in IMMUTABLE_ATTRIBUTES {
        attributes.remove(*name);
    }
}

/// Cognito user pool client speaking the AWS JSON protocol
pub struct CognitoIdentityProvider {
    client: Client,
    endpoint: String,
}

impl CognitoIdentityProvider {
    pub fn new(client: Client, region: &str) -> Self {
        Self::with_endpoint(client, aws_json::identity_provider_url(region))
    }

    /// Use a custom endpoint (local emulators, tests)
    pub fn with_endpoint(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl IdentityProvider for CognitoIdentityProvider {
    async fn authenticate(
        &self,
        pool: &PoolConfig,
        username: &str,
        password: &str,
    ) -> Result<AuthOutcome> {
        tracing::debug!(pool_id = %pool.pool_id, "Sending InitiateAuth (USER_PASSWORD_AUTH)");

        let request = InitiateAuthRequest {
            auth_flow: "USER_PASSWORD_AUTH",
            client_id: &pool.client_id,
            auth_parameters: HashMap::from([("USERNAME", username), ("PASSWORD", password)]),
        };

        let response: CognitoAuthResponse =
            aws_json::call(&self.client, &self.endpoint, INITIATE_AUTH, &request).await?;

        parse_auth_response(response, username, None)
    }

    async fn complete_new_password(
        &self,
        pool: &PoolConfig,
        challenge: &Challenge,
        new_password: &str,
        user_attributes: &HashMap<String, String>,
    ) -> Result<AuthOutcome> {
        tracing::debug!(
            pool_id = %pool.pool_id,
            attributes = user_attributes.len(),
            "Sending RespondToAuthChallenge (NEW_PASSWORD_REQUIRED)"
        );

        let mut challenge_responses = HashMap::from([
            ("USERNAME".to_string(), challenge.username.clone()),
            ("NEW_PASSWORD".to_string(), new_password.to_string()),
        ]);
        for (name, value) in user_attributes {
            challenge_responses.insert(format!("userAttributes.{}", name), value.clone());
        }

        let request = RespondToAuthChallengeRequest {
            challenge_name: NEW_PASSWORD_REQUIRED,
            client_id: &pool.client_id,
            session: &challenge.session,
            challenge_responses,
        };

        let response: CognitoAuthResponse =
            aws_json::call(&self.client, &self.endpoint, RESPOND_TO_AUTH_CHALLENGE, &request)
                .await?;

        parse_auth_response(response, &challenge.username, None)
    }

    async fn refresh_session(
        &self,
        pool: &PoolConfig,
        session: &IdentitySession,
    ) -> Result<IdentitySession> {
        tracing::debug!(pool_id = %pool.pool_id, "Sending InitiateAuth (REFRESH_TOKEN_AUTH)");

        let request = InitiateAuthRequest {
            auth_flow: "REFRESH_TOKEN_AUTH",
            client_id: &pool.client_id,
            auth_parameters: HashMap::from([("REFRESH_TOKEN", session.refresh_token.as_str())]),
        };

        let response: CognitoAuthResponse =
            aws_json::call(&self.client, &self.endpoint, INITIATE_AUTH, &request).await?;

        // Refresh responses usually omit the refresh token; keep the current one
        match parse_auth_response(response, "", Some(session.refresh_token.as_str()))? {
            AuthOutcome::Authenticated(new_session) => Ok(new_session),
            AuthOutcome::Challenge(challenge) => anyhow::bail!(
                "Session refresh returned unexpected challenge {}",
                challenge.kind.name()
            ),
        }
    }
}

/// Map a Cognito auth response onto the outcome union
fn parse_auth_response(
    response: CognitoAuthResponse,
    username: &str,
    current_refresh_token: Option<&str>,
) -> Result<AuthOutcome> {
    if let Some(result) = response.authentication_result {
        let refresh_token = result
            .refresh_token
            .or_else(|| current_refresh_token.map(str::to_string))
            .context("Authentication result does not contain RefreshToken")?;

        if result.id_token.is_empty() {
            anyhow::bail!("Authentication result does not contain IdToken");
        }

        let expires_in = result.expires_in.unwrap_or(DEFAULT_EXPIRES_IN);
        let expires_at = Duration::try_seconds(expires_in)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .with_context(|| format!("ExpiresIn out of range: {}", expires_in))?;

        return Ok(AuthOutcome::Authenticated(IdentitySession {
            id_token: result.id_token,
            refresh_token,
            access_token: result.access_token,
            expires_at,
        }));
    }

    let challenge_name = response
        .challenge_name
        .context("Response contains neither AuthenticationResult nor ChallengeName")?;
    let mut parameters = response.challenge_parameters;

    let challenge_username = parameters
        .remove("USER_ID_FOR_SRP")
        .unwrap_or_else(|| username.to_string());

    let kind = if challenge_name == NEW_PASSWORD_REQUIRED {
        let user_attributes = match parameters.get("userAttributes") {
            Some(raw) => parse_user_attributes(raw)?,
            None => HashMap::new(),
        };
        let required_attributes = match parameters.get("requiredAttributes") {
            Some(raw) => parse_required_attributes(raw)?,
            None => Vec::new(),
        };
        ChallengeKind::NewPasswordRequired {
            user_attributes,
            required_attributes,
        }
    } else if MFA_CHALLENGES.contains(&challenge_name.as_str()) {
        ChallengeKind::MfaRequired {
            challenge_name,
            delivery: parameters,
        }
    } else {
        ChallengeKind::Other(challenge_name)
    };

    Ok(AuthOutcome::Challenge(Challenge {
        kind,
        username: challenge_username,
        session: response.session.unwrap_or_default(),
    }))
}

/// `userAttributes` arrives as a JSON object encoded in a string
fn parse_user_attributes(raw: &str) -> Result<HashMap<String, String>> {
    let values: HashMap<String, serde_json::Value> =
        serde_json::from_str(raw).context("Failed to parse challenge userAttributes")?;

    Ok(values
        .into_iter()
        .map(|(name, value)| {
            let value = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (name, value)
        })
        .collect())
}

/// `requiredAttributes` is a JSON array of `userAttributes.`-prefixed names
fn parse_required_attributes(raw: &str) -> Result<Vec<String>> {
    let names: Vec<String> =
        serde_json::from_str(raw).context("Failed to parse challenge requiredAttributes")?;

    Ok(names
        .into_iter()
        .map(|name| match name.strip_prefix("userAttributes.") {
            Some(stripped) => stripped.to_string(),
            None => name,
        })
        .collect())
}
