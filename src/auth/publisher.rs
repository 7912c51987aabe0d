// Environment credential publisher
// One-way projection of access credentials into the process environment

use super::types::AccessCredentials;

pub const ACCESS_KEY_ID_VAR: &str = "AWS_ACCESS_KEY_ID";
pub const SECRET_ACCESS_KEY_VAR: &str = "AWS_SECRET_ACCESS_KEY";
pub const SESSION_TOKEN_VAR: &str = "AWS_SESSION_TOKEN";

/// The values that were projected by a publish
#[derive(Clone, PartialEq, Eq)]
pub struct PublishedCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
}

impl From<&AccessCredentials> for PublishedCredentials {
    fn from(creds: &AccessCredentials) -> Self {
        Self {
            access_key_id: creds.access_key_id.clone(),
            secret_access_key: creds.secret_access_key.clone(),
            session_token: creds.session_token.clone(),
        }
    }
}

impl std::fmt::Debug for PublishedCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishedCredentials")
            .field("access_key_id", &self.access_key_id)
            .finish_non_exhaustive()
    }
}

/// Destination for freshly issued credentials
///
/// Last writer wins; sinks do not guard against concurrent writers.
pub trait CredentialSink: Send + Sync {
    fn publish(&self, credentials: &AccessCredentials) -> PublishedCredentials;
}

/// Writes credentials into process environment variables
#[derive(Debug, Clone)]
pub struct EnvCredentialSink {
    access_key_id_var: String,
    secret_access_key_var: String,
    session_token_var: String,
}

impl EnvCredentialSink {
    /// Use custom variable names instead of the AWS defaults
    pub fn with_names(
        access_key_id_var: impl Into<String>,
        secret_access_key_var: impl Into<String>,
        session_token_var: impl Into<String>,
    ) -> Self {
        Self {
            access_key_id_var: access_key_id_var.into(),
            secret_access_key_var: secret_access_key_var.into(),
            session_token_var: session_token_var.into(),
        }
    }
}

impl Default for EnvCredentialSink {
    fn default() -> Self {
        Self::with_names(ACCESS_KEY_ID_VAR, SECRET_ACCESS_KEY_VAR, SESSION_TOKEN_VAR)
    }
}

impl CredentialSink for EnvCredentialSink {
    fn publish(&self, credentials: &AccessCredentials) -> PublishedCredentials {
        std::env::set_var(&self.access_key_id_var, &credentials.access_key_id);
        std::env::set_var(&self.secret_access_key_var, &credentials.secret_access_key);
        std::env::set_var(&self.session_token_var, &credentials.session_token);

        tracing::debug!(
            access_key_id = %credentials.access_key_id,
            "Published credentials to environment"
        );

        PublishedCredentials::from(credentials)
    }
}
