// Error handling module
// Defines the credential lifecycle error taxonomy

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors surfaced by sign-in, credential exchange and refresh
///
/// Transport failures are carried as the `source` of the variant so callers
/// can walk the chain down to the provider's own message.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The pool locator could not resolve a pool for the user
    #[error("Pool lookup failed for {username}: {source}")]
    PoolLookup {
        username: String,
        #[source]
        source: anyhow::Error,
    },

    /// The identity provider rejected the credentials
    #[error("Authentication failed: {0}")]
    Authentication(#[source] anyhow::Error),

    /// A required follow-up step could not be completed
    #[error("Challenge completion failed: {0}")]
    Challenge(#[source] anyhow::Error),

    /// The user must change password but no new password was supplied
    #[error("New password is required for the user")]
    NewPasswordRequired,

    /// The provider asked for a challenge this crate does not implement
    #[error("Unsupported challenge: {0}")]
    UnsupportedChallenge(String),

    /// Refreshing the identity session failed
    #[error("Session refresh failed: {0}")]
    SessionRefresh(#[source] anyhow::Error),

    /// Exchanging the ID token for access credentials failed
    #[error("Credential exchange failed: {0}")]
    CredentialExchange(#[source] anyhow::Error),

    /// A credential operation was attempted before a successful sign-in
    #[error("Not signed in")]
    NotSignedIn,

    /// Credentials are past expiry and a refresh was not allowed
    #[error("Credentials expired at {0}")]
    CredentialsExpired(DateTime<Utc>),

    /// Error status returned by the administrative REST API
    #[error("Admin API error: {status} - {message}")]
    AdminApi { status: u16, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// True for errors that mean "sign-in has not occurred"
    pub fn is_sign_in_failure(&self) -> bool {
        matches!(
            self,
            AuthError::PoolLookup { .. }
                | AuthError::Authentication(_)
                | AuthError::Challenge(_)
                | AuthError::NewPasswordRequired
                | AuthError::UnsupportedChallenge(_)
        )
    }
}

/// Result type alias for credential lifecycle operations
pub type Result<T> = std::result::Result<T, AuthError>;
