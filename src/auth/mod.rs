// Authentication module
// Manages the identity session and federated credential lifecycle

mod aws_json;
mod exchange;
mod locator;
mod manager;
mod provider;
mod publisher;
mod refresh;
mod types;

pub use exchange::{
    CognitoFederationService, CredentialExchange, ExchangeConfig, FederationService,
    DEFAULT_DURATION_SECONDS, MAX_DURATION_SECONDS,
};
pub use locator::{PoolLocator, StaticPoolLocator, UserManagementPoolLocator};
pub use manager::{AuthManager, ManagerOptions, SharedAuthManager};
pub use provider::{
    strip_immutable_attributes, CognitoIdentityProvider, IdentityProvider, IMMUTABLE_ATTRIBUTES,
};
pub use publisher::{
    CredentialSink, EnvCredentialSink, PublishedCredentials, ACCESS_KEY_ID_VAR,
    SECRET_ACCESS_KEY_VAR, SESSION_TOKEN_VAR,
};
pub use refresh::{RefreshGuard, RefreshOutcome};
pub use types::{
    AccessCredentials, AuthOutcome, Challenge, ChallengeKind, FederationRequest,
    IdentitySession, PoolConfig,
};
