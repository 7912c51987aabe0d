use anyhow::{Context, Result};
use clap::Parser;

use crate::auth::{DEFAULT_DURATION_SECONDS, MAX_DURATION_SECONDS};

/// Cognito sign-in and federated credential helper
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Username (usually an email address)
    #[arg(short = 'u', long, env = "COGNITO_USERNAME")]
    pub username: Option<String>,

    /// Password
    #[arg(short = 'p', long, env = "COGNITO_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// New password, used when the account requires a password change
    #[arg(long, env = "COGNITO_NEW_PASSWORD", hide_env_values = true)]
    pub new_password: Option<String>,

    /// AWS region of the user and identity pools
    #[arg(short = 'r', long, env = "AWS_REGION", default_value = "us-east-1")]
    pub region: String,

    /// Cognito user pool id
    #[arg(long, env = "COGNITO_USER_POOL_ID")]
    pub user_pool_id: Option<String>,

    /// Cognito app client id
    #[arg(long, env = "COGNITO_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Cognito identity pool id
    #[arg(long, env = "COGNITO_IDENTITY_POOL_ID")]
    pub identity_pool_id: Option<String>,

    /// User management API root; when set, pools are looked up per user
    #[arg(long, env = "USER_MANAGEMENT_URI")]
    pub user_management_uri: Option<String>,

    /// Lifetime requested for access credentials, in seconds
    #[arg(long, env = "CREDENTIAL_DURATION", default_value_t = DEFAULT_DURATION_SECONDS)]
    pub credential_duration: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
    pub http_timeout: u64,
}

#[derive(Clone, Debug)]
pub struct Config {
    // Pool selection
    pub region: String,
    pub user_pool_id: Option<String>,
    pub client_id: Option<String>,
    pub identity_pool_id: Option<String>,
    pub user_management_uri: Option<String>,

    // Sign-in
    pub username: Option<String>,
    pub password: Option<String>,
    pub new_password: Option<String>,

    // Credential lifecycle (seconds)
    pub credential_duration: u64,
    pub expiry_buffer: u64,
    pub refresh_min_interval: u64,

    // HTTP client
    pub http_request_timeout: u64,
    pub identity_provider_endpoint: Option<String>,
    pub identity_endpoint: Option<String>,

    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            user_pool_id: None,
            client_id: None,
            identity_pool_id: None,
            user_management_uri: None,
            username: None,
            password: None,
            new_password: None,
            credential_duration: DEFAULT_DURATION_SECONDS,
            expiry_buffer: 15,
            refresh_min_interval: 30,
            http_request_timeout: 30,
            identity_provider_endpoint: None,
            identity_endpoint: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration with priority: CLI > ENV > .env > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();
        Self::from_args(args)
    }

    pub fn from_args(args: CliArgs) -> Result<Self> {
        let defaults = Config::default();

        Ok(Config {
            region: args.region,
            user_pool_id: args.user_pool_id,
            client_id: args.client_id,
            identity_pool_id: args.identity_pool_id,
            user_management_uri: args.user_management_uri,

            username: args.username,
            password: args.password,
            new_password: args.new_password.filter(|p| !p.is_empty()),

            credential_duration: args.credential_duration,
            expiry_buffer: env_u64("CREDENTIAL_EXPIRY_BUFFER")?.unwrap_or(defaults.expiry_buffer),
            refresh_min_interval: env_u64("REFRESH_MIN_INTERVAL")?
                .unwrap_or(defaults.refresh_min_interval),

            http_request_timeout: args.http_timeout,
            identity_provider_endpoint: std::env::var("COGNITO_IDP_ENDPOINT").ok(),
            identity_endpoint: std::env::var("COGNITO_IDENTITY_ENDPOINT").ok(),

            log_level: args.log_level,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.user_management_uri.is_none() {
            for (name, value) in [
                ("COGNITO_USER_POOL_ID", &self.user_pool_id),
                ("COGNITO_CLIENT_ID", &self.client_id),
                ("COGNITO_IDENTITY_POOL_ID", &self.identity_pool_id),
            ] {
                if value.as_deref().map_or(true, str::is_empty) {
                    anyhow::bail!(
                        "{} is required when USER_MANAGEMENT_URI is not set",
                        name
                    );
                }
            }
        }

        if self.credential_duration == 0 || self.credential_duration > MAX_DURATION_SECONDS {
            anyhow::bail!(
                "CREDENTIAL_DURATION must be between 1 and {} seconds",
                MAX_DURATION_SECONDS
            );
        }

        if self.expiry_buffer >= self.credential_duration {
            anyhow::bail!("CREDENTIAL_EXPIRY_BUFFER must be shorter than CREDENTIAL_DURATION");
        }

        if self.refresh_min_interval > MAX_DURATION_SECONDS {
            anyhow::bail!(
                "REFRESH_MIN_INTERVAL must be at most {} seconds",
                MAX_DURATION_SECONDS
            );
        }

        if self.http_request_timeout == 0 {
            anyhow::bail!("HTTP_REQUEST_TIMEOUT must be greater than zero");
        }

        Ok(())
    }
}

/// Parse an optional numeric environment variable
fn env_u64(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{} must be a whole number of seconds", name)),
        Err(_) => Ok(None),
    }
}
