use anyhow::{Context, Result};

use cognito_auth::auth::{AuthManager, ACCESS_KEY_ID_VAR, SECRET_ACCESS_KEY_VAR, SESSION_TOKEN_VAR};
use cognito_auth::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let config = Config::load()?;

    // Logs go to stderr so stdout stays usable with `eval`
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    config.validate()?;

    let username = config
        .username
        .clone()
        .context("COGNITO_USERNAME is required (use -u or set COGNITO_USERNAME env var)")?;
    let password = config
        .password
        .clone()
        .context("COGNITO_PASSWORD is required (use -p or set COGNITO_PASSWORD env var)")?;

    tracing::info!("Region: {}", config.region);

    let mut manager = AuthManager::from_config(&config)?;

    match manager
        .sign_in(&username, &password, config.new_password.as_deref())
        .await
    {
        Ok(_) => tracing::info!("✅ Authentication successful"),
        Err(e) => {
            tracing::error!("❌ Authentication failed: {}", e);
            return Err(e.into());
        }
    }

    let credentials = manager.credentials().await?;
    tracing::info!(
        "Credentials valid until {}",
        credentials.expires_at.to_rfc3339()
    );

    println!("export {}={}", ACCESS_KEY_ID_VAR, credentials.access_key_id);
    println!("export {}={}", SECRET_ACCESS_KEY_VAR, credentials.secret_access_key);
    println!("export {}={}", SESSION_TOKEN_VAR, credentials.session_token);

    Ok(())
}
