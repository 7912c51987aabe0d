// AWS JSON 1.1 protocol helper shared by the Cognito transports

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};

const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// Cognito user pool endpoint for region
pub fn identity_provider_url(region: &str) -> String {
    format!("https://cognito-idp.{}.amazonaws.com/", region)
}

/// Cognito federated identity endpoint for region
pub fn identity_url(region: &str) -> String {
    format!("https://cognito-identity.{}.amazonaws.com/", region)
}

/// Invoke one AWS JSON operation, e.g. `AWSCognitoIdentityProviderService.InitiateAuth`
pub async fn call<B, R>(client: &Client, url: &str, target: &str, body: &B) -> Result<R>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let payload = serde_json::to_vec(body).context("Failed to encode request body")?;

    let response = client
        .post(url)
        .header("Content-Type", CONTENT_TYPE)
        .header("X-Amz-Target", target)
        .body(payload)
        .send()
        .await
        .with_context(|| format!("Failed to send {} request", target))?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        tracing::debug!(operation = target, status = %status, "AWS request failed");
        anyhow::bail!("{}", describe_error(status.as_u16(), &error_text));
    }

    response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", target))
}

/// Turn an AWS error body (`{"__type": ..., "message": ...}`) into a message
fn describe_error(status: u16, body: &str) -> String {
    if let Ok(error_json) = serde_json::from_str::<serde_json::Value>(body) {
        let error_type = error_json
            .get("__type")
            .and_then(|v| v.as_str())
            .map(|t| t.rsplit('#').next().unwrap_or(t));
        let message = error_json
            .get("message")
            .or_else(|| error_json.get("Message"))
            .and_then(|v| v.as_str());

        if let Some(error_type) = error_type {
            return match message {
                Some(message) => format!("{}: {}", error_type, message),
                None => error_type.to_string(),
            };
        }
    }

    format!("HTTP {} - {}", status, body)
}
