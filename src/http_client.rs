use anyhow::Context;
use reqwest::{Client, Method, Url};
use serde_json::{json, Value};
use std::time::Duration;

use crate::auth::IdentitySession;
use crate::error::{AuthError, Result};

/// Credentials attached to administrative API requests
#[derive(Clone, PartialEq, Eq)]
pub enum ApiCredentials {
    None,
    BearerToken {
        id_token: String,
    },
    /// Accepted for parity with IAM-authorized deployments; sends no header
    Iam {
        access_key_id: String,
        secret_access_key: String,
    },
}

impl ApiCredentials {
    /// Bearer credentials from a signed-in session's ID token
    pub fn bearer(session: &IdentitySession) -> Self {
        ApiCredentials::BearerToken {
            id_token: session.id_token.clone(),
        }
    }

    fn authorization_header(&self) -> Option<String> {
        match self {
            ApiCredentials::BearerToken { id_token } => Some(format!("Bearer {}", id_token)),
            ApiCredentials::None | ApiCredentials::Iam { .. } => None,
        }
    }
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiCredentials::None => write!(f, "None"),
            ApiCredentials::BearerToken { .. } => write!(f, "BearerToken"),
            ApiCredentials::Iam { access_key_id, .. } => write!(f, "Iam({})", access_key_id),
        }
    }
}

/// Client for the user-management REST API
///
/// Each call forwards one fixed-path JSON request and returns the decoded
/// response body. No state is kept between calls.
pub struct UserManagementApi {
    /// Shared HTTP client with connection pooling
    client: Client,

    /// Service root, e.g. `https://api.example.com/dev`
    base_url: Url,

    region: String,

    credentials: ApiCredentials,
}

impl UserManagementApi {
    /// Create a client with its own HTTP connection pool
    pub fn new(
        service_endpoint: &str,
        region: impl Into<String>,
        credentials: ApiCredentials,
        request_timeout: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        Self::with_client(client, service_endpoint, region, credentials)
    }

    /// Create a client on top of an existing `reqwest::Client`
    pub fn with_client(
        client: Client,
        service_endpoint: &str,
        region: impl Into<String>,
        credentials: ApiCredentials,
    ) -> Result<Self> {
        let base_url = Url::parse(service_endpoint).map_err(|e| {
            AuthError::Config(format!(
                "Invalid user management endpoint {}: {}",
                service_endpoint, e
            ))
        })?;

        if base_url.cannot_be_a_base() {
            return Err(AuthError::Config(format!(
                "User management endpoint is not a base URL: {}",
                service_endpoint
            )));
        }

        Ok(Self {
            client,
            base_url,
            region: region.into(),
            credentials,
        })
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Replace the request credentials, e.g. after signing in
    pub fn set_credentials(&mut self, credentials: ApiCredentials) {
        self.credentials = credentials;
    }

    pub async fn create_user_pool(&self, tenant_id: &str) -> Result<Value> {
        self.invoke(
            Method::POST,
            &["admin", "userpools"],
            Some(json!({ "tenant_id": tenant_id })),
        )
        .await
    }

    pub async fn delete_user_pool(&self, id: &str) -> Result<Value> {
        self.invoke(Method::DELETE, &["admin", "userpools", id], None)
            .await
    }

    pub async fn get_user_pools(&self) -> Result<Value> {
        self.invoke(Method::GET, &["userpools"], None).await
    }

    pub async fn create_user(
        &self,
        tenant_id: &str,
        user_name: &str,
        password: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<Value> {
        self.invoke(
            Method::POST,
            &["admin", "users"],
            Some(json!({
                "tenant_id": tenant_id,
                "userName": user_name,
                "password": password,
                "firstName": first_name,
                "lastName": last_name,
            })),
        )
        .await
    }

    pub async fn register_tenant(
        &self,
        tenant_name: &str,
        user_name: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<Value> {
        self.invoke(
            Method::POST,
            &["tenant", "register"],
            Some(json!({
                "tenantName": tenant_name,
                "userName": user_name,
                "firstName": first_name,
                "lastName": last_name,
            })),
        )
        .await
    }

    pub async fn delete_user(&self, user_name: &str) -> Result<Value> {
        self.invoke(Method::DELETE, &["admin", "users", user_name], None)
            .await
    }

    pub async fn get_user_pool_by_user_name(&self, user_name: &str) -> Result<Value> {
        self.invoke(Method::GET, &["users", user_name, "pool"], None)
            .await
    }

    pub async fn get_user_info(&self, user_name: &str) -> Result<Value> {
        self.invoke(Method::GET, &["users", user_name, "info"], None)
            .await
    }

    pub async fn get_users(&self) -> Result<Value> {
        self.invoke(Method::GET, &["users"], None).await
    }

    /// Build the request URL; each segment is percent-encoded
    fn url_for(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AuthError::Config("Endpoint cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send one request and decode the JSON response
    async fn invoke(&self, method: Method, segments: &[&str], body: Option<Value>) -> Result<Value> {
        let url = self.url_for(segments)?;

        tracing::debug!(
            method = %method,
            url = %url,
            "Sending user management request"
        );

        let mut request = self.client.request(method.clone(), url.clone());
        if let Some(header) = self.credentials.authorization_header() {
            request = request.header("Authorization", header);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to send {} {}", method, url))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read response from {} {}", method, url))?;

        if !status.is_success() {
            tracing::warn!(status = %status, url = %url, "User management request failed");
            return Err(AuthError::AdminApi {
                status: status.as_u16(),
                message: text,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        let value = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse response from {} {}", method, url))?;
        Ok(value)
    }
}
