// Integration tests for Cognito Auth
//
// These tests run the real HTTP transports against mockito servers standing in
// for the Cognito user pool, Cognito Identity and the user management API.

use chrono::{Duration, Utc};
use mockito::{Matcher, Mock, Server, ServerGuard};
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;

use cognito_auth::{
    auth::{
        AuthManager, AuthOutcome, ChallengeKind, CognitoFederationService,
        CognitoIdentityProvider, CredentialExchange, EnvCredentialSink, ExchangeConfig,
        FederationRequest, FederationService, IdentityProvider, ManagerOptions, PoolConfig,
        PoolLocator, RefreshOutcome, StaticPoolLocator, UserManagementPoolLocator,
    },
    error::AuthError,
    http_client::{ApiCredentials, UserManagementApi},
};

// ==================================================================================================
// Test Helpers
// ==================================================================================================

const INITIATE_AUTH: &str = "AWSCognitoIdentityProviderService.InitiateAuth";
const RESPOND_TO_AUTH_CHALLENGE: &str = "AWSCognitoIdentityProviderService.RespondToAuthChallenge";
const GET_ID: &str = "AWSCognitoIdentityService.GetId";
const GET_CREDENTIALS: &str = "AWSCognitoIdentityService.GetCredentialsForIdentity";

const ISSUER: &str = "cognito-idp.us-east-1.amazonaws.com/us-east-1_test";

fn test_pool() -> PoolConfig {
    PoolConfig {
        pool_id: "us-east-1_test".to_string(),
        client_id: "test-client".to_string(),
        identity_pool_id: "us-east-1:identity-pool".to_string(),
    }
}

fn auth_result(id_token: &str, refresh_token: Option<&str>) -> String {
    let mut result = json!({
        "AccessToken": format!("access-{}", id_token),
        "IdToken": id_token,
        "ExpiresIn": 3600,
        "TokenType": "Bearer",
    });
    if let Some(refresh_token) = refresh_token {
        result["RefreshToken"] = json!(refresh_token);
    }
    json!({ "AuthenticationResult": result, "ChallengeParameters": {} }).to_string()
}

async fn mock_aws(
    server: &mut ServerGuard,
    target: &str,
    body_matcher: Matcher,
    status: usize,
    response: String,
) -> Mock {
    server
        .mock("POST", "/")
        .match_header("x-amz-target", target)
        .match_header("content-type", "application/x-amz-json-1.1")
        .match_body(body_matcher)
        .with_status(status)
        .with_header("content-type", "application/x-amz-json-1.1")
        .with_body(response)
        .create_async()
        .await
}

/// GetId + GetCredentialsForIdentity for one ID token
async fn mock_federation(
    server: &mut ServerGuard,
    id_token: &str,
    access_key_id: &str,
    expires_in: i64,
) -> (Mock, Mock) {
    let get_id = mock_aws(
        server,
        GET_ID,
        Matcher::PartialJson(json!({
            "IdentityPoolId": "us-east-1:identity-pool",
            "Logins": { ISSUER: id_token },
        })),
        200,
        json!({ "IdentityId": "us-east-1:identity-1" }).to_string(),
    )
    .await;

    let expiration = (Utc::now() + Duration::seconds(expires_in)).timestamp();
    let get_credentials = mock_aws(
        server,
        GET_CREDENTIALS,
        Matcher::PartialJson(json!({
            "IdentityId": "us-east-1:identity-1",
            "Logins": { ISSUER: id_token },
        })),
        200,
        json!({
            "IdentityId": "us-east-1:identity-1",
            "Credentials": {
                "AccessKeyId": access_key_id,
                "SecretKey": format!("secret-{}", access_key_id),
                "SessionToken": format!("token-{}", access_key_id),
                "Expiration": expiration,
            }
        })
        .to_string(),
    )
    .await;

    (get_id, get_credentials)
}

fn manager_for(server: &ServerGuard, sink: EnvCredentialSink) -> AuthManager {
    let client = Client::new();
    let locator = StaticPoolLocator::new("us-east-1_test", "test-client", "us-east-1:identity-pool");
    let provider = CognitoIdentityProvider::with_endpoint(client.clone(), server.url());
    let federation = CognitoFederationService::with_endpoint(client, server.url());

    AuthManager::new(
        Arc::new(locator),
        Arc::new(provider),
        CredentialExchange::new(ExchangeConfig::new("us-east-1"), Arc::new(federation)),
        Arc::new(sink),
        ManagerOptions::default(),
    )
}

fn env_sink(prefix: &str) -> EnvCredentialSink {
    EnvCredentialSink::with_names(
        format!("{}_ACCESS_KEY_ID", prefix),
        format!("{}_SECRET_ACCESS_KEY", prefix),
        format!("{}_SESSION_TOKEN", prefix),
    )
}

// ==================================================================================================
// Identity Provider Tests
// ==================================================================================================

#[tokio::test]
async fn test_authenticate_returns_session() {
    let mut server = Server::new_async().await;
    let mock = mock_aws(
        &mut server,
        INITIATE_AUTH,
        Matcher::Json(json!({
            "AuthFlow": "USER_PASSWORD_AUTH",
            "ClientId": "test-client",
            "AuthParameters": { "USERNAME": "user@example.com", "PASSWORD": "12345" },
        })),
        200,
        auth_result("id-token-1", Some("refresh-1")),
    )
    .await;

    let provider = CognitoIdentityProvider::with_endpoint(Client::new(), server.url());
    let outcome = provider
        .authenticate(&test_pool(), "user@example.com", "12345")
        .await
        .unwrap();

    mock.assert_async().await;
    match outcome {
        AuthOutcome::Authenticated(session) => {
            assert_eq!(session.id_token, "id-token-1");
            assert_eq!(session.refresh_token, "refresh-1");
            assert!(session.is_valid());
        }
        other => panic!("expected session, got {:?}", other),
    }
}

#[tokio::test]
async fn test_authenticate_failure_carries_provider_message() {
    let mut server = Server::new_async().await;
    let _rejected = mock_aws(
        &mut server,
        INITIATE_AUTH,
        Matcher::Any,
        400,
        json!({
            "__type": "NotAuthorizedException",
            "message": "Incorrect username or password.",
        })
        .to_string(),
    )
    .await;

    let provider = CognitoIdentityProvider::with_endpoint(Client::new(), server.url());
    let err = provider
        .authenticate(&test_pool(), "user@example.com", "wrong")
        .await
        .unwrap_err();

    assert!(err
        .to_string()
        .contains("NotAuthorizedException: Incorrect username or password."));
}

#[tokio::test]
async fn test_new_password_challenge_round_trip() {
    let mut server = Server::new_async().await;
    let _initiate = mock_aws(
        &mut server,
        INITIATE_AUTH,
        Matcher::Any,
        200,
        json!({
            "ChallengeName": "NEW_PASSWORD_REQUIRED",
            "ChallengeParameters": {
                "USER_ID_FOR_SRP": "user-sub-1",
                "requiredAttributes": "[]",
                "userAttributes": "{\"email_verified\":\"true\",\"email\":\"user@example.com\",\"custom:tenant_id\":\"t-1\"}",
            },
            "Session": "challenge-session",
        })
        .to_string(),
    )
    .await;

    let respond = mock_aws(
        &mut server,
        RESPOND_TO_AUTH_CHALLENGE,
        Matcher::Json(json!({
            "ChallengeName": "NEW_PASSWORD_REQUIRED",
            "ClientId": "test-client",
            "Session": "challenge-session",
            "ChallengeResponses": {
                "USERNAME": "user-sub-1",
                "NEW_PASSWORD": "N3wPassword!",
                "userAttributes.email": "user@example.com",
            },
        })),
        200,
        auth_result("id-token-2", Some("refresh-2")),
    )
    .await;

    let mut manager = manager_for(&server, env_sink("CHALLENGE_TEST"));
    let session = manager
        .sign_in("user@example.com", "temporary", Some("N3wPassword!"))
        .await
        .unwrap();

    respond.assert_async().await;
    assert_eq!(session.id_token, "id-token-2");
}

#[tokio::test]
async fn test_new_password_challenge_without_password() {
    let mut server = Server::new_async().await;
    let _initiate = mock_aws(
        &mut server,
        INITIATE_AUTH,
        Matcher::Any,
        200,
        json!({
            "ChallengeName": "NEW_PASSWORD_REQUIRED",
            "ChallengeParameters": { "userAttributes": "{}", "requiredAttributes": "[]" },
            "Session": "challenge-session",
        })
        .to_string(),
    )
    .await;
    let respond = server
        .mock("POST", "/")
        .match_header("x-amz-target", RESPOND_TO_AUTH_CHALLENGE)
        .expect(0)
        .create_async()
        .await;

    let mut manager = manager_for(&server, env_sink("NO_PASSWORD_TEST"));
    let err = manager
        .sign_in("user@example.com", "temporary", None)
        .await
        .unwrap_err();

    respond.assert_async().await;
    assert!(matches!(err, AuthError::NewPasswordRequired));
    assert!(!manager.is_signed_in());
}

#[tokio::test]
async fn test_mfa_challenge_is_unsupported() {
    let mut server = Server::new_async().await;
    let _initiate = mock_aws(
        &mut server,
        INITIATE_AUTH,
        Matcher::Any,
        200,
        json!({
            "ChallengeName": "SOFTWARE_TOKEN_MFA",
            "ChallengeParameters": {},
            "Session": "challenge-session",
        })
        .to_string(),
    )
    .await;

    let provider = CognitoIdentityProvider::with_endpoint(Client::new(), server.url());
    match provider
        .authenticate(&test_pool(), "user@example.com", "12345")
        .await
        .unwrap()
    {
        AuthOutcome::Challenge(challenge) => {
            assert!(matches!(challenge.kind, ChallengeKind::MfaRequired { .. }))
        }
        other => panic!("expected challenge, got {:?}", other),
    }

    let mut manager = manager_for(&server, env_sink("MFA_TEST"));
    let err = manager
        .sign_in("user@example.com", "12345", Some("N3wPassword!"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::UnsupportedChallenge(ref name) if name == "SOFTWARE_TOKEN_MFA"));
}

// ==================================================================================================
// Federation Tests
// ==================================================================================================

#[tokio::test]
async fn test_federation_exchanges_id_token() {
    let mut server = Server::new_async().await;
    let (get_id, get_credentials) = mock_federation(&mut server, "id-token-1", "ASIA1", 3600).await;

    let federation = CognitoFederationService::with_endpoint(Client::new(), server.url());
    let request = FederationRequest {
        identity_pool_id: "us-east-1:identity-pool".to_string(),
        logins: [(ISSUER.to_string(), "id-token-1".to_string())].into(),
        duration_seconds: 3600,
    };
    let creds = federation.get_credentials(&request).await.unwrap();

    get_id.assert_async().await;
    get_credentials.assert_async().await;
    assert_eq!(creds.access_key_id, "ASIA1");
    assert_eq!(creds.secret_access_key, "secret-ASIA1");
    assert_eq!(creds.session_token, "token-ASIA1");
    assert!(creds.expires_at > Utc::now());
}

// ==================================================================================================
// Credential Lifecycle Tests
// ==================================================================================================

#[tokio::test]
async fn test_sign_in_credentials_and_forced_refresh() {
    let mut server = Server::new_async().await;
    let _initiate = mock_aws(
        &mut server,
        INITIATE_AUTH,
        Matcher::PartialJson(json!({ "AuthFlow": "USER_PASSWORD_AUTH" })),
        200,
        auth_result("id-token-1", Some("refresh-1")),
    )
    .await;
    // Expires inside the default 15 second buffer
    let _first = mock_federation(&mut server, "id-token-1", "ASIA1", 10).await;

    let refresh = mock_aws(
        &mut server,
        INITIATE_AUTH,
        Matcher::Json(json!({
            "AuthFlow": "REFRESH_TOKEN_AUTH",
            "ClientId": "test-client",
            "AuthParameters": { "REFRESH_TOKEN": "refresh-1" },
        })),
        200,
        auth_result("id-token-2", None),
    )
    .await;
    let _second = mock_federation(&mut server, "id-token-2", "ASIA2", 3600).await;

    let mut manager = manager_for(&server, env_sink("LIFECYCLE_TEST"));
    manager
        .sign_in("user@example.com", "12345", None)
        .await
        .unwrap();

    let creds = manager.credentials().await.unwrap();
    assert_eq!(creds.access_key_id, "ASIA1");
    assert_eq!(std::env::var("LIFECYCLE_TEST_ACCESS_KEY_ID").unwrap(), "ASIA1");

    manager.guard_mut().set_min_interval(Duration::zero());
    let outcome = manager.ensure_fresh_credentials().await.unwrap();

    refresh.assert_async().await;
    assert_eq!(outcome, RefreshOutcome::REFRESHED);
    assert_eq!(std::env::var("LIFECYCLE_TEST_ACCESS_KEY_ID").unwrap(), "ASIA2");
    assert_eq!(
        std::env::var("LIFECYCLE_TEST_SESSION_TOKEN").unwrap(),
        "token-ASIA2"
    );

    let session = manager.session().unwrap();
    assert_eq!(session.id_token, "id-token-2");
    // Refresh responses omit the refresh token; the original one is kept
    assert_eq!(session.refresh_token, "refresh-1");

    let outcome = manager.ensure_fresh_credentials().await.unwrap();
    assert_eq!(outcome, RefreshOutcome::SKIPPED);
}

#[tokio::test]
async fn test_refresh_rejected_by_provider_keeps_credentials() {
    let mut server = Server::new_async().await;
    let _initiate = mock_aws(
        &mut server,
        INITIATE_AUTH,
        Matcher::PartialJson(json!({ "AuthFlow": "USER_PASSWORD_AUTH" })),
        200,
        auth_result("id-token-1", Some("refresh-1")),
    )
    .await;
    let _first = mock_federation(&mut server, "id-token-1", "ASIA1", 10).await;
    let _refresh = mock_aws(
        &mut server,
        INITIATE_AUTH,
        Matcher::PartialJson(json!({ "AuthFlow": "REFRESH_TOKEN_AUTH" })),
        400,
        json!({ "__type": "NotAuthorizedException", "message": "Refresh Token has expired" })
            .to_string(),
    )
    .await;

    let mut manager = manager_for(&server, env_sink("REJECTED_REFRESH_TEST"));
    manager
        .sign_in("user@example.com", "12345", None)
        .await
        .unwrap();
    let before = manager.credentials().await.unwrap();

    let err = manager.ensure_fresh_credentials().await.unwrap_err();

    assert!(matches!(err, AuthError::SessionRefresh(_)));
    assert!(err.to_string().contains("Refresh Token has expired"));
    assert_eq!(manager.current_credentials(), Some(&before));
    assert_eq!(
        std::env::var("REJECTED_REFRESH_TEST_ACCESS_KEY_ID").unwrap(),
        "ASIA1"
    );
}

// ==================================================================================================
// User Management API Tests
// ==================================================================================================

fn admin_api(server: &ServerGuard, credentials: ApiCredentials) -> UserManagementApi {
    UserManagementApi::with_client(Client::new(), &server.url(), "us-east-1", credentials).unwrap()
}

#[tokio::test]
async fn test_create_user_pool() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/admin/userpools")
        .match_body(Matcher::Json(json!({ "tenant_id": "aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee" })))
        .with_body(r#"{"id":"idididid"}"#)
        .create_async()
        .await;

    let api = admin_api(&server, ApiCredentials::None);
    let body = api
        .create_user_pool("aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee")
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(body["id"], "idididid");
}

#[tokio::test]
async fn test_delete_user_pool() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("DELETE", "/admin/userpools/idididid")
        .with_status(204)
        .create_async()
        .await;

    let api = admin_api(&server, ApiCredentials::None);
    let body = api.delete_user_pool("idididid").await.unwrap();

    mock.assert_async().await;
    assert!(body.is_null());
}

#[tokio::test]
async fn test_get_user_pools_with_bearer_token() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/userpools")
        .match_header("authorization", "Bearer blah")
        .with_body("[]")
        .create_async()
        .await;

    let api = admin_api(
        &server,
        ApiCredentials::BearerToken {
            id_token: "blah".to_string(),
        },
    );
    api.get_user_pools().await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_create_user() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/admin/users")
        .match_header("authorization", Matcher::Missing)
        .match_body(Matcher::Json(json!({
            "tenant_id": "t-1",
            "userName": "testusername",
            "password": "testpassword",
            "firstName": "Ada",
            "lastName": "Lovelace",
        })))
        .with_body("{}")
        .create_async()
        .await;

    let api = admin_api(&server, ApiCredentials::None);
    api.create_user("t-1", "testusername", "testpassword", "Ada", "Lovelace")
        .await
        .unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_register_tenant() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/tenant/register")
        .match_body(Matcher::Json(json!({
            "tenantName": "blah",
            "userName": "testusername",
            "firstName": "Ada",
            "lastName": "Lovelace",
        })))
        .with_body("{}")
        .create_async()
        .await;

    let api = admin_api(&server, ApiCredentials::None);
    api.register_tenant("blah", "testusername", "Ada", "Lovelace")
        .await
        .unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_user_paths_are_encoded() {
    let mut server = Server::new_async().await;
    let delete = server
        .mock("DELETE", "/admin/users/first%20last")
        .create_async()
        .await;
    let info = server
        .mock("GET", "/users/first%20last/info")
        .with_body(r#"{"firstName":"first"}"#)
        .create_async()
        .await;

    let api = admin_api(&server, ApiCredentials::None);
    api.delete_user("first last").await.unwrap();
    let body = api.get_user_info("first last").await.unwrap();

    delete.assert_async().await;
    info.assert_async().await;
    assert_eq!(body["firstName"], "first");
}

#[tokio::test]
async fn test_get_users_with_iam_credentials_sends_no_header() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/users")
        .match_header("authorization", Matcher::Missing)
        .with_body("[]")
        .create_async()
        .await;

    let api = admin_api(
        &server,
        ApiCredentials::Iam {
            access_key_id: "blah".to_string(),
            secret_access_key: "blah".to_string(),
        },
    );
    let body = api.get_users().await.unwrap();

    mock.assert_async().await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_admin_api_error_status() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/users/ghost/pool")
        .with_status(404)
        .with_body("User not found")
        .create_async()
        .await;

    let api = admin_api(&server, ApiCredentials::None);
    let err = api.get_user_pool_by_user_name("ghost").await.unwrap_err();

    match err {
        AuthError::AdminApi { status, message } => {
            assert_eq!(status, 404);
            assert_eq!(message, "User not found");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_user_management_pool_locator() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/users/blah/pool")
        .with_body(
            json!({
                "UserPoolId": "userpoolid",
                "ClientId": "clientid",
                "IdentityPoolId": "idpoolid",
            })
            .to_string(),
        )
        .create_async()
        .await;

    let locator = UserManagementPoolLocator::new(admin_api(&server, ApiCredentials::None));
    let pool = locator.pool_for_username("blah").await.unwrap();

    assert_eq!(
        pool,
        PoolConfig {
            pool_id: "userpoolid".to_string(),
            client_id: "clientid".to_string(),
            identity_pool_id: "idpoolid".to_string(),
        }
    );
}

#[tokio::test]
async fn test_user_management_pool_locator_rejects_incomplete_pool() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/users/blah/pool")
        .with_body(r#"{"UserPoolId":"userpoolid"}"#)
        .create_async()
        .await;

    let locator = UserManagementPoolLocator::new(admin_api(&server, ApiCredentials::None));
    assert!(locator.pool_for_username("blah").await.is_err());
}
