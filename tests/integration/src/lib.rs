//! Integration tests for Tessera.
//!
//! These tests run the whole stack in process: the HTTP API, the user
//! service, the provider client and a SQLite local store, against a mock
//! identity provider that issues real RS256 tokens.

// Allow unwrap() in tests - panics are acceptable for test assertions
#![allow(clippy::disallowed_methods)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tempfile::TempDir;
use tessera_api::{router, AppState, Validator};
use tessera_auth::testutil::{
    access_token_claims, id_token_claims, jwks, mint, KEY_A, TEST_CLIENT_ID, TEST_POOL_ID,
    TEST_REGION,
};
use tessera_identity::{CognitoClient, ProviderConfig};
use tessera_storage_sqlite::SqliteUserStore;
use tessera_users::UserService;
use tokio::task::JoinHandle;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const CLIENT_SECRET: &str = "integration-client-secret";
pub const CONFIRMATION_CODE: &str = "123456";

// ============================================================================
// Mock Identity Provider
// ============================================================================

/// Identity provider double speaking the JSON 1.1 protocol.
pub struct MockIdentityProvider {
    pub server: MockServer,
}

impl MockIdentityProvider {
    /// Starts the mock and publishes the signing keys.
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/{TEST_POOL_ID}/.well-known/jwks.json")))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks(&[KEY_A])))
            .mount(&server)
            .await;
        Self { server }
    }

    /// Expected `iss` of issued tokens.
    pub fn issuer(&self) -> String {
        format!("{}/{TEST_POOL_ID}", self.server.uri())
    }

    /// Client configuration pointing at this mock.
    pub fn config(&self) -> ProviderConfig {
        ProviderConfig::new(TEST_REGION, TEST_POOL_ID, TEST_CLIENT_ID, CLIENT_SECRET)
            .with_credentials("AKIDINTEGRATION", "integration-secret-access-key")
            .with_endpoint(self.server.uri(), true)
    }

    async fn on(&self, operation: &str, body: Value, response: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path("/"))
            .and(header(
                "x-amz-target",
                format!("AWSCognitoIdentityProviderService.{operation}").as_str(),
            ))
            .and(body_partial_json(body))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }

    /// Accepts the sign-up of `username`.
    pub async fn accept_sign_up(&self, username: &str) {
        self.on(
            "SignUp",
            json!({ "Username": username }),
            ResponseTemplate::new(200)
                .set_body_json(json!({"UserConfirmed": false, "UserSub": format!("sub-{username}")})),
        )
        .await;
    }

    /// Rejects the sign-up of `username` as a duplicate.
    pub async fn reject_sign_up(&self, username: &str) {
        self.on(
            "SignUp",
            json!({ "Username": username }),
            provider_error("UsernameExistsException", "User already exists"),
        )
        .await;
    }

    /// Accepts [`CONFIRMATION_CODE`] for `username`.
    pub async fn accept_confirmation(&self, username: &str) {
        self.on(
            "ConfirmSignUp",
            json!({ "Username": username, "ConfirmationCode": CONFIRMATION_CODE }),
            ResponseTemplate::new(200).set_body_json(json!({})),
        )
        .await;
    }

    /// Reports whether `username` exists on admin lookups.
    pub async fn user_exists(&self, username: &str, exists: bool) {
        let response = if exists {
            ResponseTemplate::new(200).set_body_json(json!({"Username": username, "Enabled": true}))
        } else {
            provider_error("UserNotFoundException", "User does not exist.")
        };
        self.on("AdminGetUser", json!({ "Username": username }), response)
            .await;
    }

    /// Logs `username` in with `password`, issuing real tokens.
    pub async fn accept_login(&self, username: &str, password: &str) {
        let issuer = self.issuer();
        let id_token = mint(&KEY_A, &id_token_claims(&issuer, username, 3600));
        let access_token = mint(&KEY_A, &access_token_claims(&issuer, username, 3600));

        self.on(
            "InitiateAuth",
            json!({
                "AuthFlow": "USER_PASSWORD_AUTH",
                "AuthParameters": { "USERNAME": username, "PASSWORD": password },
            }),
            ResponseTemplate::new(200).set_body_json(json!({
                "AuthenticationResult": {
                    "IdToken": id_token,
                    "AccessToken": access_token.clone(),
                    "RefreshToken": "opaque-refresh-token",
                    "ExpiresIn": 3600,
                    "TokenType": "Bearer",
                },
                "ChallengeParameters": {},
            })),
        )
        .await;

        self.on(
            "GetUser",
            json!({ "AccessToken": access_token }),
            ResponseTemplate::new(200).set_body_json(json!({
                "Username": username,
                "UserAttributes": [
                    {"Name": "sub", "Value": format!("sub-{username}")},
                    {"Name": "email", "Value": format!("{username}@example.com")},
                    {"Name": "email_verified", "Value": "true"},
                ],
            })),
        )
        .await;
    }
}

fn provider_error(kind: &str, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(400).set_body_json(json!({ "__type": kind, "message": message }))
}

// ============================================================================
// Test Server
// ============================================================================

/// The full service listening on a loopback port.
pub struct TestServer {
    pub base_url: String,
    pub client: Client,
    pub idp: MockIdentityProvider,
    pub store: Arc<SqliteUserStore>,
    handle: JoinHandle<()>,
    _data_dir: TempDir,
}

impl TestServer {
    /// Starts the service against a fresh mock provider and database.
    pub async fn start() -> Result<Self> {
        let idp = MockIdentityProvider::start().await;
        let data_dir = TempDir::new().context("Failed to create temp dir")?;

        let store = Arc::new(SqliteUserStore::open(data_dir.path(), "integration").await?);
        let provider = CognitoClient::connect(idp.config()).await?;
        let users = UserService::new(Arc::new(provider), store.clone());
        let app = router(
            AppState::new(users, Validator::default()),
            Duration::from_secs(10),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let base_url = format!("http://{}", listener.local_addr()?);
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let server = Self {
            base_url,
            client: Client::new(),
            idp,
            store,
            handle,
            _data_dir: data_dir,
        };
        server.wait_for_ready().await?;
        Ok(server)
    }

    async fn wait_for_ready(&self) -> Result<()> {
        for _ in 0..50 {
            if let Ok(resp) = self.client.get(self.url("/v1/sys/health")).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        bail!("Server did not become ready")
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<(StatusCode, Value)> {
        let resp = self.client.post(self.url(path)).json(&body).send().await?;
        read(resp).await
    }

    pub async fn get(&self, path: &str, bearer: Option<&str>) -> Result<(StatusCode, Value)> {
        let mut req = self.client.get(self.url(path));
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }
        read(req.send().await?).await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn read(resp: reqwest::Response) -> Result<(StatusCode, Value)> {
    let status = resp.status();
    let bytes = resp.bytes().await?;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_auth::TokenUse;
    use tessera_identity::{IdentityProvider, Registration};
    use tessera_storage::{LocalUserStore, StorageError};
    use tessera_users::ErrorKind;
    use tokio_util::sync::CancellationToken;

    const PASSWORD: &str = "Secret123!";

    #[tokio::test]
    async fn test_server_health() {
        let server = TestServer::start().await.unwrap();
        let (status, body) = server.get("/v1/sys/health", None).await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_full_user_lifecycle() {
        let server = TestServer::start().await.unwrap();
        server.idp.accept_sign_up("alice").await;
        server.idp.accept_confirmation("alice").await;
        server.idp.accept_login("alice", PASSWORD).await;
        server.idp.user_exists("alice", true).await;

        // Register
        let (status, body) = server
            .post(
                "/v1/users",
                json!({"username": "alice", "email": "alice@example.com", "password": PASSWORD}),
            )
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert_eq!(body["confirmed"], false);
        let local_id = body["local_id"].as_i64().unwrap();
        assert!(local_id > 0);

        // Taken
        let (_, body) = server.get("/v1/users/alice/taken", None).await.unwrap();
        assert_eq!(body["taken"], true);

        // Confirm
        let (status, body) = server
            .post(
                "/v1/users/confirm",
                json!({"username": "alice", "code": CONFIRMATION_CODE}),
            )
            .await
            .unwrap();
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["confirmed"], true);

        // Login
        let (status, body) = server
            .post("/v1/auth/login", json!({"username": "alice", "password": PASSWORD}))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::OK, "{body}");
        let id_token = body["id_token"].as_str().unwrap().to_string();
        assert!(body.get("access_token").is_none());

        // Session
        let (status, tokens) = server
            .post("/v1/auth/session", json!({"username": "alice", "password": PASSWORD}))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::OK, "{tokens}");
        assert_eq!(tokens["id_token"], id_token.as_str());
        let access_token = tokens["access_token"].as_str().unwrap().to_string();

        // Verify
        let (_, body) = server
            .post("/v1/auth/verify", json!({"token": id_token}))
            .await
            .unwrap();
        assert_eq!(body["valid"], true);

        // Details
        let (status, body) = server
            .get("/v1/users/me", Some(&access_token))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["username"], "alice");
        assert_eq!(body["email"], "alice@example.com");
        assert_eq!(body["confirmed"], true);
        assert_eq!(body["local_id"], local_id);
    }

    #[tokio::test]
    async fn test_verify_rejects_forged_token() {
        let server = TestServer::start().await.unwrap();
        let forged = mint(
            &KEY_A,
            &id_token_claims("https://attacker.example/pool", "alice", 3600),
        );

        let (status, body) = server
            .post("/v1/auth/verify", json!({"token": forged}))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["valid"], false);
    }

    #[tokio::test]
    async fn test_duplicate_registration() {
        let server = TestServer::start().await.unwrap();
        server.idp.reject_sign_up("alice").await;

        let (status, body) = server
            .post(
                "/v1/users",
                json!({"username": "alice", "email": "alice@example.com", "password": PASSWORD}),
            )
            .await
            .unwrap();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "registration_failed");
        assert!(server.store.fetch_local_user("alice").await.is_err());
    }

    #[tokio::test]
    async fn test_username_available() {
        let server = TestServer::start().await.unwrap();
        server.idp.user_exists("bob", false).await;

        let (status, body) = server.get("/v1/users/bob/taken", None).await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["taken"], false);
    }

    #[tokio::test]
    async fn test_details_without_local_record() {
        let server = TestServer::start().await.unwrap();
        server.idp.accept_login("carol", PASSWORD).await;

        let (_, tokens) = server
            .post("/v1/auth/session", json!({"username": "carol", "password": PASSWORD}))
            .await
            .unwrap();
        let access_token = tokens["access_token"].as_str().unwrap();

        let (status, body) = server
            .get("/v1/users/me", Some(access_token))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "profile_incomplete");
    }

    #[tokio::test]
    async fn test_orchestrator_end_to_end() {
        let idp = MockIdentityProvider::start().await;
        idp.accept_sign_up("alice").await;
        idp.accept_confirmation("alice").await;
        idp.accept_login("alice", PASSWORD).await;

        let data_dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteUserStore::open(data_dir.path(), "e2e").await.unwrap());
        let provider = Arc::new(CognitoClient::connect(idp.config()).await.unwrap());
        let users = UserService::new(provider.clone(), store.clone());
        let cancel = CancellationToken::new();

        let identity = users
            .create_user(
                Registration::new("alice", "alice@example.com", PASSWORD),
                &cancel,
            )
            .await
            .unwrap();
        assert!(!identity.confirmed);
        assert_eq!(identity.local_id, Some(store.fetch_local_user("alice").await.unwrap()));

        let confirmed = users
            .confirm_user("alice", CONFIRMATION_CODE, &cancel)
            .await
            .unwrap();
        assert!(confirmed.confirmed);

        let id_token = users.login("alice", PASSWORD, &cancel).await.unwrap();
        assert!(users.verify_token(&id_token, &cancel).await.unwrap());

        let claims = provider.verify_token(&id_token, &cancel).await.unwrap();
        assert_eq!(claims.username(), "alice");
        assert_eq!(claims.token_use(), TokenUse::Id);
        assert_eq!(claims.issuer(), idp.issuer());
    }

    /// Local store whose writes always fail.
    struct UnavailableStore;

    #[async_trait::async_trait]
    impl LocalUserStore for UnavailableStore {
        async fn store_local_user(&self, _username: &str) -> Result<i64, StorageError> {
            Err(StorageError::ConnectionFailed("database is down".into()))
        }

        async fn fetch_local_user(&self, username: &str) -> Result<i64, StorageError> {
            Err(StorageError::NotFound(username.into()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_leaves_provider_pending() {
        let idp = MockIdentityProvider::start().await;
        // The provider accepts the first sign-up only; afterwards the
        // username exists.
        Mock::given(method("POST"))
            .and(header(
                "x-amz-target",
                "AWSCognitoIdentityProviderService.SignUp",
            ))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"UserConfirmed": false, "UserSub": "sub-alice"})),
            )
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&idp.server)
            .await;
        idp.reject_sign_up("alice").await;

        let provider = Arc::new(CognitoClient::connect(idp.config()).await.unwrap());
        let users = UserService::new(provider, Arc::new(UnavailableStore));
        let cancel = CancellationToken::new();

        let err = users
            .create_user(
                Registration::new("alice", "alice@example.com", PASSWORD),
                &cancel,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LocalStoreUnavailable);

        let err = users
            .create_user(
                Registration::new("alice", "alice@example.com", PASSWORD),
                &cancel,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RegistrationFailed);
        assert!(err.to_string().contains("User already exists"));
    }

    #[tokio::test]
    async fn test_local_conflict_after_provider_accepts() {
        let idp = MockIdentityProvider::start().await;
        idp.accept_sign_up("alice").await;

        let data_dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteUserStore::open(data_dir.path(), "partial").await.unwrap());
        let existing = store.store_local_user("alice").await.unwrap();

        let provider = Arc::new(CognitoClient::connect(idp.config()).await.unwrap());
        let users = UserService::new(provider, store.clone());

        let err = users
            .create_user(
                Registration::new("alice", "alice@example.com", PASSWORD),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LocalStoreConflict);
        assert_eq!(store.fetch_local_user("alice").await.unwrap(), existing);
    }
}
