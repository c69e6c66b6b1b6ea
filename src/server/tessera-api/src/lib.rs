//! # Tessera API
//!
//! JSON over HTTP transport for the user lifecycle.
//!
//! ## Endpoints
//!
//! - `POST /v1/users` - Register a user
//! - `POST /v1/users/confirm` - Confirm a registration
//! - `POST /v1/users/resend` - Resend the confirmation code
//! - `GET /v1/users/{username}/taken` - Username availability
//! - `GET /v1/users/me` - Profile of the bearer of an access token
//! - `POST /v1/auth/login` - Log in, returning the identity token
//! - `POST /v1/auth/session` - Log in, returning every issued token
//! - `POST /v1/auth/verify` - Check a token
//! - `GET /v1/sys/health` - Liveness
//!
//! Requests are validated before they reach the service. Each request runs
//! under its own cancellation token, cancelled when the handler is dropped.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod handlers;
pub mod validation;

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use tessera_users::UserService;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use validation::{PasswordPolicy, Validator};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// User lifecycle service.
    pub users: UserService,
    /// Request validation rules.
    pub validator: Arc<Validator>,
}

impl AppState {
    /// Creates handler state.
    pub fn new(users: UserService, validator: Validator) -> Self {
        Self {
            users,
            validator: Arc::new(validator),
        }
    }
}

/// Builds the API router.
///
/// Requests running longer than `request_timeout` are answered with
/// `408 Request Timeout` and their work is cancelled.
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/v1/users", post(handlers::create_user))
        .route("/v1/users/confirm", post(handlers::confirm_user))
        .route("/v1/users/resend", post(handlers::resend_confirmation))
        .route("/v1/users/me", get(handlers::user_details))
        .route("/v1/users/{username}/taken", get(handlers::username_taken))
        .route("/v1/auth/login", post(handlers::login))
        .route("/v1/auth/session", post(handlers::session))
        .route("/v1/auth/verify", post(handlers::verify_token))
        .route("/v1/sys/health", get(handlers::health))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use tessera_auth::testutil::verified_claims;
    use tessera_auth::{TokenUse, VerifiedClaims};
    use tessera_identity::{AuthResult, Identity, IdentityError, IdentityProvider, Registration};
    use tessera_storage::{LocalUserStore, MemoryUserStore};
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    #[derive(Default)]
    struct FakeProvider {
        stalled: Mutex<Option<CancellationToken>>,
    }

    #[async_trait]
    impl IdentityProvider for FakeProvider {
        async fn register(
            &self,
            registration: Registration,
            _cancel: &CancellationToken,
        ) -> Result<(), IdentityError> {
            if registration.username() == "alice" {
                return Err(IdentityError::RegistrationFailed {
                    reason: "User already exists".into(),
                });
            }
            Ok(())
        }

        async fn confirm_registration(
            &self,
            _username: &str,
            code: &str,
            _cancel: &CancellationToken,
        ) -> Result<(), IdentityError> {
            if code == "123456" {
                Ok(())
            } else {
                Err(IdentityError::ConfirmationFailed {
                    reason: "Invalid verification code provided, please try again.".into(),
                })
            }
        }

        async fn resend_confirmation(
            &self,
            username: &str,
            cancel: &CancellationToken,
        ) -> Result<(), IdentityError> {
            if username == "slowpoke" {
                *self.stalled.lock().unwrap() = Some(cancel.clone());
                cancel.cancelled().await;
                return Err(IdentityError::Cancelled);
            }
            Ok(())
        }

        async fn username_exists(
            &self,
            username: &str,
            _cancel: &CancellationToken,
        ) -> Result<bool, IdentityError> {
            Ok(username == "alice")
        }

        async fn authenticate(
            &self,
            username: &str,
            password: &str,
            _cancel: &CancellationToken,
        ) -> Result<AuthResult, IdentityError> {
            match (username, password) {
                ("bob", _) => Err(IdentityError::UserNotConfirmed {
                    reason: "User is not confirmed.".into(),
                }),
                ("alice", "Secret123!") => Ok(AuthResult {
                    id_token: "id:alice".into(),
                    access_token: "access:alice".into(),
                    refresh_token: Some("refresh:alice".into()),
                    expires_in: 3600,
                }),
                _ => Err(IdentityError::AuthenticationFailed {
                    reason: "Incorrect username or password.".into(),
                }),
            }
        }

        async fn fetch_profile(
            &self,
            access_token: &str,
            _cancel: &CancellationToken,
        ) -> Result<Identity, IdentityError> {
            match access_token {
                "access:alice" => Ok(Identity {
                    username: "alice".into(),
                    email: "alice@example.com".into(),
                    phone_number: String::new(),
                    confirmed: true,
                    local_id: None,
                }),
                _ => Err(IdentityError::InvalidToken("Invalid Access Token".into())),
            }
        }

        async fn verify_token(
            &self,
            token: &str,
            _cancel: &CancellationToken,
        ) -> Result<VerifiedClaims, IdentityError> {
            match token {
                "id:alice" => Ok(verified_claims("https://issuer", "alice", TokenUse::Id)),
                "keys-down" => Err(IdentityError::KeySetUnavailable("HTTP status 503".into())),
                _ => Err(IdentityError::InvalidToken("malformed token".into())),
            }
        }
    }

    struct Harness {
        app: Router,
        provider: Arc<FakeProvider>,
        store: Arc<MemoryUserStore>,
    }

    async fn harness() -> Harness {
        let provider = Arc::new(FakeProvider::default());
        let store = Arc::new(MemoryUserStore::new());
        store.store_local_user("alice").await.unwrap();

        let users = UserService::new(provider.clone(), store.clone());
        let state = AppState::new(users, Validator::default());
        Harness {
            app: router(state, Duration::from_millis(200)),
            provider,
            store,
        }
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness().await;
        let (status, body) = send(&h.app, get("/v1/sys/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_create_user() {
        let h = harness().await;
        let (status, body) = send(
            &h.app,
            post(
                "/v1/users",
                json!({"username": "carol", "email": "carol@example.com", "password": "Secret123!"}),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["username"], "carol");
        assert_eq!(body["confirmed"], false);
        assert_eq!(body["local_id"], 2);
        assert_eq!(h.store.len().await, 2);
    }

    #[tokio::test]
    async fn test_create_user_validation() {
        let h = harness().await;

        for payload in [
            json!({"username": "c", "email": "carol@example.com", "password": "Secret123!"}),
            json!({"username": "carol", "email": "not-an-email", "password": "Secret123!"}),
            json!({"username": "carol", "email": "carol@example.com", "password": "short"}),
            json!({"username": "carol"}),
        ] {
            let (status, body) = send(&h.app, post("/v1/users", payload.clone())).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "payload {payload}");
            assert_eq!(body["kind"], "validation_failed");
        }

        assert_eq!(h.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_create_user_rejected_by_provider() {
        let h = harness().await;
        let (status, body) = send(
            &h.app,
            post(
                "/v1/users",
                json!({"username": "alice", "email": "alice@example.com", "password": "Secret123!"}),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "registration_failed");
        assert!(body["error"].as_str().unwrap().contains("User already exists"));
    }

    #[tokio::test]
    async fn test_confirm_user() {
        let h = harness().await;

        let (status, body) = send(
            &h.app,
            post("/v1/users/confirm", json!({"username": "carol", "code": "123456"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["confirmed"], true);

        let (status, body) = send(
            &h.app,
            post("/v1/users/confirm", json!({"username": "carol", "code": "654321"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "confirmation_failed");

        let (status, body) = send(
            &h.app,
            post("/v1/users/confirm", json!({"username": "carol", "code": "12345a"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation_failed");
    }

    #[tokio::test]
    async fn test_resend() {
        let h = harness().await;
        let (status, _) = send(&h.app, post("/v1/users/resend", json!({"username": "carol"}))).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_username_taken() {
        let h = harness().await;

        let (status, body) = send(&h.app, get("/v1/users/alice/taken")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"username": "alice", "taken": true}));

        let (_, body) = send(&h.app, get("/v1/users/carol/taken")).await;
        assert_eq!(body["taken"], false);
    }

    #[tokio::test]
    async fn test_login_returns_id_token_only() {
        let h = harness().await;

        let (status, body) = send(
            &h.app,
            post("/v1/auth/login", json!({"username": "alice", "password": "Secret123!"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"id_token": "id:alice"}));

        let (status, body) = send(
            &h.app,
            post("/v1/auth/login", json!({"username": "alice", "password": "Wrong123!"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["kind"], "authentication_failed");

        let (status, body) = send(
            &h.app,
            post("/v1/auth/login", json!({"username": "bob", "password": "Secret123!"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["kind"], "user_not_confirmed");
    }

    #[tokio::test]
    async fn test_session_returns_every_token() {
        let h = harness().await;

        let (status, body) = send(
            &h.app,
            post("/v1/auth/session", json!({"username": "alice", "password": "Secret123!"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id_token"], "id:alice");
        assert_eq!(body["access_token"], "access:alice");
        assert_eq!(body["refresh_token"], "refresh:alice");
        assert_eq!(body["expires_in"], 3600);
    }

    #[tokio::test]
    async fn test_login_applies_password_policy() {
        let h = harness().await;

        for uri in ["/v1/auth/login", "/v1/auth/session"] {
            for password in ["", "short"] {
                let (status, body) = send(
                    &h.app,
                    post(uri, json!({"username": "alice", "password": password})),
                )
                .await;
                assert_eq!(status, StatusCode::BAD_REQUEST, "{uri} with {password:?}");
                assert_eq!(body["kind"], "validation_failed");
            }
        }
    }

    #[tokio::test]
    async fn test_verify() {
        let h = harness().await;

        let (status, body) = send(&h.app, post("/v1/auth/verify", json!({"token": "id:alice"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["valid"], true);

        let (status, body) = send(&h.app, post("/v1/auth/verify", json!({"token": "forged"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["valid"], false);

        let (status, body) = send(&h.app, post("/v1/auth/verify", json!({"token": "keys-down"}))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["kind"], "key_set_unavailable");

        let (status, _) = send(&h.app, post("/v1/auth/verify", json!({"token": ""}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_user_details() {
        let h = harness().await;

        let request = Request::builder()
            .uri("/v1/users/me")
            .header("authorization", "Bearer access:alice")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&h.app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["username"], "alice");
        assert_eq!(body["local_id"], 1);

        let (status, body) = send(&h.app, get("/v1/users/me")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["kind"], "unauthorized");

        let request = Request::builder()
            .uri("/v1/users/me")
            .header("authorization", "Bearer access:mallory")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&h.app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["kind"], "invalid_token");
    }

    #[tokio::test]
    async fn test_timeout_cancels_request() {
        let h = harness().await;

        let (status, _) = send(&h.app, post("/v1/users/resend", json!({"username": "slowpoke"}))).await;
        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);

        let cancel = h.provider.stalled.lock().unwrap().clone().unwrap();
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_malformed_json() {
        let h = harness().await;
        let request = Request::builder()
            .method("POST")
            .uri("/v1/auth/login")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let (status, body) = send(&h.app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation_failed");
    }
}
