//! Route handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use tessera_users::Registration;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::{ApiError, AppState};

/// Token cancelled when the returned guard is dropped, i.e. when the handler
/// finishes or its future is dropped on disconnect or timeout.
fn request_scope() -> (CancellationToken, DropGuard) {
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    (cancel, guard)
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| ApiError::Validation(e.body_text()))
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("missing bearer token".into()))
}

/// `POST /v1/users` body.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    /// Username.
    pub username: String,
    /// Email address.
    pub email: String,
    /// Password.
    pub password: String,
    /// Optional phone number.
    #[serde(default)]
    pub phone_number: String,
}

/// `POST /v1/users/confirm` body.
#[derive(Debug, Deserialize)]
pub struct ConfirmUserRequest {
    /// Username.
    pub username: String,
    /// Six digit confirmation code.
    pub code: String,
}

/// `POST /v1/users/resend` body.
#[derive(Debug, Deserialize)]
pub struct ResendRequest {
    /// Username.
    pub username: String,
}

/// `POST /v1/auth/login` and `POST /v1/auth/session` body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Username.
    pub username: String,
    /// Password.
    pub password: String,
}

/// `POST /v1/auth/verify` body.
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    /// Token to check.
    pub token: String,
}

/// `GET /v1/users/{username}/taken` response.
#[derive(Debug, Serialize)]
pub struct TakenResponse {
    /// Username checked.
    pub username: String,
    /// Whether it is registered.
    pub taken: bool,
}

/// `POST /v1/auth/login` response.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    /// Identity token of the logged-in user.
    pub id_token: String,
}

/// `POST /v1/auth/verify` response.
#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    /// Whether the token is valid.
    pub valid: bool,
}

/// POST /v1/users
pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = body(payload)?;
    state.validator.username(&req.username)?;
    state.validator.email(&req.email)?;
    state.validator.password(&req.password)?;

    let registration = Registration::new(req.username, req.email, req.password)
        .with_phone_number(req.phone_number);

    let (cancel, _guard) = request_scope();
    let identity = state.users.create_user(registration, &cancel).await?;
    Ok((StatusCode::CREATED, Json(identity)))
}

/// POST /v1/users/confirm
pub async fn confirm_user(
    State(state): State<AppState>,
    payload: Result<Json<ConfirmUserRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = body(payload)?;
    state.validator.username(&req.username)?;
    state.validator.code(&req.code)?;

    let (cancel, _guard) = request_scope();
    let identity = state.users.confirm_user(&req.username, &req.code, &cancel).await?;
    Ok(Json(identity))
}

/// POST /v1/users/resend
pub async fn resend_confirmation(
    State(state): State<AppState>,
    payload: Result<Json<ResendRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = body(payload)?;
    state.validator.username(&req.username)?;

    let (cancel, _guard) = request_scope();
    state.users.resend_confirmation(&req.username, &cancel).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /v1/users/{username}/taken
pub async fn username_taken(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.validator.username(&username)?;

    let (cancel, _guard) = request_scope();
    let taken = state.users.check_username_taken(&username, &cancel).await?;
    Ok(Json(TakenResponse { username, taken }))
}

/// GET /v1/users/me
pub async fn user_details(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = bearer_token(&headers)?;

    let (cancel, _guard) = request_scope();
    let identity = state.users.user_details(token, &cancel).await?;
    Ok(Json(identity))
}

/// POST /v1/auth/login
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = body(payload)?;
    state.validator.username(&req.username)?;
    state.validator.password(&req.password)?;

    let (cancel, _guard) = request_scope();
    let id_token = state.users.login(&req.username, &req.password, &cancel).await?;
    Ok(Json(LoginResponse { id_token }))
}

/// POST /v1/auth/session
pub async fn session(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = body(payload)?;
    state.validator.username(&req.username)?;
    state.validator.password(&req.password)?;

    let (cancel, _guard) = request_scope();
    let session = state
        .users
        .login_session(&req.username, &req.password, &cancel)
        .await?;
    Ok(Json(session))
}

/// POST /v1/auth/verify
pub async fn verify_token(
    State(state): State<AppState>,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = body(payload)?;
    state.validator.token(&req.token)?;

    let (cancel, _guard) = request_scope();
    let valid = state.users.verify_token(&req.token, &cancel).await?;
    Ok(Json(VerifyResponse { valid }))
}

/// GET /v1/sys/health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
