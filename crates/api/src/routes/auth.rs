//! Registration, login and credential endpoints.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::routing::{get, post};
use domain::PublicUser;
use serde::{Deserialize, Serialize};
use services::{AuthSession, Registration, TokenPair};
use store::Store;

use crate::error::ApiError;
use crate::extract::{ApiJson, AuthUser};
use crate::response::ApiResponse;
use crate::state::AppState;

pub fn router<S: Store + Clone + 'static>() -> Router<Arc<AppState<S>>> {
    Router::new()
        .route("/register", post(register::<S>))
        .route("/login", post(login::<S>))
        .route("/refresh-token", post(refresh::<S>))
        .route("/logout", post(logout::<S>))
        .route("/forgot-password", post(forgot_password::<S>))
        .route("/reset-password", post(reset_password::<S>))
        .route("/change-password", post(change_password::<S>))
        .route("/me", get(me::<S>))
}

// -- Request types --

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

// -- Response types --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetRequested {
    /// Present only for a registered e-mail. There is no mail delivery, so
    /// the token is handed back directly.
    pub reset_token: Option<String>,
}

// -- Handlers --

/// POST /api/auth/register
#[tracing::instrument(skip_all)]
pub async fn register<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<ApiResponse<AuthSession>, ApiError> {
    let session = state
        .auth
        .register(Registration {
            name: req.name,
            email: req.email,
            password: req.password,
            phone: req.phone,
        })
        .await?;
    Ok(ApiResponse::created(session, "Registration successful"))
}

/// POST /api/auth/login
#[tracing::instrument(skip_all)]
pub async fn login<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<ApiResponse<AuthSession>, ApiError> {
    let session = state.auth.login(&req.email, &req.password).await?;
    Ok(ApiResponse::ok(session, "Login successful"))
}

/// POST /api/auth/refresh-token: rotates the token pair.
#[tracing::instrument(skip_all)]
pub async fn refresh<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    ApiJson(req): ApiJson<RefreshRequest>,
) -> Result<ApiResponse<TokenPair>, ApiError> {
    if req.refresh_token.trim().is_empty() {
        return Err(ApiError::bad_request("refreshToken", "Refresh token is required"));
    }
    let tokens = state.auth.refresh(&req.refresh_token).await?;
    Ok(ApiResponse::ok(tokens, "Token refreshed successfully"))
}

/// POST /api/auth/logout
#[tracing::instrument(skip_all)]
pub async fn logout<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(identity): AuthUser,
) -> Result<ApiResponse<()>, ApiError> {
    state.auth.logout(identity.user_id).await?;
    Ok(ApiResponse::empty("Logout successful"))
}

/// POST /api/auth/forgot-password: answers the same way for unknown
/// addresses.
#[tracing::instrument(skip_all)]
pub async fn forgot_password<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    ApiJson(req): ApiJson<ForgotPasswordRequest>,
) -> Result<ApiResponse<ResetRequested>, ApiError> {
    let reset_token = state.auth.request_password_reset(&req.email).await?;
    Ok(ApiResponse::ok(
        ResetRequested { reset_token },
        "Password reset email sent",
    ))
}

/// POST /api/auth/reset-password
#[tracing::instrument(skip_all)]
pub async fn reset_password<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    ApiJson(req): ApiJson<ResetPasswordRequest>,
) -> Result<ApiResponse<()>, ApiError> {
    state
        .auth
        .reset_password(&req.token, &req.new_password)
        .await?;
    Ok(ApiResponse::empty("Password reset successful"))
}

/// POST /api/auth/change-password
#[tracing::instrument(skip_all)]
pub async fn change_password<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(identity): AuthUser,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> Result<ApiResponse<()>, ApiError> {
    state
        .auth
        .change_password(identity.user_id, &req.current_password, &req.new_password)
        .await?;
    Ok(ApiResponse::empty("Password changed successfully"))
}

/// GET /api/auth/me
#[tracing::instrument(skip_all)]
pub async fn me<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(identity): AuthUser,
) -> Result<ApiResponse<PublicUser>, ApiError> {
    let user = state.accounts.get_profile(identity.user_id).await?;
    Ok(ApiResponse::ok(user, "User retrieved successfully"))
}
