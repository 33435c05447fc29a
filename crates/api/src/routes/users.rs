//! Profile and user administration endpoints.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::routing::{delete, get, patch};
use common::UserId;
use domain::{ProfileUpdate, PublicUser, Role};
use serde::Deserialize;
use serde_json::Value;
use services::ServiceError;
use store::Store;

use crate::error::ApiError;
use crate::extract::{AdminUser, ApiJson, ApiPath, ApiQuery, AuthUser};
use crate::response::{ApiResponse, listing};
use crate::routes::{PageParams, page_request};
use crate::state::AppState;

pub fn router<S: Store + Clone + 'static>() -> Router<Arc<AppState<S>>> {
    Router::new()
        .route("/", get(list::<S>))
        .route("/profile", get(profile::<S>).put(update_profile::<S>))
        .route("/account", delete(delete_account::<S>))
        .route("/{id}", get(get_user::<S>).delete(delete_user::<S>))
        .route("/{id}/role", patch(update_role::<S>))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateRoleRequest {
    pub role: String,
}

/// GET /api/users/profile
#[tracing::instrument(skip_all)]
pub async fn profile<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(identity): AuthUser,
) -> Result<ApiResponse<PublicUser>, ApiError> {
    let user = state.accounts.get_profile(identity.user_id).await?;
    Ok(ApiResponse::ok(user, "Profile retrieved successfully"))
}

/// PUT /api/users/profile
#[tracing::instrument(skip_all)]
pub async fn update_profile<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(identity): AuthUser,
    ApiJson(update): ApiJson<ProfileUpdate>,
) -> Result<ApiResponse<PublicUser>, ApiError> {
    let user = state
        .accounts
        .update_profile(identity.user_id, update)
        .await?;
    Ok(ApiResponse::ok(user, "Profile updated successfully"))
}

/// DELETE /api/users/account
#[tracing::instrument(skip_all)]
pub async fn delete_account<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(identity): AuthUser,
) -> Result<ApiResponse<()>, ApiError> {
    state.accounts.delete_account(identity.user_id).await?;
    Ok(ApiResponse::empty("Account deleted successfully"))
}

/// GET /api/users
#[tracing::instrument(skip_all)]
pub async fn list<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    ApiQuery(params): ApiQuery<PageParams>,
) -> Result<ApiResponse<Value>, ApiError> {
    let page = page_request(&params)?;
    let users = state.accounts.list_users(page).await?;
    Ok(ApiResponse::ok(
        listing("users", users)?,
        "Users retrieved successfully",
    ))
}

/// GET /api/users/{id}
#[tracing::instrument(skip(state, _admin))]
pub async fn get_user<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<UserId>,
) -> Result<ApiResponse<PublicUser>, ApiError> {
    let user = state.accounts.get_user(id).await?;
    Ok(ApiResponse::ok(user, "User retrieved successfully"))
}

/// PATCH /api/users/{id}/role
#[tracing::instrument(skip(state, _admin, req))]
pub async fn update_role<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<UserId>,
    ApiJson(req): ApiJson<UpdateRoleRequest>,
) -> Result<ApiResponse<PublicUser>, ApiError> {
    let role: Role = req.role.trim().parse().map_err(ServiceError::from)?;
    let user = state.accounts.update_user_role(id, role).await?;
    Ok(ApiResponse::ok(user, "User role updated successfully"))
}

/// DELETE /api/users/{id}
#[tracing::instrument(skip(state, _admin))]
pub async fn delete_user<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<UserId>,
) -> Result<ApiResponse<()>, ApiError> {
    state.accounts.delete_user(id).await?;
    Ok(ApiResponse::empty("User deleted successfully"))
}
