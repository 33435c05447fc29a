//! Shopping cart endpoints. Every route acts on the caller's own cart.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::routing::{get, post, put};
use common::ProductId;
use serde::Deserialize;
use services::CartView;
use store::Store;

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, AuthUser};
use crate::response::ApiResponse;
use crate::state::AppState;

pub fn router<S: Store + Clone + 'static>() -> Router<Arc<AppState<S>>> {
    Router::new()
        .route("/", get(get_cart::<S>).delete(clear::<S>))
        .route("/items", post(add_item::<S>))
        .route(
            "/items/{product_id}",
            put(update_item::<S>).delete(remove_item::<S>),
        )
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AddItemRequest {
    pub product_id: Option<ProductId>,
    pub quantity: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateItemRequest {
    pub quantity: Option<i64>,
}

/// Quantities arrive as JSON integers; anything below one or beyond `u32`
/// is rejected before reaching the cart.
fn quantity(value: Option<i64>) -> Result<u32, ApiError> {
    let value = value.ok_or_else(|| ApiError::bad_request("quantity", "Quantity is required"))?;
    u32::try_from(value)
        .ok()
        .filter(|q| *q >= 1)
        .ok_or_else(|| ApiError::bad_request("quantity", "Quantity must be at least 1"))
}

/// GET /api/cart: creates an empty cart on first access.
#[tracing::instrument(skip_all)]
pub async fn get_cart<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(identity): AuthUser,
) -> Result<ApiResponse<CartView>, ApiError> {
    let cart = state.cart.get_or_create(identity.user_id).await?;
    Ok(ApiResponse::ok(cart, "Cart retrieved successfully"))
}

/// POST /api/cart/items: a missing quantity adds one unit.
#[tracing::instrument(skip_all)]
pub async fn add_item<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(identity): AuthUser,
    ApiJson(req): ApiJson<AddItemRequest>,
) -> Result<ApiResponse<CartView>, ApiError> {
    let product_id = req
        .product_id
        .ok_or_else(|| ApiError::bad_request("productId", "Product ID is required"))?;
    let quantity = quantity(req.quantity.or(Some(1)))?;

    let cart = state
        .cart
        .add_item(identity.user_id, product_id, quantity)
        .await?;
    Ok(ApiResponse::ok(cart, "Item added to cart successfully"))
}

/// PUT /api/cart/items/{product_id}
#[tracing::instrument(skip(state, identity, req))]
pub async fn update_item<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(identity): AuthUser,
    ApiPath(product_id): ApiPath<ProductId>,
    ApiJson(req): ApiJson<UpdateItemRequest>,
) -> Result<ApiResponse<CartView>, ApiError> {
    let quantity = quantity(req.quantity)?;
    let cart = state
        .cart
        .update_item(identity.user_id, product_id, quantity)
        .await?;
    Ok(ApiResponse::ok(cart, "Cart item updated successfully"))
}

/// DELETE /api/cart/items/{product_id}
#[tracing::instrument(skip(state, identity))]
pub async fn remove_item<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(identity): AuthUser,
    ApiPath(product_id): ApiPath<ProductId>,
) -> Result<ApiResponse<CartView>, ApiError> {
    let cart = state.cart.remove_item(identity.user_id, product_id).await?;
    Ok(ApiResponse::ok(cart, "Item removed from cart successfully"))
}

/// DELETE /api/cart
#[tracing::instrument(skip_all)]
pub async fn clear<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(identity): AuthUser,
) -> Result<ApiResponse<CartView>, ApiError> {
    let cart = state.cart.clear(identity.user_id).await?;
    Ok(ApiResponse::ok(cart, "Cart cleared successfully"))
}
