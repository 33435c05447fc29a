//! Checkout and order lifecycle endpoints.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::routing::{get, post, put};
use common::OrderId;
use domain::{Order, OrderStatus, PaymentStatus, ShippingInfo};
use serde::Deserialize;
use serde_json::Value;
use store::{OrderQuery, OrderStats, Store};

use crate::error::ApiError;
use crate::extract::{AdminUser, ApiJson, ApiPath, ApiQuery, AuthUser};
use crate::response::{ApiResponse, listing};
use crate::routes::{PageParams, QueryFields, page_request};
use crate::state::AppState;

pub fn router<S: Store + Clone + 'static>() -> Router<Arc<AppState<S>>> {
    Router::new()
        .route("/", post(create::<S>).get(list::<S>))
        .route("/my-orders", get(my_orders::<S>))
        .route("/my-stats", get(my_stats::<S>))
        .route("/stats", get(stats::<S>))
        .route("/{id}", get(get_order::<S>))
        .route("/{id}/cancel", post(cancel::<S>))
        .route("/{id}/status", put(update_status::<S>))
        .route("/{id}/payment-status", put(update_payment_status::<S>))
}

// -- Request types --

/// Shipping details for checkout. Missing fields arrive empty and are
/// reported by field.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub shipping_address: String,
    pub shipping_city: String,
    pub shipping_state: String,
    pub shipping_zip_code: String,
    pub shipping_country: String,
    pub contact_phone: String,
    pub notes: Option<String>,
}

impl From<CreateOrderRequest> for ShippingInfo {
    fn from(req: CreateOrderRequest) -> Self {
        ShippingInfo {
            shipping_address: req.shipping_address,
            shipping_city: req.shipping_city,
            shipping_state: req.shipping_state,
            shipping_zip_code: req.shipping_zip_code,
            shipping_country: req.shipping_country,
            contact_phone: req.contact_phone,
            notes: req.notes,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CancelOrderRequest {
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub status: String,
    pub tracking_number: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdatePaymentStatusRequest {
    pub payment_status: String,
    pub payment_transaction_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOrdersParams {
    pub status: Option<String>,
    pub payment_status: Option<String>,
    pub search: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl ListOrdersParams {
    fn into_query(self) -> Result<OrderQuery, ApiError> {
        let mut fields = QueryFields::default();
        let mut query = OrderQuery::new().page(fields.page(&PageParams {
            page: self.page,
            limit: self.limit,
        }));

        query.status =
            fields.parse::<OrderStatus>("status", self.status.as_deref(), "Invalid order status");
        query.payment_status = fields.parse::<PaymentStatus>(
            "paymentStatus",
            self.payment_status.as_deref(),
            "Invalid payment status",
        );
        query.search = self
            .search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        fields.finish()?;
        Ok(query)
    }
}

fn required<T: std::str::FromStr>(field: &str, value: &str, message: &str) -> Result<T, ApiError> {
    value
        .trim()
        .parse()
        .map_err(|_| ApiError::bad_request(field, message))
}

// -- Handlers --

/// POST /api/orders: checks out the caller's cart.
#[tracing::instrument(skip_all)]
pub async fn create<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(identity): AuthUser,
    ApiJson(req): ApiJson<CreateOrderRequest>,
) -> Result<ApiResponse<Order>, ApiError> {
    let order = state
        .checkout
        .create_order(identity.user_id, req.into())
        .await?;
    Ok(ApiResponse::created(order, "Order created successfully"))
}

/// GET /api/orders/my-orders
#[tracing::instrument(skip_all)]
pub async fn my_orders<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(identity): AuthUser,
    ApiQuery(params): ApiQuery<PageParams>,
) -> Result<ApiResponse<Value>, ApiError> {
    let page = page_request(&params)?;
    let orders = state
        .checkout
        .list_user_orders(identity.user_id, page)
        .await?;
    Ok(ApiResponse::ok(
        listing("orders", orders)?,
        "Orders retrieved successfully",
    ))
}

/// GET /api/orders/my-stats
#[tracing::instrument(skip_all)]
pub async fn my_stats<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(identity): AuthUser,
) -> Result<ApiResponse<OrderStats>, ApiError> {
    let stats = state.checkout.order_stats(Some(identity.user_id)).await?;
    Ok(ApiResponse::ok(stats, "Order statistics retrieved successfully"))
}

/// GET /api/orders: every order, filtered.
#[tracing::instrument(skip_all)]
pub async fn list<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    ApiQuery(params): ApiQuery<ListOrdersParams>,
) -> Result<ApiResponse<Value>, ApiError> {
    let query = params.into_query()?;
    let orders = state.checkout.list_orders(query).await?;
    Ok(ApiResponse::ok(
        listing("orders", orders)?,
        "Orders retrieved successfully",
    ))
}

/// GET /api/orders/stats
#[tracing::instrument(skip_all)]
pub async fn stats<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
) -> Result<ApiResponse<OrderStats>, ApiError> {
    let stats = state.checkout.order_stats(None).await?;
    Ok(ApiResponse::ok(stats, "Order statistics retrieved successfully"))
}

/// GET /api/orders/{id}: owners see their own orders, admins see any.
#[tracing::instrument(skip(state, identity))]
pub async fn get_order<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(identity): AuthUser,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<ApiResponse<Order>, ApiError> {
    let owner = (!identity.is_admin()).then_some(identity.user_id);
    let order = state.checkout.get_order(id, owner).await?;
    Ok(ApiResponse::ok(order, "Order retrieved successfully"))
}

/// POST /api/orders/{id}/cancel
#[tracing::instrument(skip(state, identity, req))]
pub async fn cancel<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(identity): AuthUser,
    ApiPath(id): ApiPath<OrderId>,
    ApiJson(req): ApiJson<CancelOrderRequest>,
) -> Result<ApiResponse<Order>, ApiError> {
    let order = state
        .checkout
        .cancel_order(id, identity.user_id, &req.reason)
        .await?;
    Ok(ApiResponse::ok(order, "Order cancelled successfully"))
}

/// PUT /api/orders/{id}/status
#[tracing::instrument(skip(state, _admin, req))]
pub async fn update_status<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<OrderId>,
    ApiJson(req): ApiJson<UpdateStatusRequest>,
) -> Result<ApiResponse<Order>, ApiError> {
    let status: OrderStatus = required("status", &req.status, "Invalid order status")?;
    let order = state
        .checkout
        .update_order_status(id, status, req.tracking_number)
        .await?;
    Ok(ApiResponse::ok(order, "Order status updated successfully"))
}

/// PUT /api/orders/{id}/payment-status
#[tracing::instrument(skip(state, _admin, req))]
pub async fn update_payment_status<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<OrderId>,
    ApiJson(req): ApiJson<UpdatePaymentStatusRequest>,
) -> Result<ApiResponse<Order>, ApiError> {
    let payment_status: PaymentStatus =
        required("paymentStatus", &req.payment_status, "Invalid payment status")?;
    let order = state
        .checkout
        .update_payment_status(id, payment_status, req.payment_transaction_id)
        .await?;
    Ok(ApiResponse::ok(order, "Payment status updated successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_filters_are_parsed() {
        let params = ListOrdersParams {
            status: Some("shipped".to_string()),
            payment_status: Some("completed".to_string()),
            search: Some(" ORD- ".to_string()),
            page: Some("2".to_string()),
            ..Default::default()
        };
        let query = params.into_query().unwrap();

        assert_eq!(query.status, Some(OrderStatus::Shipped));
        assert_eq!(query.payment_status, Some(PaymentStatus::Completed));
        assert_eq!(query.search.as_deref(), Some("ORD-"));
        assert_eq!(query.page.page, 2);
        assert!(query.user_id.is_none());
    }

    #[test]
    fn unknown_status_is_a_field_error() {
        let params = ListOrdersParams {
            status: Some("lost".to_string()),
            ..Default::default()
        };
        match params.into_query().unwrap_err() {
            ApiError::BadRequest { errors, .. } => assert_eq!(errors[0].field, "status"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(required::<PaymentStatus>("paymentStatus", "", "Invalid payment status").is_err());
    }
}
