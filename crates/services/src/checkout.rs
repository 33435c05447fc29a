//! Checkout and order management.
//!
//! Checkout validates every cart line against current stock before anything
//! is written, then hands the order, the stock decrements and the emptied
//! cart to the store as one transaction. Cancellation restores stock in the
//! same transaction that flips the status, guarded by the status the order
//! was read with.

use std::time::Instant;

use chrono::Utc;
use common::{OrderId, Page, PageRequest, ProductId, UserId};
use domain::{
    Order, OrderNumber, OrderStatus, PaymentStatus, PricingPolicy, ShippingInfo,
};
use store::{OrderQuery, OrderStats, OrderStoreExt, Store, StoreError};

use crate::error::{FieldError, Result, ServiceError};

/// How many order numbers are tried before checkout gives up.
pub const MAX_ORDER_NUMBER_ATTEMPTS: u32 = 5;

const MAX_CANCELLATION_REASON_LEN: usize = 500;
const MAX_TRACKING_NUMBER_LEN: usize = 50;
const MAX_TRANSACTION_ID_LEN: usize = 255;

/// Service for checkout and the order lifecycle.
pub struct CheckoutService<S: Store> {
    store: S,
    pricing: PricingPolicy,
}

impl<S: Store> CheckoutService<S> {
    pub fn new(store: S, pricing: PricingPolicy) -> Self {
        Self { store, pricing }
    }

    pub fn pricing(&self) -> &PricingPolicy {
        &self.pricing
    }

    /// Turns the user's cart into a pending order.
    #[tracing::instrument(skip(self, shipping))]
    pub async fn create_order(&self, user_id: UserId, shipping: ShippingInfo) -> Result<Order> {
        let started = Instant::now();
        let result = self.place(user_id, shipping).await;

        match &result {
            Ok(order) => {
                metrics::counter!("orders_placed_total").increment(1);
                metrics::histogram!("checkout_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                tracing::info!(
                    order_id = %order.id(),
                    order_number = %order.order_number(),
                    total = %order.total_amount(),
                    "order placed"
                );
            }
            Err(e) => {
                let reason = rejection_reason(e);
                metrics::counter!("checkout_rejected_total", "reason" => reason).increment(1);
                tracing::warn!(reason, error = %e, "checkout rejected");
            }
        }
        result
    }

    async fn place(&self, user_id: UserId, shipping: ShippingInfo) -> Result<Order> {
        let shipping = validate_shipping(shipping)?;

        let cart = self
            .store
            .get_cart(user_id)
            .await?
            .filter(|cart| !cart.is_empty())
            .ok_or_else(|| ServiceError::InvalidState("Cart is empty".to_string()))?;

        let ids: Vec<ProductId> = cart.items().iter().map(|item| item.product_id).collect();
        let products = self.store.get_products(&ids).await?;

        let now = Utc::now();
        let mut order = Order::place(
            user_id,
            OrderNumber::generate(now),
            &cart,
            &products,
            shipping,
            &self.pricing,
            now,
        )?;

        let mut emptied = cart;
        emptied.clear(now);

        let mut attempt = 1;
        loop {
            match self.store.place_order(&order, &emptied).await {
                Ok(()) => return Ok(order),
                Err(StoreError::Conflict(_)) if attempt < MAX_ORDER_NUMBER_ATTEMPTS => {
                    tracing::debug!(
                        order_number = %order.order_number(),
                        attempt,
                        "order number taken, regenerating"
                    );
                    order.renumber(OrderNumber::generate(Utc::now()));
                    attempt += 1;
                }
                Err(StoreError::Conflict(_)) => {
                    return Err(ServiceError::Internal(
                        "Could not allocate a unique order number".to_string(),
                    ));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Fetches an order. With `owner` set, orders of other users are
    /// reported as missing.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId, owner: Option<UserId>) -> Result<Order> {
        let order = match owner {
            Some(user_id) => self.store.get_user_order(order_id, user_id).await?,
            None => self.store.get_order(order_id).await?,
        };
        order.ok_or_else(order_not_found)
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_user_orders(&self, user_id: UserId, page: PageRequest) -> Result<Page<Order>> {
        Ok(self.store.list_user_orders(user_id, page).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_orders(&self, query: OrderQuery) -> Result<Page<Order>> {
        Ok(self.store.query_orders(query).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn order_stats(&self, user_id: Option<UserId>) -> Result<OrderStats> {
        Ok(self.store.order_stats(user_id).await?)
    }

    /// Cancels a pending or processing order owned by `user_id` and puts its
    /// stock back.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        order_id: OrderId,
        user_id: UserId,
        reason: &str,
    ) -> Result<Order> {
        let reason = required_text("reason", reason, MAX_CANCELLATION_REASON_LEN)?;

        let mut order = self
            .store
            .get_user_order(order_id, user_id)
            .await?
            .ok_or_else(order_not_found)?;
        let expected = order.status();
        order.cancel(reason, Utc::now())?;

        self.store
            .cancel_order(&order, expected)
            .await
            .map_err(|e| match e {
                StoreError::ConcurrencyConflict { .. } => ServiceError::InvalidState(
                    "Order status changed, it can no longer be cancelled".to_string(),
                ),
                other => other.into(),
            })?;

        metrics::counter!("orders_cancelled_total").increment(1);
        tracing::info!(order_id = %order.id(), from = %expected, "order cancelled");
        Ok(order)
    }

    /// Sets the fulfilment status of an order that is not yet terminal.
    #[tracing::instrument(skip(self))]
    pub async fn update_order_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
        tracking_number: Option<String>,
    ) -> Result<Order> {
        let tracking_number =
            optional_text("trackingNumber", tracking_number, MAX_TRACKING_NUMBER_LEN)?;

        let mut order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or_else(order_not_found)?;
        let expected = order.status();
        order.update_status(status, tracking_number, Utc::now())?;
        self.store.update_order(&order, expected).await?;

        tracing::info!(order_id = %order.id(), from = %expected, to = %status, "order status changed");
        Ok(order)
    }

    /// Records a payment outcome. A completed payment moves a pending order
    /// to processing.
    #[tracing::instrument(skip(self))]
    pub async fn update_payment_status(
        &self,
        order_id: OrderId,
        payment_status: PaymentStatus,
        transaction_id: Option<String>,
    ) -> Result<Order> {
        let transaction_id =
            optional_text("paymentTransactionId", transaction_id, MAX_TRANSACTION_ID_LEN)?;

        let mut order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or_else(order_not_found)?;
        let expected = order.status();
        order.update_payment_status(payment_status, transaction_id, Utc::now());
        self.store.update_order(&order, expected).await?;

        tracing::info!(
            order_id = %order.id(),
            payment_status = %payment_status,
            status = %order.status(),
            "payment status changed"
        );
        Ok(order)
    }
}

fn order_not_found() -> ServiceError {
    ServiceError::NotFound("Order not found".to_string())
}

fn rejection_reason(e: &ServiceError) -> &'static str {
    match e {
        ServiceError::InvalidState(_) => "empty_cart",
        ServiceError::NotFound(_) => "product_not_found",
        ServiceError::InsufficientStock(_) => "insufficient_stock",
        ServiceError::Validation(_) => "invalid_shipping",
        _ => "error",
    }
}

/// Trims and bounds every shipping field, collecting all failures.
pub fn validate_shipping(shipping: ShippingInfo) -> Result<ShippingInfo> {
    let mut errors = Vec::new();
    let mut field = |name: &str, value: String, max: usize| -> String {
        let value = value.trim().to_string();
        if value.is_empty() {
            errors.push(FieldError::new(name, format!("{name} is required")));
        } else if value.chars().count() > max {
            errors.push(FieldError::new(
                name,
                format!("{name} must be at most {max} characters"),
            ));
        }
        value
    };

    let validated = ShippingInfo {
        shipping_address: field("shippingAddress", shipping.shipping_address, 500),
        shipping_city: field("shippingCity", shipping.shipping_city, 100),
        shipping_state: field("shippingState", shipping.shipping_state, 50),
        shipping_zip_code: field("shippingZipCode", shipping.shipping_zip_code, 20),
        shipping_country: field("shippingCountry", shipping.shipping_country, 100),
        contact_phone: field("contactPhone", shipping.contact_phone, 20),
        notes: None,
    };

    let notes = shipping
        .notes
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    if let Some(ref notes) = notes {
        if notes.chars().count() > 1000 {
            errors.push(FieldError::new("notes", "notes must be at most 1000 characters"));
        }
    }

    if !errors.is_empty() {
        return Err(ServiceError::Validation(errors));
    }
    Ok(ShippingInfo { notes, ..validated })
}

fn required_text(field: &str, value: &str, max: usize) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ServiceError::invalid_field(field, format!("{field} is required")));
    }
    if value.chars().count() > max {
        return Err(ServiceError::invalid_field(
            field,
            format!("{field} must be at most {max} characters"),
        ));
    }
    Ok(value.to_string())
}

fn optional_text(field: &str, value: Option<String>, max: usize) -> Result<Option<String>> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => required_text(field, value, max).map(Some),
    }
}
