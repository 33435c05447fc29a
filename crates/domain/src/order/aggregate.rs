//! Order aggregate implementation.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use super::{
    OrderError, OrderItem, OrderNumber, OrderStatus, PaymentStatus, PriceBreakdown, PricingPolicy,
    ShippingInfo,
};
use crate::Money;
use crate::cart::Cart;
use crate::catalog::Product;

/// Order aggregate root.
///
/// Line items, money lines and shipping details are frozen at checkout.
/// Only the status fields change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    id: OrderId,
    order_number: OrderNumber,
    user_id: UserId,
    items: Vec<OrderItem>,
    subtotal: Money,
    shipping_cost: Money,
    tax: Money,
    total_amount: Money,
    #[serde(flatten)]
    shipping: ShippingInfo,

    status: OrderStatus,
    payment_status: PaymentStatus,
    #[serde(default)]
    payment_transaction_id: Option<String>,
    #[serde(default)]
    tracking_number: Option<String>,
    #[serde(default)]
    cancelled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    cancellation_reason: Option<String>,

    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

// Query methods
impl Order {
    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn order_number(&self) -> &OrderNumber {
        &self.order_number
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    /// Returns the total quantity of all items.
    pub fn total_quantity(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }

    pub fn subtotal(&self) -> Money {
        self.subtotal
    }

    pub fn shipping_cost(&self) -> Money {
        self.shipping_cost
    }

    pub fn tax(&self) -> Money {
        self.tax
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn shipping(&self) -> &ShippingInfo {
        &self.shipping
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn payment_transaction_id(&self) -> Option<&str> {
        self.payment_transaction_id.as_deref()
    }

    pub fn tracking_number(&self) -> Option<&str> {
        self.tracking_number.as_deref()
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    pub fn cancellation_reason(&self) -> Option<&str> {
        self.cancellation_reason.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }
}

// Command methods
impl Order {
    /// Builds an order from a cart.
    ///
    /// Every line is checked against `products` before the order is built:
    /// a product that no longer exists or lacks stock rejects the whole
    /// checkout. Lines keep the cart's price snapshot and take the product's
    /// current name.
    pub fn place(
        user_id: UserId,
        order_number: OrderNumber,
        cart: &Cart,
        products: &HashMap<ProductId, Product>,
        shipping: ShippingInfo,
        pricing: &PricingPolicy,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        if cart.is_empty() {
            return Err(OrderError::EmptyCart);
        }

        let mut items = Vec::with_capacity(cart.items().len());
        for line in cart.items() {
            let product = products
                .get(&line.product_id)
                .ok_or(OrderError::ProductNotFound {
                    product_id: line.product_id,
                })?;

            if !product.has_stock(line.quantity) {
                return Err(OrderError::InsufficientStock {
                    product_id: product.id,
                    product_name: product.name.clone(),
                    available: product.stock,
                    requested: line.quantity,
                });
            }

            items.push(OrderItem::new(
                product.id,
                product.name.clone(),
                line.quantity,
                line.price,
            )?);
        }

        let subtotal = Money::checked_sum(items.iter().map(|item| item.subtotal))
            .ok_or(OrderError::AmountTooLarge)?;
        let PriceBreakdown {
            subtotal,
            shipping_cost,
            tax,
            total_amount,
        } = pricing.price(subtotal)?;

        Ok(Self {
            id: OrderId::new(),
            order_number,
            user_id,
            items,
            subtotal,
            shipping_cost,
            tax,
            total_amount,
            shipping,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_transaction_id: None,
            tracking_number: None,
            cancelled_at: None,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Replaces the order number, used when the generated one collided.
    pub fn renumber(&mut self, order_number: OrderNumber) {
        self.order_number = order_number;
    }

    /// Cancels the order. Stock restoration is the caller's job.
    pub fn cancel(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> Result<(), OrderError> {
        if !self.status.can_cancel() {
            return Err(OrderError::InvalidState {
                status: self.status,
                action: "cancel",
            });
        }

        self.status = OrderStatus::Cancelled;
        self.cancelled_at = Some(now);
        self.cancellation_reason = Some(reason.into());
        self.updated_at = now;
        Ok(())
    }

    /// Sets the fulfilment status. Any target is accepted unless the order
    /// is already cancelled or delivered.
    pub fn update_status(
        &mut self,
        status: OrderStatus,
        tracking_number: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        if !self.status.can_update() {
            return Err(OrderError::InvalidState {
                status: self.status,
                action: "update status",
            });
        }

        self.status = status;
        if let Some(tracking_number) = tracking_number {
            self.tracking_number = Some(tracking_number);
        }
        self.updated_at = now;
        Ok(())
    }

    /// Sets the payment status. A completed payment moves a pending order to
    /// processing.
    pub fn update_payment_status(
        &mut self,
        payment_status: PaymentStatus,
        transaction_id: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.payment_status = payment_status;
        if let Some(transaction_id) = transaction_id {
            self.payment_transaction_id = Some(transaction_id);
        }
        if payment_status == PaymentStatus::Completed && self.status == OrderStatus::Pending {
            self.status = OrderStatus::Processing;
        }
        self.updated_at = now;
    }
}
