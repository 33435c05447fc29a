//! Value objects for the order domain.

use chrono::{DateTime, Utc};
use common::ProductId;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::OrderError;
use crate::Money;

/// Human-facing order reference, `ORD-<unix millis>-<0..9999>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Generates a new order number. Collisions are possible and must be
    /// caught by the store's unique key.
    pub fn generate(now: DateTime<Utc>) -> Self {
        let suffix: u32 = rand::rng().random_range(0..10_000);
        Self(format!("ORD-{}-{}", now.timestamp_millis(), suffix))
    }

    pub fn new(number: impl Into<String>) -> Self {
        Self(number.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A frozen order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: ProductId,

    /// Product name at checkout time.
    pub product_name: String,

    pub quantity: u32,

    /// Price per unit, taken from the cart snapshot.
    #[serde(rename = "price")]
    pub unit_price: Money,

    pub subtotal: Money,
}

impl OrderItem {
    pub fn new(
        product_id: ProductId,
        product_name: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Result<Self, OrderError> {
        let subtotal = unit_price
            .checked_mul(quantity)
            .ok_or(OrderError::AmountTooLarge)?;
        Ok(Self {
            product_id,
            product_name: product_name.into(),
            quantity,
            unit_price,
            subtotal,
        })
    }
}

/// Where and to whom an order ships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingInfo {
    pub shipping_address: String,
    pub shipping_city: String,
    pub shipping_state: String,
    pub shipping_zip_code: String,
    pub shipping_country: String,
    pub contact_phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}
