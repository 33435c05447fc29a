//! Shopping cart aggregate.

use chrono::{DateTime, Utc};
use common::{CartId, CartItemId, ProductId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Money;
use crate::catalog::Product;

/// Errors that can occur during cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// Quantity must be at least one.
    #[error("Quantity must be at least 1")]
    InvalidQuantity,

    /// Requested quantity exceeds available stock.
    #[error("Insufficient stock. Available: {available}")]
    InsufficientStock {
        product_id: ProductId,
        available: u32,
        requested: u32,
    },

    /// The product is not in the cart.
    #[error("Item not found in cart")]
    ItemNotFound { product_id: ProductId },

    /// The resulting cart total does not fit in a money amount.
    #[error("Cart total is too large")]
    AmountTooLarge,
}

/// A line in a cart. `price` is the product price when the line was last
/// added or updated, not the live catalog price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub id: CartItemId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Money,
}

impl CartItem {
    /// Price times quantity. Lines built through [`Cart`] always fit; a
    /// corrupt persisted line saturates instead of wrapping.
    pub fn subtotal(&self) -> Money {
        self.price
            .checked_mul(self.quantity)
            .unwrap_or(Money::from_cents(i64::MAX))
    }
}

/// Sums `(price, quantity)` lines, `None` if any step overflows.
fn checked_total(lines: impl IntoIterator<Item = (Money, u32)>) -> Option<Money> {
    lines
        .into_iter()
        .try_fold(Money::zero(), |acc, (price, quantity)| {
            acc.checked_add(price.checked_mul(quantity)?)
        })
}

/// A user's cart.
///
/// `total_amount` is recomputed from the items on every mutation and has no
/// setter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    id: CartId,
    user_id: UserId,
    items: Vec<CartItem>,
    total_amount: Money,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Cart {
    /// Creates an empty cart for a user.
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id: CartId::new(),
            user_id,
            items: Vec::new(),
            total_amount: Money::zero(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuilds a cart from persisted parts. The total is derived, not loaded.
    pub fn restore(
        id: CartId,
        user_id: UserId,
        items: Vec<CartItem>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        let mut cart = Self {
            id,
            user_id,
            items,
            total_amount: Money::zero(),
            created_at,
            updated_at,
        };
        cart.recalculate();
        cart
    }

    pub fn id(&self) -> CartId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn item(&self, product_id: ProductId) -> Option<&CartItem> {
        self.items.iter().find(|i| i.product_id == product_id)
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn total_quantity(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Adds `quantity` units of a product, merging with an existing line.
    ///
    /// The combined quantity must fit in the product's current stock. The
    /// line's price snapshot is refreshed to the current product price.
    pub fn add_item(
        &mut self,
        product: &Product,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<(), CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity);
        }

        let existing = self.items.iter().position(|i| i.product_id == product.id);
        let requested = match existing {
            Some(idx) => self.items[idx].quantity.saturating_add(quantity),
            None => quantity,
        };
        if !product.has_stock(requested) {
            return Err(CartError::InsufficientStock {
                product_id: product.id,
                available: product.stock,
                requested,
            });
        }
        let total = self.total_with(product, requested)?;

        match existing {
            Some(idx) => {
                let line = &mut self.items[idx];
                line.quantity = requested;
                line.price = product.price;
            }
            None => self.items.push(CartItem {
                id: CartItemId::new(),
                product_id: product.id,
                quantity,
                price: product.price,
            }),
        }

        self.total_amount = total;
        self.updated_at = now;
        Ok(())
    }

    /// Replaces the quantity of an existing line and refreshes its price.
    pub fn update_item(
        &mut self,
        product: &Product,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<(), CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity);
        }

        let idx = self
            .items
            .iter()
            .position(|i| i.product_id == product.id)
            .ok_or(CartError::ItemNotFound {
                product_id: product.id,
            })?;

        if !product.has_stock(quantity) {
            return Err(CartError::InsufficientStock {
                product_id: product.id,
                available: product.stock,
                requested: quantity,
            });
        }
        let total = self.total_with(product, quantity)?;

        let line = &mut self.items[idx];
        line.quantity = quantity;
        line.price = product.price;
        self.total_amount = total;
        self.updated_at = now;
        Ok(())
    }

    /// Total the cart would have with the product's line at `quantity` and
    /// its current price.
    fn total_with(&self, product: &Product, quantity: u32) -> Result<Money, CartError> {
        let others = self
            .items
            .iter()
            .filter(|i| i.product_id != product.id)
            .map(|i| (i.price, i.quantity));
        checked_total(others.chain(std::iter::once((product.price, quantity))))
            .ok_or(CartError::AmountTooLarge)
    }

    /// Removes the line for a product. Returns false if there was none.
    pub fn remove_item(&mut self, product_id: ProductId, now: DateTime<Utc>) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.product_id != product_id);
        let removed = self.items.len() != before;
        if removed {
            self.touch(now);
        }
        removed
    }

    pub fn clear(&mut self, now: DateTime<Utc>) {
        self.items.clear();
        self.touch(now);
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.recalculate();
        self.updated_at = now;
    }

    fn recalculate(&mut self) {
        self.total_amount = checked_total(self.items.iter().map(|i| (i.price, i.quantity)))
            .unwrap_or(Money::from_cents(i64::MAX));
    }
}

impl<'de> Deserialize<'de> for Cart {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Stored {
            id: CartId,
            user_id: UserId,
            items: Vec<CartItem>,
            created_at: DateTime<Utc>,
            updated_at: DateTime<Utc>,
        }

        let stored = Stored::deserialize(deserializer)?;
        Ok(Cart::restore(
            stored.id,
            stored.user_id,
            stored.items,
            stored.created_at,
            stored.updated_at,
        ))
    }
}
