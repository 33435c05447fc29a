//! Cart service: one cart per user, validated against live stock.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::{CartId, CartItemId, ProductId, UserId};
use domain::{Cart, Money, Product};
use serde::Serialize;
use store::Store;

use crate::error::{Result, ServiceError};

/// A cart line with its product populated. `product` is `None` if the
/// product has since been deleted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineView {
    pub id: CartItemId,
    pub product_id: ProductId,
    pub product: Option<Product>,
    pub quantity: u32,
    pub price: Money,
    pub subtotal: Money,
}

/// The cart as returned to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub id: CartId,
    pub user_id: UserId,
    pub items: Vec<CartLineView>,
    pub total_amount: Money,
    pub total_quantity: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartView {
    pub fn new(cart: &Cart, mut products: HashMap<ProductId, Product>) -> Self {
        let items = cart
            .items()
            .iter()
            .map(|item| CartLineView {
                id: item.id,
                product_id: item.product_id,
                product: products.remove(&item.product_id),
                quantity: item.quantity,
                price: item.price,
                subtotal: item.subtotal(),
            })
            .collect();

        Self {
            id: cart.id(),
            user_id: cart.user_id(),
            items,
            total_amount: cart.total_amount(),
            total_quantity: cart.total_quantity(),
            created_at: cart.created_at(),
            updated_at: cart.updated_at(),
        }
    }
}

/// Service for managing shopping carts.
pub struct CartService<S: Store> {
    store: S,
}

impl<S: Store> CartService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the user's cart, creating an empty one on first use.
    #[tracing::instrument(skip(self))]
    pub async fn get_or_create(&self, user_id: UserId) -> Result<CartView> {
        let cart = match self.store.get_cart(user_id).await? {
            Some(cart) => cart,
            None => {
                let cart = Cart::new(user_id, Utc::now());
                self.store.save_cart(&cart).await?;
                tracing::debug!(cart_id = %cart.id(), "cart created");
                cart
            }
        };
        self.view(&cart).await
    }

    /// Adds `quantity` units of a product, merging with an existing line.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartView> {
        check_quantity(quantity)?;
        let product = self.product(product_id).await?;

        let now = Utc::now();
        let mut cart = self
            .store
            .get_cart(user_id)
            .await?
            .unwrap_or_else(|| Cart::new(user_id, now));
        cart.add_item(&product, quantity, now)?;
        self.store.save_cart(&cart).await?;

        metrics::counter!("cart_mutations_total", "op" => "add").increment(1);
        self.view(&cart).await
    }

    /// Sets the quantity of an existing line.
    #[tracing::instrument(skip(self))]
    pub async fn update_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartView> {
        check_quantity(quantity)?;
        let mut cart = self.cart(user_id).await?;
        if cart.item(product_id).is_none() {
            return Err(ServiceError::NotFound("Item not found in cart".to_string()));
        }
        let product = self.product(product_id).await?;

        cart.update_item(&product, quantity, Utc::now())?;
        self.store.save_cart(&cart).await?;

        metrics::counter!("cart_mutations_total", "op" => "update").increment(1);
        self.view(&cart).await
    }

    /// Removes a line. Removing a product that is not in the cart is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, user_id: UserId, product_id: ProductId) -> Result<CartView> {
        let mut cart = self.cart(user_id).await?;
        if cart.remove_item(product_id, Utc::now()) {
            self.store.save_cart(&cart).await?;
            metrics::counter!("cart_mutations_total", "op" => "remove").increment(1);
        }
        self.view(&cart).await
    }

    /// Empties the cart.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self, user_id: UserId) -> Result<CartView> {
        let mut cart = self.cart(user_id).await?;
        cart.clear(Utc::now());
        self.store.save_cart(&cart).await?;

        metrics::counter!("cart_mutations_total", "op" => "clear").increment(1);
        self.view(&cart).await
    }

    async fn cart(&self, user_id: UserId) -> Result<Cart> {
        self.store
            .get_cart(user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart not found".to_string()))
    }

    async fn product(&self, product_id: ProductId) -> Result<Product> {
        self.store
            .get_product(product_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))
    }

    async fn view(&self, cart: &Cart) -> Result<CartView> {
        let ids: Vec<ProductId> = cart.items().iter().map(|item| item.product_id).collect();
        let products = if ids.is_empty() {
            HashMap::new()
        } else {
            self.store.get_products(&ids).await?
        };
        Ok(CartView::new(cart, products))
    }
}

fn check_quantity(quantity: u32) -> Result<()> {
    if quantity < 1 {
        return Err(ServiceError::invalid_field(
            "quantity",
            "Quantity must be at least 1",
        ));
    }
    Ok(())
}
