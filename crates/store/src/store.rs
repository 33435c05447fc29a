use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, Page, PageRequest, ProductId, ReviewId, UserId};
use domain::{Cart, Order, OrderStatus, Product, RatingSummary, Review, User};

use crate::{OrderQuery, OrderStats, ProductQuery, Result};

/// Persistence of user accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Inserts a new user. Fails with `Conflict` if the e-mail is taken.
    async fn insert_user(&self, user: &User) -> Result<()>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>>;

    /// Looks a user up by lower-cased e-mail.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Looks a user up by the hash of an outstanding password-reset token.
    async fn find_user_by_reset_token(&self, token_hash: &str) -> Result<Option<User>>;

    /// Overwrites a user. Fails with `NotFound` if it does not exist.
    async fn update_user(&self, user: &User) -> Result<()>;

    /// Deletes a user together with their cart, orders and reviews.
    /// Returns false if there was no such user.
    async fn delete_user(&self, id: UserId) -> Result<bool>;

    /// Lists users, newest first.
    async fn list_users(&self, page: PageRequest) -> Result<Page<User>>;
}

/// Persistence of products and their reviews.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn insert_product(&self, product: &Product) -> Result<()>;

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;

    /// Fetches several products at once. Missing ids are absent from the map.
    async fn get_products(&self, ids: &[ProductId]) -> Result<HashMap<ProductId, Product>>;

    async fn query_products(&self, query: ProductQuery) -> Result<Page<Product>>;

    /// Writes a product's catalog fields and returns the stored product.
    ///
    /// Stock and rating are left as stored unless `stock_read_at` is given.
    /// Then stock is written too, but only while the row's `updated_at` still
    /// equals `stock_read_at`; a row changed in between fails with `Conflict`
    /// and nothing is written. Fails with `NotFound` if the product does not
    /// exist.
    async fn update_product(
        &self,
        product: &Product,
        stock_read_at: Option<DateTime<Utc>>,
    ) -> Result<Product>;

    /// Deletes a product, its reviews and any cart lines that reference it.
    async fn delete_product(&self, id: ProductId) -> Result<bool>;

    /// Inserts a review. Fails with `Conflict` if the user already reviewed
    /// the product.
    async fn insert_review(&self, review: &Review) -> Result<()>;

    async fn get_review(&self, id: ReviewId) -> Result<Option<Review>>;

    async fn update_review(&self, review: &Review) -> Result<()>;

    async fn delete_review(&self, id: ReviewId) -> Result<bool>;

    /// Lists a product's reviews, newest first.
    async fn list_reviews(&self, product_id: ProductId) -> Result<Vec<Review>>;

    /// Recomputes a product's rating and review count from its reviews.
    async fn refresh_product_rating(&self, product_id: ProductId) -> Result<RatingSummary>;
}

/// Persistence of carts. One cart per user.
#[async_trait]
pub trait CartStore: Send + Sync {
    async fn get_cart(&self, user_id: UserId) -> Result<Option<Cart>>;

    /// Upserts a cart by user and replaces its lines.
    async fn save_cart(&self, cart: &Cart) -> Result<()>;
}

/// Persistence of orders, including the transactional checkout and
/// cancellation steps that touch product stock.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Places an order in one transaction.
    ///
    /// For every line, stock is decremented only if enough units remain; if
    /// any line comes up short the transaction rolls back and
    /// `InsufficientStock` is returned. The order is then inserted (a
    /// duplicate order number is a `Conflict`) and `cart` is saved.
    async fn place_order(&self, order: &Order, cart: &Cart) -> Result<()>;

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    async fn query_orders(&self, query: OrderQuery) -> Result<Page<Order>>;

    /// Saves a cancelled order and restores the stock of each line whose
    /// product still exists, in one transaction. The write only applies if
    /// the stored status still equals `expected`.
    async fn cancel_order(&self, order: &Order, expected: OrderStatus) -> Result<()>;

    /// Saves an order's status fields if the stored status still equals
    /// `expected`.
    async fn update_order(&self, order: &Order, expected: OrderStatus) -> Result<()>;

    /// Counts per status and revenue, over all orders or one user's.
    async fn order_stats(&self, user_id: Option<UserId>) -> Result<OrderStats>;
}

/// Everything the services need from persistence.
pub trait Store: UserStore + CatalogStore + CartStore + OrderStore {}

impl<T: UserStore + CatalogStore + CartStore + OrderStore + ?Sized> Store for T {}

/// Extension trait providing convenience methods for stores.
#[async_trait]
pub trait OrderStoreExt: OrderStore {
    /// Fetches an order only if it belongs to `user_id`.
    async fn get_user_order(&self, id: OrderId, user_id: UserId) -> Result<Option<Order>> {
        Ok(self
            .get_order(id)
            .await?
            .filter(|order| order.is_owned_by(user_id)))
    }

    /// Lists one user's orders, newest first.
    async fn list_user_orders(&self, user_id: UserId, page: PageRequest) -> Result<Page<Order>> {
        self.query_orders(OrderQuery::for_user(user_id).page(page))
            .await
    }
}

// Blanket implementation for all OrderStore implementations
impl<T: OrderStore + ?Sized> OrderStoreExt for T {}
