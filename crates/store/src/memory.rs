use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, Page, PageRequest, ProductId, ReviewId, UserId};
use domain::{Cart, Order, OrderStatus, Product, Rating, RatingSummary, Review, User};
use tokio::sync::RwLock;

use crate::query::contains_ignore_case;
use crate::{
    CartStore, CatalogStore, OrderQuery, OrderStats, OrderStore, ProductQuery, ProductSort,
    Result, SortOrder, StoreError, UserStore,
};

#[derive(Debug, Default)]
struct State {
    users: Vec<User>,
    products: Vec<Product>,
    reviews: Vec<Review>,
    carts: HashMap<UserId, Cart>,
    orders: Vec<Order>,
}

impl State {
    fn product_mut(&mut self, id: ProductId) -> Option<&mut Product> {
        self.products.iter_mut().find(|p| p.id == id)
    }

    fn refresh_rating(&mut self, product_id: ProductId) -> RatingSummary {
        let summary = Rating::average(
            self.reviews
                .iter()
                .filter(|r| r.product_id == product_id)
                .map(|r| r.rating),
        );
        if let Some(product) = self.product_mut(product_id) {
            product.set_rating(summary);
        }
        summary
    }
}

/// In-memory store implementation for testing and local runs.
///
/// All collections sit behind a single lock, so every operation is atomic
/// the same way a database transaction is.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Clears all data.
    pub async fn clear(&self) {
        *self.state.write().await = State::default();
    }
}

fn newest_first<T: Clone>(items: &[T], created_at: impl Fn(&T) -> chrono::DateTime<Utc>) -> Vec<T> {
    let mut items: Vec<T> = items.iter().rev().cloned().collect();
    items.sort_by_key(|item| std::cmp::Reverse(created_at(item)));
    items
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn insert_user(&self, user: &User) -> Result<()> {
        let mut state = self.state.write().await;
        if state.users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict("Email already registered".to_string()));
        }
        state.users.push(user.clone());
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_reset_token(&self, token_hash: &str) -> Result<Option<User>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .iter()
            .find(|u| u.reset_password_token_hash.as_deref() == Some(token_hash))
            .cloned())
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        let mut state = self.state.write().await;
        if state
            .users
            .iter()
            .any(|u| u.id != user.id && u.email == user.email)
        {
            return Err(StoreError::Conflict("Email already registered".to_string()));
        }
        let slot = state
            .users
            .iter_mut()
            .find(|u| u.id == user.id)
            .ok_or_else(|| StoreError::not_found("user", user.id))?;
        *slot = user.clone();
        Ok(())
    }

    async fn delete_user(&self, id: UserId) -> Result<bool> {
        let mut state = self.state.write().await;
        let before = state.users.len();
        state.users.retain(|u| u.id != id);
        if state.users.len() == before {
            return Ok(false);
        }

        state.carts.remove(&id);
        state.orders.retain(|o| o.user_id() != id);

        let reviewed: Vec<ProductId> = state
            .reviews
            .iter()
            .filter(|r| r.user_id == id)
            .map(|r| r.product_id)
            .collect();
        state.reviews.retain(|r| r.user_id != id);
        for product_id in reviewed {
            state.refresh_rating(product_id);
        }
        Ok(true)
    }

    async fn list_users(&self, page: PageRequest) -> Result<Page<User>> {
        let state = self.state.read().await;
        let users = newest_first(&state.users, |u| u.created_at);
        Ok(Page::from_slice(users, page))
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn insert_product(&self, product: &Product) -> Result<()> {
        let mut state = self.state.write().await;
        if state.products.iter().any(|p| p.id == product.id) {
            return Err(StoreError::Conflict(format!(
                "Product {} already exists",
                product.id
            )));
        }
        state.products.push(product.clone());
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let state = self.state.read().await;
        Ok(state.products.iter().find(|p| p.id == id).cloned())
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<HashMap<ProductId, Product>> {
        let state = self.state.read().await;
        Ok(state
            .products
            .iter()
            .filter(|p| ids.contains(&p.id))
            .map(|p| (p.id, p.clone()))
            .collect())
    }

    async fn query_products(&self, query: ProductQuery) -> Result<Page<Product>> {
        let state = self.state.read().await;
        let mut products: Vec<Product> = state
            .products
            .iter()
            .filter(|p| {
                if let Some(category) = query.category
                    && p.category != category
                {
                    return false;
                }
                if let Some(min) = query.min_price
                    && p.price < min
                {
                    return false;
                }
                if let Some(max) = query.max_price
                    && p.price > max
                {
                    return false;
                }
                if let Some(featured) = query.featured
                    && p.featured != featured
                {
                    return false;
                }
                if let Some(ref term) = query.search
                    && !contains_ignore_case(&p.name, term)
                {
                    return false;
                }
                true
            })
            .cloned()
            .collect();

        if query.sort_order == SortOrder::Desc {
            products.reverse();
        }
        products.sort_by(|a, b| {
            let ordering = match query.sort_by {
                ProductSort::CreatedAt => a.created_at.cmp(&b.created_at),
                ProductSort::Price => a.price.cmp(&b.price),
                ProductSort::Rating => a.rating.cmp(&b.rating),
                ProductSort::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            };
            match query.sort_order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        Ok(Page::from_slice(products, query.page))
    }

    async fn update_product(
        &self,
        product: &Product,
        stock_read_at: Option<DateTime<Utc>>,
    ) -> Result<Product> {
        let mut state = self.state.write().await;
        let slot = state
            .product_mut(product.id)
            .ok_or_else(|| StoreError::not_found("product", product.id))?;

        let stock = match stock_read_at {
            Some(read_at) if slot.updated_at != read_at => {
                return Err(StoreError::product_changed());
            }
            Some(_) => product.stock,
            None => slot.stock,
        };
        let (rating, num_reviews) = (slot.rating, slot.num_reviews);
        *slot = Product {
            stock,
            rating,
            num_reviews,
            ..product.clone()
        };
        Ok(slot.clone())
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool> {
        let mut state = self.state.write().await;
        let before = state.products.len();
        state.products.retain(|p| p.id != id);
        if state.products.len() == before {
            return Ok(false);
        }
        state.reviews.retain(|r| r.product_id != id);
        let now = Utc::now();
        for cart in state.carts.values_mut() {
            cart.remove_item(id, now);
        }
        Ok(true)
    }

    async fn insert_review(&self, review: &Review) -> Result<()> {
        let mut state = self.state.write().await;
        if state
            .reviews
            .iter()
            .any(|r| r.product_id == review.product_id && r.user_id == review.user_id)
        {
            return Err(StoreError::Conflict(
                "You have already reviewed this product".to_string(),
            ));
        }
        state.reviews.push(review.clone());
        Ok(())
    }

    async fn get_review(&self, id: ReviewId) -> Result<Option<Review>> {
        let state = self.state.read().await;
        Ok(state.reviews.iter().find(|r| r.id == id).cloned())
    }

    async fn update_review(&self, review: &Review) -> Result<()> {
        let mut state = self.state.write().await;
        let slot = state
            .reviews
            .iter_mut()
            .find(|r| r.id == review.id)
            .ok_or_else(|| StoreError::not_found("review", review.id))?;
        *slot = review.clone();
        Ok(())
    }

    async fn delete_review(&self, id: ReviewId) -> Result<bool> {
        let mut state = self.state.write().await;
        let before = state.reviews.len();
        state.reviews.retain(|r| r.id != id);
        Ok(state.reviews.len() != before)
    }

    async fn list_reviews(&self, product_id: ProductId) -> Result<Vec<Review>> {
        let state = self.state.read().await;
        let reviews: Vec<Review> = state
            .reviews
            .iter()
            .filter(|r| r.product_id == product_id)
            .cloned()
            .collect();
        Ok(newest_first(&reviews, |r| r.created_at))
    }

    async fn refresh_product_rating(&self, product_id: ProductId) -> Result<RatingSummary> {
        let mut state = self.state.write().await;
        if state.product_mut(product_id).is_none() {
            return Err(StoreError::not_found("product", product_id));
        }
        Ok(state.refresh_rating(product_id))
    }
}

#[async_trait]
impl CartStore for InMemoryStore {
    async fn get_cart(&self, user_id: UserId) -> Result<Option<Cart>> {
        let state = self.state.read().await;
        Ok(state.carts.get(&user_id).cloned())
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        let mut state = self.state.write().await;
        state.carts.insert(cart.user_id(), cart.clone());
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn place_order(&self, order: &Order, cart: &Cart) -> Result<()> {
        let mut state = self.state.write().await;

        // Check everything before mutating anything.
        for item in order.items() {
            let product = state
                .products
                .iter()
                .find(|p| p.id == item.product_id)
                .ok_or_else(|| StoreError::not_found("product", item.product_id))?;
            if !product.has_stock(item.quantity) {
                return Err(StoreError::InsufficientStock {
                    product_id: item.product_id,
                });
            }
        }
        if state
            .orders
            .iter()
            .any(|o| o.order_number() == order.order_number())
        {
            return Err(StoreError::Conflict(format!(
                "Order number {} already exists",
                order.order_number()
            )));
        }

        for item in order.items() {
            if let Some(product) = state.product_mut(item.product_id) {
                product.stock -= item.quantity;
                product.updated_at = order.created_at();
            }
        }
        state.orders.push(order.clone());
        state.carts.insert(cart.user_id(), cart.clone());
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state.orders.iter().find(|o| o.id() == id).cloned())
    }

    async fn query_orders(&self, query: OrderQuery) -> Result<Page<Order>> {
        let state = self.state.read().await;
        let matches: Vec<Order> = state
            .orders
            .iter()
            .filter(|o| {
                if let Some(user_id) = query.user_id
                    && o.user_id() != user_id
                {
                    return false;
                }
                if let Some(status) = query.status
                    && o.status() != status
                {
                    return false;
                }
                if let Some(payment_status) = query.payment_status
                    && o.payment_status() != payment_status
                {
                    return false;
                }
                if let Some(ref term) = query.search {
                    let owner = state.users.iter().find(|u| u.id == o.user_id());
                    let hit = contains_ignore_case(o.order_number().as_str(), term)
                        || owner.is_some_and(|u| {
                            contains_ignore_case(&u.name, term)
                                || contains_ignore_case(&u.email, term)
                        });
                    if !hit {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();

        let orders = newest_first(&matches, |o| o.created_at());
        Ok(Page::from_slice(orders, query.page))
    }

    async fn cancel_order(&self, order: &Order, expected: OrderStatus) -> Result<()> {
        let mut state = self.state.write().await;
        let idx = state
            .orders
            .iter()
            .position(|o| o.id() == order.id())
            .ok_or_else(|| StoreError::not_found("order", order.id()))?;
        if state.orders[idx].status() != expected {
            return Err(StoreError::ConcurrencyConflict {
                order_id: order.id(),
                expected,
            });
        }

        for item in order.items() {
            if let Some(product) = state.product_mut(item.product_id) {
                product.stock = product.stock.saturating_add(item.quantity);
                product.updated_at = order.updated_at();
            }
        }
        state.orders[idx] = order.clone();
        Ok(())
    }

    async fn update_order(&self, order: &Order, expected: OrderStatus) -> Result<()> {
        let mut state = self.state.write().await;
        let slot = state
            .orders
            .iter_mut()
            .find(|o| o.id() == order.id())
            .ok_or_else(|| StoreError::not_found("order", order.id()))?;
        if slot.status() != expected {
            return Err(StoreError::ConcurrencyConflict {
                order_id: order.id(),
                expected,
            });
        }
        *slot = order.clone();
        Ok(())
    }

    async fn order_stats(&self, user_id: Option<UserId>) -> Result<OrderStats> {
        let state = self.state.read().await;
        let mut stats = OrderStats::default();
        state
            .orders
            .iter()
            .filter(|o| user_id.is_none_or(|id| o.user_id() == id))
            .for_each(|o| stats.record(o));
        Ok(stats)
    }
}
