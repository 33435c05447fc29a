//! Integration tests for cart and checkout against the in-memory store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, Page, PageRequest, ProductId, ReviewId, UserId};
use domain::{
    Cart, Money, NewProduct, Order, OrderStatus, PaymentStatus, PricingPolicy, Product,
    ProductCategory, ProductUpdate, RatingSummary, Review, ShippingInfo, User,
};
use services::{
    CartService, CatalogService, CheckoutService, MAX_ORDER_NUMBER_ATTEMPTS, ServiceError,
};
use store::{
    CartStore, CatalogStore, InMemoryStore, OrderQuery, OrderStats, OrderStore, ProductQuery,
    StoreError, UserStore,
};

struct TestHarness {
    store: InMemoryStore,
    cart: CartService<InMemoryStore>,
    checkout: CheckoutService<InMemoryStore>,
}

impl TestHarness {
    fn new() -> Self {
        let store = InMemoryStore::new();
        Self {
            cart: CartService::new(store.clone()),
            checkout: CheckoutService::new(store.clone(), PricingPolicy::default()),
            store,
        }
    }

    async fn product(&self, name: &str, price_cents: i64, stock: u32) -> Product {
        let product = Product::create(
            NewProduct {
                name: name.to_string(),
                description: format!("{name} description"),
                price: Money::from_cents(price_cents),
                category: ProductCategory::Electronics,
                brand: None,
                stock,
                images: Vec::new(),
                featured: false,
            },
            Utc::now(),
        )
        .unwrap();
        self.store.insert_product(&product).await.unwrap();
        product
    }

    async fn stock(&self, product_id: ProductId) -> u32 {
        self.store.get_product(product_id).await.unwrap().unwrap().stock
    }

    async fn set_stock(&self, product_id: ProductId, stock: u32) {
        let mut product = self.store.get_product(product_id).await.unwrap().unwrap();
        let read_at = product.updated_at;
        product.stock = stock;
        self.store
            .update_product(&product, Some(read_at))
            .await
            .unwrap();
    }
}

fn shipping() -> ShippingInfo {
    ShippingInfo {
        shipping_address: "742 Evergreen Terrace".to_string(),
        shipping_city: "Springfield".to_string(),
        shipping_state: "OR".to_string(),
        shipping_zip_code: "97403".to_string(),
        shipping_country: "US".to_string(),
        contact_phone: "555-0199".to_string(),
        notes: None,
    }
}

#[tokio::test]
async fn adding_beyond_stock_fails_on_second_add() {
    let h = TestHarness::new();
    let p = h.product("Speaker", 2_000, 5).await;
    let user = UserId::new();

    let view = h.cart.add_item(user, p.id, 3).await.unwrap();
    assert_eq!(view.total_amount, Money::from_cents(6_000));

    let err = h.cart.add_item(user, p.id, 3).await.unwrap_err();
    assert!(matches!(err, ServiceError::InsufficientStock(_)));

    // The failed add left the cart as it was
    let view = h.cart.get_or_create(user).await.unwrap();
    assert_eq!(view.items[0].quantity, 3);
    assert_eq!(view.total_amount, Money::from_cents(6_000));
}

#[tokio::test]
async fn pricing_above_and_below_free_shipping() {
    let h = TestHarness::new();
    let big = h.product("Monitor", 12_000, 5).await;
    let small = h.product("Mouse", 5_000, 5).await;

    let alice = UserId::new();
    h.cart.add_item(alice, big.id, 1).await.unwrap();
    let order = h.checkout.create_order(alice, shipping()).await.unwrap();
    assert_eq!(order.subtotal(), Money::from_cents(12_000));
    assert_eq!(order.shipping_cost(), Money::zero());
    assert_eq!(order.tax(), Money::from_cents(1_200));
    assert_eq!(order.total_amount(), Money::from_cents(13_200));

    let bob = UserId::new();
    h.cart.add_item(bob, small.id, 1).await.unwrap();
    let order = h.checkout.create_order(bob, shipping()).await.unwrap();
    assert_eq!(order.shipping_cost(), Money::from_cents(1_000));
    assert_eq!(order.tax(), Money::from_cents(500));
    assert_eq!(order.total_amount(), Money::from_cents(6_500));
}

#[tokio::test]
async fn empty_cart_cannot_check_out() {
    let h = TestHarness::new();
    let user = UserId::new();

    let err = h.checkout.create_order(user, shipping()).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(ref m) if m == "Cart is empty"));

    h.cart.get_or_create(user).await.unwrap();
    let err = h.checkout.create_order(user, shipping()).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));
}

#[tokio::test]
async fn checkout_freezes_lines_and_clears_cart() {
    let h = TestHarness::new();
    let p = h.product("Tablet", 30_000, 10).await;
    let user = UserId::new();
    h.cart.add_item(user, p.id, 2).await.unwrap();

    // A later price change does not affect the price honored at add time
    let mut repriced = h.store.get_product(p.id).await.unwrap().unwrap();
    repriced.price = Money::from_cents(35_000);
    h.store.update_product(&repriced, None).await.unwrap();

    let order = h.checkout.create_order(user, shipping()).await.unwrap();
    assert_eq!(order.status(), OrderStatus::Pending);
    assert_eq!(order.payment_status(), PaymentStatus::Pending);
    assert_eq!(order.items()[0].unit_price, Money::from_cents(30_000));
    assert_eq!(order.items()[0].product_name, "Tablet");
    assert!(order.order_number().as_str().starts_with("ORD-"));

    assert_eq!(h.stock(p.id).await, 8);
    let cart = h.cart.get_or_create(user).await.unwrap();
    assert!(cart.items.is_empty());
    assert!(cart.total_amount.is_zero());
}

#[tokio::test]
async fn shipped_order_cannot_be_cancelled() {
    let h = TestHarness::new();
    let p = h.product("Laptop", 100_000, 3).await;
    let user = UserId::new();
    h.cart.add_item(user, p.id, 1).await.unwrap();
    let order = h.checkout.create_order(user, shipping()).await.unwrap();

    h.checkout
        .update_order_status(order.id(), OrderStatus::Shipped, Some("1Z999".to_string()))
        .await
        .unwrap();

    let err = h
        .checkout
        .cancel_order(order.id(), user, "Too slow")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));
    assert_eq!(h.stock(p.id).await, 2);
}

#[tokio::test]
async fn pending_order_cancel_restores_stock() {
    let h = TestHarness::new();
    let a = h.product("Phone", 50_000, 5).await;
    let b = h.product("Case", 2_000, 20).await;
    let user = UserId::new();
    h.cart.add_item(user, a.id, 2).await.unwrap();
    h.cart.add_item(user, b.id, 4).await.unwrap();
    let order = h.checkout.create_order(user, shipping()).await.unwrap();
    assert_eq!(h.stock(a.id).await, 3);
    assert_eq!(h.stock(b.id).await, 16);

    let cancelled = h
        .checkout
        .cancel_order(order.id(), user, "Changed my mind")
        .await
        .unwrap();
    assert_eq!(cancelled.status(), OrderStatus::Cancelled);
    assert!(cancelled.cancelled_at().is_some());
    assert_eq!(cancelled.cancellation_reason(), Some("Changed my mind"));
    assert_eq!(h.stock(a.id).await, 5);
    assert_eq!(h.stock(b.id).await, 20);

    // A retried cancel is rejected and does not restore stock again
    let err = h
        .checkout
        .cancel_order(order.id(), user, "Again")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));
    assert_eq!(h.stock(a.id).await, 5);
}

#[tokio::test]
async fn concurrent_cancels_restore_stock_once() {
    let h = TestHarness::new();
    let p = h.product("Watch", 20_000, 4).await;
    let user = UserId::new();
    h.cart.add_item(user, p.id, 3).await.unwrap();
    let order = h.checkout.create_order(user, shipping()).await.unwrap();

    let (first, second) = tokio::join!(
        h.checkout.cancel_order(order.id(), user, "one"),
        h.checkout.cancel_order(order.id(), user, "two"),
    );
    assert_eq!(
        [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count(),
        1
    );
    assert_eq!(h.stock(p.id).await, 4);
}

#[tokio::test]
async fn only_the_owner_can_cancel() {
    let h = TestHarness::new();
    let p = h.product("Watch", 20_000, 4).await;
    let owner = UserId::new();
    h.cart.add_item(owner, p.id, 1).await.unwrap();
    let order = h.checkout.create_order(owner, shipping()).await.unwrap();

    let err = h
        .checkout
        .cancel_order(order.id(), UserId::new(), "Not mine")
        .await
        .unwrap_err();
    assert_eq!(err.code(), 404);
    assert!(h.checkout.get_order(order.id(), Some(UserId::new())).await.is_err());
    assert!(h.checkout.get_order(order.id(), None).await.is_ok());
}

#[tokio::test]
async fn completed_payment_moves_pending_to_processing() {
    let h = TestHarness::new();
    let p = h.product("Console", 45_000, 2).await;
    let user = UserId::new();
    h.cart.add_item(user, p.id, 1).await.unwrap();
    let order = h.checkout.create_order(user, shipping()).await.unwrap();

    let paid = h
        .checkout
        .update_payment_status(order.id(), PaymentStatus::Completed, Some("txn_42".to_string()))
        .await
        .unwrap();
    assert_eq!(paid.status(), OrderStatus::Processing);
    assert_eq!(paid.payment_transaction_id(), Some("txn_42"));

    let again = h
        .checkout
        .update_payment_status(order.id(), PaymentStatus::Completed, None)
        .await
        .unwrap();
    assert_eq!(again.status(), OrderStatus::Processing);
    assert_eq!(again.payment_transaction_id(), Some("txn_42"));
}

#[tokio::test]
async fn terminal_orders_reject_status_changes() {
    let h = TestHarness::new();
    let p = h.product("Console", 45_000, 2).await;
    let user = UserId::new();
    h.cart.add_item(user, p.id, 1).await.unwrap();
    let order = h.checkout.create_order(user, shipping()).await.unwrap();

    h.checkout
        .update_order_status(order.id(), OrderStatus::Delivered, None)
        .await
        .unwrap();
    let err = h
        .checkout
        .update_order_status(order.id(), OrderStatus::Processing, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));
}

#[tokio::test]
async fn failing_second_line_leaves_first_line_stock_untouched() {
    let h = TestHarness::new();
    let plenty = h.product("Charger", 1_500, 10).await;
    let scarce = h.product("Drone", 80_000, 3).await;
    let user = UserId::new();
    h.cart.add_item(user, plenty.id, 2).await.unwrap();
    h.cart.add_item(user, scarce.id, 3).await.unwrap();

    // Stock drops after the drone went into the cart
    h.set_stock(scarce.id, 1).await;

    let err = h.checkout.create_order(user, shipping()).await.unwrap_err();
    assert!(matches!(err, ServiceError::InsufficientStock(ref m) if m.contains("Drone")));

    assert_eq!(h.stock(plenty.id).await, 10);
    assert_eq!(h.stock(scarce.id).await, 1);
    assert_eq!(h.store.order_count().await, 0);
    let cart = h.cart.get_or_create(user).await.unwrap();
    assert_eq!(cart.items.len(), 2);
}

#[tokio::test]
async fn deleted_product_drops_out_of_checkout() {
    let h = TestHarness::new();
    let p = h.product("Camera", 60_000, 3).await;
    let q = h.product("Strap", 1_000, 3).await;
    let user = UserId::new();
    h.cart.add_item(user, p.id, 1).await.unwrap();
    h.cart.add_item(user, q.id, 1).await.unwrap();

    // Deleting a product drops it from carts, so checkout goes through
    // with the remaining line
    h.store.delete_product(q.id).await.unwrap();
    let order = h.checkout.create_order(user, shipping()).await.unwrap();
    assert_eq!(order.items().len(), 1);
    assert_eq!(h.stock(p.id).await, 2);
}

#[tokio::test]
async fn concurrent_checkouts_never_oversell() {
    let h = TestHarness::new();
    let p = h.product("Limited Edition", 10_000, 5).await;
    let (alice, bob) = (UserId::new(), UserId::new());
    h.cart.add_item(alice, p.id, 3).await.unwrap();
    h.cart.add_item(bob, p.id, 3).await.unwrap();

    let (a, b) = tokio::join!(
        h.checkout.create_order(alice, shipping()),
        h.checkout.create_order(bob, shipping()),
    );
    let placed = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(placed, 1);
    assert!(
        [a, b]
            .into_iter()
            .filter_map(Result::err)
            .all(|e| matches!(e, ServiceError::InsufficientStock(_)))
    );
    assert_eq!(h.stock(p.id).await, 2);
}

#[tokio::test]
async fn cart_total_tracks_every_mutation() {
    let h = TestHarness::new();
    let a = h.product("Keyboard", 4_999, 10).await;
    let b = h.product("Mousepad", 1_250, 10).await;
    let user = UserId::new();

    let check = |view: &services::CartView| {
        let sum = Money::checked_sum(
            view.items
                .iter()
                .map(|i| i.price.checked_mul(i.quantity).unwrap()),
        )
        .unwrap();
        assert_eq!(view.total_amount, sum);
    };

    check(&h.cart.add_item(user, a.id, 2).await.unwrap());
    check(&h.cart.add_item(user, b.id, 3).await.unwrap());
    check(&h.cart.update_item(user, a.id, 1).await.unwrap());
    check(&h.cart.remove_item(user, ProductId::new()).await.unwrap());
    check(&h.cart.remove_item(user, b.id).await.unwrap());
    let view = h.cart.clear(user).await.unwrap();
    check(&view);
    assert!(view.total_amount.is_zero());
}

#[tokio::test]
async fn order_listing_and_stats() {
    let h = TestHarness::new();
    let p = h.product("Earbuds", 8_000, 20).await;
    let user = UserId::new();

    let mut orders = Vec::new();
    for _ in 0..3 {
        h.cart.add_item(user, p.id, 1).await.unwrap();
        orders.push(h.checkout.create_order(user, shipping()).await.unwrap());
    }
    h.checkout
        .cancel_order(orders[0].id(), user, "Duplicate")
        .await
        .unwrap();

    let page = h
        .checkout
        .list_user_orders(user, PageRequest::new(1, 2))
        .await
        .unwrap();
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.pagination.total, 3);
    assert_eq!(page.pagination.pages, 2);

    let cancelled = h
        .checkout
        .list_orders(OrderQuery::new().status(OrderStatus::Cancelled))
        .await
        .unwrap();
    assert_eq!(cancelled.items.len(), 1);

    let stats = h.checkout.order_stats(Some(user)).await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.cancelled, 1);
    assert_eq!(stats.pending, 2);
    assert_eq!(
        stats.total_revenue,
        orders[1]
            .total_amount()
            .checked_add(orders[2].total_amount())
            .unwrap()
    );
}

#[tokio::test]
async fn price_edit_after_checkout_keeps_sold_stock() {
    let h = TestHarness::new();
    let catalog = CatalogService::new(h.store.clone());
    let p = h.product("Monitor", 20_000, 5).await;
    let user = UserId::new();

    h.cart.add_item(user, p.id, 4).await.unwrap();
    h.checkout.create_order(user, shipping()).await.unwrap();
    assert_eq!(h.stock(p.id).await, 1);

    let update = ProductUpdate {
        price: Some(Money::from_cents(18_000)),
        ..Default::default()
    };
    let updated = catalog.update_product(p.id, update).await.unwrap();
    assert_eq!(updated.price.cents(), 18_000);
    assert_eq!(updated.stock, 1);
    assert_eq!(h.stock(p.id).await, 1);

    let update = ProductUpdate {
        stock: Some(40),
        ..Default::default()
    };
    assert_eq!(catalog.update_product(p.id, update).await.unwrap().stock, 40);
}

/// Delegates to an in-memory store but reports the first `collisions`
/// order placements as order-number conflicts.
#[derive(Clone)]
struct CollidingStore {
    inner: InMemoryStore,
    collisions: Arc<Mutex<u32>>,
    attempted: Arc<Mutex<Vec<String>>>,
}

impl CollidingStore {
    fn new(inner: InMemoryStore, collisions: u32) -> Self {
        Self {
            inner,
            collisions: Arc::new(Mutex::new(collisions)),
            attempted: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn attempted(&self) -> Vec<String> {
        self.attempted.lock().unwrap().clone()
    }
}

#[async_trait]
impl UserStore for CollidingStore {
    async fn insert_user(&self, user: &User) -> store::Result<()> {
        self.inner.insert_user(user).await
    }

    async fn get_user(&self, id: UserId) -> store::Result<Option<User>> {
        self.inner.get_user(id).await
    }

    async fn find_user_by_email(&self, email: &str) -> store::Result<Option<User>> {
        self.inner.find_user_by_email(email).await
    }

    async fn find_user_by_reset_token(&self, token_hash: &str) -> store::Result<Option<User>> {
        self.inner.find_user_by_reset_token(token_hash).await
    }

    async fn update_user(&self, user: &User) -> store::Result<()> {
        self.inner.update_user(user).await
    }

    async fn delete_user(&self, id: UserId) -> store::Result<bool> {
        self.inner.delete_user(id).await
    }

    async fn list_users(&self, page: PageRequest) -> store::Result<Page<User>> {
        self.inner.list_users(page).await
    }
}

#[async_trait]
impl CatalogStore for CollidingStore {
    async fn insert_product(&self, product: &Product) -> store::Result<()> {
        self.inner.insert_product(product).await
    }

    async fn get_product(&self, id: ProductId) -> store::Result<Option<Product>> {
        self.inner.get_product(id).await
    }

    async fn get_products(&self, ids: &[ProductId]) -> store::Result<HashMap<ProductId, Product>> {
        self.inner.get_products(ids).await
    }

    async fn query_products(&self, query: ProductQuery) -> store::Result<Page<Product>> {
        self.inner.query_products(query).await
    }

    async fn update_product(
        &self,
        product: &Product,
        stock_read_at: Option<DateTime<Utc>>,
    ) -> store::Result<Product> {
        self.inner.update_product(product, stock_read_at).await
    }

    async fn delete_product(&self, id: ProductId) -> store::Result<bool> {
        self.inner.delete_product(id).await
    }

    async fn insert_review(&self, review: &Review) -> store::Result<()> {
        self.inner.insert_review(review).await
    }

    async fn get_review(&self, id: ReviewId) -> store::Result<Option<Review>> {
        self.inner.get_review(id).await
    }

    async fn update_review(&self, review: &Review) -> store::Result<()> {
        self.inner.update_review(review).await
    }

    async fn delete_review(&self, id: ReviewId) -> store::Result<bool> {
        self.inner.delete_review(id).await
    }

    async fn list_reviews(&self, product_id: ProductId) -> store::Result<Vec<Review>> {
        self.inner.list_reviews(product_id).await
    }

    async fn refresh_product_rating(&self, product_id: ProductId) -> store::Result<RatingSummary> {
        self.inner.refresh_product_rating(product_id).await
    }
}

#[async_trait]
impl CartStore for CollidingStore {
    async fn get_cart(&self, user_id: UserId) -> store::Result<Option<Cart>> {
        self.inner.get_cart(user_id).await
    }

    async fn save_cart(&self, cart: &Cart) -> store::Result<()> {
        self.inner.save_cart(cart).await
    }
}

#[async_trait]
impl OrderStore for CollidingStore {
    async fn place_order(&self, order: &Order, cart: &Cart) -> store::Result<()> {
        self.attempted
            .lock()
            .unwrap()
            .push(order.order_number().to_string());
        {
            let mut remaining = self.collisions.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StoreError::Conflict(format!(
                    "Order number {} already exists",
                    order.order_number()
                )));
            }
        }
        self.inner.place_order(order, cart).await
    }

    async fn get_order(&self, id: OrderId) -> store::Result<Option<Order>> {
        self.inner.get_order(id).await
    }

    async fn query_orders(&self, query: OrderQuery) -> store::Result<Page<Order>> {
        self.inner.query_orders(query).await
    }

    async fn cancel_order(&self, order: &Order, expected: OrderStatus) -> store::Result<()> {
        self.inner.cancel_order(order, expected).await
    }

    async fn update_order(&self, order: &Order, expected: OrderStatus) -> store::Result<()> {
        self.inner.update_order(order, expected).await
    }

    async fn order_stats(&self, user_id: Option<UserId>) -> store::Result<OrderStats> {
        self.inner.order_stats(user_id).await
    }
}

/// Fills a cart for `user` through a plain in-memory harness and returns a
/// checkout service that collides `collisions` times.
async fn colliding_checkout(
    collisions: u32,
) -> (TestHarness, CollidingStore, CheckoutService<CollidingStore>, ProductId, UserId) {
    let h = TestHarness::new();
    let p = h.product("Router", 12_000, 5).await;
    let user = UserId::new();
    h.cart.add_item(user, p.id, 2).await.unwrap();

    let store = CollidingStore::new(h.store.clone(), collisions);
    let checkout = CheckoutService::new(store.clone(), PricingPolicy::default());
    (h, store, checkout, p.id, user)
}

#[tokio::test]
async fn taken_order_number_is_regenerated() {
    let collisions = MAX_ORDER_NUMBER_ATTEMPTS - 1;
    let (h, store, checkout, product_id, user) = colliding_checkout(collisions).await;

    let order = checkout.create_order(user, shipping()).await.unwrap();

    let attempted = store.attempted();
    assert_eq!(attempted.len(), MAX_ORDER_NUMBER_ATTEMPTS as usize);
    assert_eq!(attempted.last().unwrap(), order.order_number().as_str());
    assert!(order.order_number().as_str().starts_with("ORD-"));

    // Only the successful attempt touched stock
    assert_eq!(h.stock(product_id).await, 3);
    assert_eq!(h.store.order_count().await, 1);
    assert!(h.cart.get_or_create(user).await.unwrap().items.is_empty());
}

#[tokio::test]
async fn order_number_attempts_are_bounded() {
    let (h, store, checkout, product_id, user) =
        colliding_checkout(MAX_ORDER_NUMBER_ATTEMPTS).await;

    let err = checkout.create_order(user, shipping()).await.unwrap_err();
    assert!(matches!(err, ServiceError::Internal(_)));
    assert_eq!(err.code(), 500);

    assert_eq!(store.attempted().len(), MAX_ORDER_NUMBER_ATTEMPTS as usize);
    assert_eq!(h.stock(product_id).await, 5);
    assert_eq!(h.store.order_count().await, 0);
    assert_eq!(h.cart.get_or_create(user).await.unwrap().items.len(), 1);
}
