//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::AppState;
use api::config::Config;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::Utc;
use common::UserId;
use domain::Role;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::{InMemoryStore, UserStore};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: Router,
    store: InMemoryStore,
}

impl TestApp {
    fn new() -> Self {
        let store = InMemoryStore::new();
        let state = Arc::new(AppState::new(store.clone(), &Config::default()));
        let app = api::create_app(state, get_metrics_handle());
        Self { app, store }
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(body) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(serde_json::to_string(&body).unwrap())
            }
            None => Body::empty(),
        };

        let response = self
            .app
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send("GET", uri, token, None).await
    }

    async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send("POST", uri, token, Some(body)).await
    }

    /// Registers a customer and returns `(user_id, access_token)`.
    async fn register(&self, name: &str, email: &str) -> (UserId, String) {
        let (status, body) = self
            .post(
                "/api/auth/register",
                None,
                json!({ "name": name, "email": email, "password": "Secret123!" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");

        let id = body["data"]["user"]["id"].as_str().unwrap().parse().unwrap();
        let token = body["data"]["accessToken"].as_str().unwrap().to_string();
        (id, token)
    }

    /// Registers a user and promotes them to admin.
    async fn admin(&self) -> String {
        let (id, token) = self.register("Admin", "admin@example.com").await;
        let mut user = self.store.get_user(id).await.unwrap().unwrap();
        user.set_role(Role::Admin, Utc::now());
        self.store.update_user(&user).await.unwrap();
        token
    }

    async fn create_product(&self, admin: &str, name: &str, price: &str, stock: u32) -> String {
        let (status, body) = self
            .post(
                "/api/products",
                Some(admin),
                json!({
                    "name": name,
                    "description": format!("{name} description"),
                    "price": price,
                    "category": "Electronics",
                    "stock": stock,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"]["id"].as_str().unwrap().to_string()
    }
}

fn shipping() -> Value {
    json!({
        "shippingAddress": "1 Main St",
        "shippingCity": "Springfield",
        "shippingState": "IL",
        "shippingZipCode": "62701",
        "shippingCountry": "US",
        "contactPhone": "555-0100",
    })
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new();
    let (status, body) = app.get("/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = TestApp::new();
    let response = app
        .app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_register_login_and_me() {
    let app = TestApp::new();
    let (_, token) = app.register("Alice", "alice@example.com").await;

    let (status, body) = app
        .post(
            "/api/auth/login",
            None,
            json!({ "email": "ALICE@example.com", "password": "Secret123!" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Login successful");
    assert!(body["data"]["refreshToken"].is_string());
    assert!(body["data"]["user"].get("passwordHash").is_none());

    let (status, body) = app.get("/api/auth/me", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], "alice@example.com");
    assert_eq!(body["data"]["role"], "customer");
}

#[tokio::test]
async fn test_wrong_password_is_unauthorized() {
    let app = TestApp::new();
    app.register("Alice", "alice@example.com").await;

    let (status, body) = app
        .post(
            "/api/auth/login",
            None,
            json!({ "email": "alice@example.com", "password": "nope" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["statusCode"], 401);
    assert_eq!(body["message"], "Invalid email or password");
}

#[tokio::test]
async fn test_registration_errors() {
    let app = TestApp::new();

    let (status, body) = app
        .post("/api/auth/register", None, json!({ "email": "not-an-email" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!body["errors"].as_array().unwrap().is_empty());

    app.register("Alice", "alice@example.com").await;
    let (status, body) = app
        .post(
            "/api/auth/register",
            None,
            json!({ "name": "Alice", "email": "alice@example.com", "password": "Secret123!" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Email already registered");
}

#[tokio::test]
async fn test_missing_or_bad_token() {
    let app = TestApp::new();

    let (status, body) = app.get("/api/cart", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "No authorization token provided");

    let (status, _) = app.get("/api/cart", Some("garbage")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_rotates_tokens() {
    let app = TestApp::new();
    let (status, body) = app
        .post(
            "/api/auth/register",
            None,
            json!({ "name": "Alice", "email": "alice@example.com", "password": "Secret123!" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let refresh = body["data"]["refreshToken"].as_str().unwrap().to_string();

    let (status, body) = app
        .post("/api/auth/refresh-token", None, json!({ "refreshToken": refresh }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(body["data"]["refreshToken"], refresh.as_str());

    // The old refresh token was replaced.
    let (status, _) = app
        .post("/api/auth/refresh-token", None, json!({ "refreshToken": refresh }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_routes_require_admin() {
    let app = TestApp::new();
    let (_, customer) = app.register("Alice", "alice@example.com").await;

    let (status, body) = app
        .post(
            "/api/products",
            Some(&customer),
            json!({ "name": "Phone", "description": "A phone", "price": "10.00" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Insufficient permissions");

    let (status, _) = app.get("/api/users", Some(&customer)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = app.admin().await;
    let (status, body) = app.get("/api/users", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["pagination"]["total"], 2);
    assert_eq!(body["data"]["users"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_product_listing() {
    let app = TestApp::new();
    let admin = app.admin().await;
    app.create_product(&admin, "Budget Phone", "199.00", 10).await;
    app.create_product(&admin, "Pro Laptop", "1999.00", 3).await;
    app.create_product(&admin, "Earbuds", "49.99", 0).await;

    let (status, body) = app
        .get("/api/products?sortBy=price&sortOrder=ASC&limit=2", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Products retrieved successfully");
    let products = body["data"]["products"].as_array().unwrap();
    assert_eq!(products.len(), 2);
    assert_eq!(products[0]["name"], "Earbuds");
    assert_eq!(products[0]["price"], "49.99");
    assert_eq!(body["data"]["pagination"]["pages"], 2);

    let (status, body) = app.get("/api/products?search=laptop", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["products"][0]["name"], "Pro Laptop");

    let (status, body) = app.get("/api/products?limit=500&category=Toys", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_reviews_update_rating() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let product = app.create_product(&admin, "Phone", "100.00", 5).await;
    let (_, alice) = app.register("Alice", "alice@example.com").await;

    let uri = format!("/api/products/{product}/reviews");
    let (status, body) = app
        .post(&uri, Some(&alice), json!({ "rating": 4, "comment": "Solid phone" }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let (status, _) = app
        .post(&uri, Some(&alice), json!({ "rating": 5, "comment": "Again" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = app.get(&format!("/api/products/{product}"), None).await;
    assert_eq!(body["data"]["numReviews"], 1);

    let (status, body) = app.get(&uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_checkout_and_cancel() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let product = app.create_product(&admin, "Headphones", "50.00", 5).await;
    let (_, alice) = app.register("Alice", "alice@example.com").await;

    let (status, body) = app
        .post(
            "/api/cart/items",
            Some(&alice),
            json!({ "productId": product, "quantity": 2 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["totalAmount"], "100.00");

    let (status, body) = app.post("/api/orders", Some(&alice), shipping()).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["message"], "Order created successfully");
    let order = &body["data"];
    assert_eq!(order["status"], "pending");
    assert_eq!(order["subtotal"], "100.00");
    assert_eq!(order["shippingCost"], "10.00");
    assert_eq!(order["tax"], "10.00");
    assert_eq!(order["totalAmount"], "120.00");
    assert_eq!(order["items"][0]["quantity"], 2);
    let order_id = order["id"].as_str().unwrap().to_string();

    let (_, body) = app.get(&format!("/api/products/{product}"), None).await;
    assert_eq!(body["data"]["stock"], 3);
    let (_, body) = app.get("/api/cart", Some(&alice)).await;
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 0);

    let cancel = format!("/api/orders/{order_id}/cancel");
    let (status, body) = app.post(&cancel, Some(&alice), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "reason");

    let (status, body) = app
        .post(&cancel, Some(&alice), json!({ "reason": "Changed my mind" }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "cancelled");

    let (_, body) = app.get(&format!("/api/products/{product}"), None).await;
    assert_eq!(body["data"]["stock"], 5);

    let (status, _) = app
        .post(&cancel, Some(&alice), json!({ "reason": "Again" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_checkout_rejections() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let product = app.create_product(&admin, "Tablet", "300.00", 1).await;
    let (_, alice) = app.register("Alice", "alice@example.com").await;

    let (status, body) = app.post("/api/orders", Some(&alice), shipping()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Cart is empty");

    app.post(
        "/api/cart/items",
        Some(&alice),
        json!({ "productId": product, "quantity": 1 }),
    )
    .await;

    let (status, body) = app
        .post("/api/orders", Some(&alice), json!({ "shippingAddress": "1 Main St" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let fields: Vec<&str> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"shippingCity"));
    assert!(fields.contains(&"contactPhone"));

    let (status, body) = app
        .post(
            "/api/cart/items",
            Some(&alice),
            json!({ "productId": product, "quantity": 5 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Insufficient stock. Available: 1");
}

#[tokio::test]
async fn test_order_visibility_and_admin_updates() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let product = app.create_product(&admin, "Watch", "20.00", 10).await;
    let (_, alice) = app.register("Alice", "alice@example.com").await;
    let (_, bob) = app.register("Bob", "bob@example.com").await;

    app.post(
        "/api/cart/items",
        Some(&alice),
        json!({ "productId": product, "quantity": 1 }),
    )
    .await;
    let (_, body) = app.post("/api/orders", Some(&alice), shipping()).await;
    let order_id = body["data"]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/orders/{order_id}");

    let (status, _) = app.get(&uri, Some(&bob)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.get(&uri, Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send(
            "PUT",
            &format!("{uri}/payment-status"),
            Some(&admin),
            Some(json!({ "paymentStatus": "completed", "paymentTransactionId": "txn_1" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "processing");

    let (status, body) = app
        .send(
            "PUT",
            &format!("{uri}/status"),
            Some(&admin),
            Some(json!({ "status": "shipped", "trackingNumber": "1Z999" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["trackingNumber"], "1Z999");

    let (status, _) = app
        .send(
            "PUT",
            &format!("{uri}/status"),
            Some(&alice),
            Some(json!({ "status": "delivered" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, body) = app.get("/api/orders/my-orders", Some(&alice)).await;
    assert_eq!(body["data"]["orders"].as_array().unwrap().len(), 1);
    let (_, body) = app.get("/api/orders/my-orders", Some(&bob)).await;
    assert_eq!(body["data"]["pagination"]["total"], 0);

    let (status, body) = app.get("/api/orders/stats", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["shipped"], 1);

    let (status, body) = app.get("/api/orders?status=shipped", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["orders"][0]["id"], order_id.as_str());
}

#[tokio::test]
async fn test_invalid_id_format() {
    let app = TestApp::new();
    let (status, body) = app.get("/api/products/not-a-uuid", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["statusCode"], 400);
    assert_eq!(body["message"], "Invalid ID");
}

#[tokio::test]
async fn test_password_reset_flow() {
    let app = TestApp::new();
    app.register("Alice", "alice@example.com").await;

    let (status, body) = app
        .post("/api/auth/forgot-password", None, json!({ "email": "alice@example.com" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["data"]["resetToken"].as_str().unwrap().to_string();

    let (status, body) = app
        .post("/api/auth/forgot-password", None, json!({ "email": "nobody@example.com" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["resetToken"], Value::Null);

    let (status, _) = app
        .post(
            "/api/auth/reset-password",
            None,
            json!({ "token": token, "newPassword": "Brand-new-42!" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .post(
            "/api/auth/login",
            None,
            json!({ "email": "alice@example.com", "password": "Brand-new-42!" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_profile_update_and_account_delete() {
    let app = TestApp::new();
    let (_, alice) = app.register("Alice", "alice@example.com").await;

    let (status, body) = app
        .send(
            "PUT",
            "/api/users/profile",
            Some(&alice),
            Some(json!({ "name": "Alice Smith", "address": { "city": "Springfield" } })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["name"], "Alice Smith");
    assert_eq!(body["data"]["address"]["city"], "Springfield");

    let (status, _) = app
        .send("DELETE", "/api/users/account", Some(&alice), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.get("/api/users/profile", Some(&alice)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "User no longer exists");
}

#[tokio::test]
async fn test_add_item_without_quantity_adds_one_unit() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let product_id = app.create_product(&admin, "Charger", "25.00", 5).await;
    let (_, alice) = app.register("Alice", "alice@example.com").await;

    let (status, body) = app
        .post("/api/cart/items", Some(&alice), json!({ "productId": product_id }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["items"][0]["quantity"], 1);
    assert_eq!(body["data"]["totalAmount"], "25.00");

    let (status, body) = app
        .send(
            "PUT",
            &format!("/api/cart/items/{product_id}"),
            Some(&alice),
            Some(json!({})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "quantity");
}

#[tokio::test]
async fn test_oversized_amounts_are_rejected() {
    let app = TestApp::new();
    let admin = app.admin().await;

    let (status, body) = app
        .post(
            "/api/products",
            Some(&admin),
            json!({
                "name": "Yacht",
                "description": "Very large",
                "price": "50000000000000000.00",
                "category": "Other",
                "stock": 10,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "price");

    let product_id = app
        .create_product(&admin, "Island", "99999999.99", u32::MAX)
        .await;
    let (_, alice) = app.register("Alice", "alice@example.com").await;

    let (status, body) = app
        .post(
            "/api/cart/items",
            Some(&alice),
            json!({ "productId": product_id, "quantity": 1_000_000_000 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Cart total is too large");

    let (status, body) = app.get("/api/cart", Some(&alice)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["items"], json!([]));
}
