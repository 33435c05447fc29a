use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CartId, CartItemId, OrderId, Page, PageRequest, ProductId, ReviewId, UserId};
use domain::{
    Address, Cart, CartItem, Money, Order, OrderStatus, Product, Rating, RatingSummary, Review,
    User,
};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::query::like_pattern;
use crate::{
    CartStore, CatalogStore, OrderQuery, OrderStats, OrderStore, ProductQuery, ProductSort,
    Result, SortOrder, StoreError, UserStore,
};

const USER_COLUMNS: &str = "id, name, email, password_hash, role, phone, address, \
    is_email_verified, refresh_token, reset_password_token_hash, reset_password_expires, \
    created_at, updated_at";

const PRODUCT_COLUMNS: &str = "id, name, description, price_cents, category, brand, stock, \
    images, rating_tenths, num_reviews, featured, created_at, updated_at";

const REVIEW_COLUMNS: &str = "id, product_id, user_id, rating, comment, created_at, updated_at";

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_user(row: &PgRow) -> Result<User> {
        let role: String = row.try_get("role")?;
        let address: Option<serde_json::Value> = row.try_get("address")?;
        let address: Option<Address> = address.map(serde_json::from_value).transpose()?;

        Ok(User {
            id: UserId::from_uuid(row.try_get("id")?),
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            role: role
                .parse()
                .map_err(|_| StoreError::InvalidData(format!("unknown role {role:?}")))?,
            phone: row.try_get("phone")?,
            address,
            is_email_verified: row.try_get("is_email_verified")?,
            refresh_token: row.try_get("refresh_token")?,
            reset_password_token_hash: row.try_get("reset_password_token_hash")?,
            reset_password_expires: row.try_get("reset_password_expires")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_product(row: &PgRow) -> Result<Product> {
        let category: String = row.try_get("category")?;
        let stock: i64 = row.try_get("stock")?;
        let rating: i16 = row.try_get("rating_tenths")?;
        let num_reviews: i32 = row.try_get("num_reviews")?;

        Ok(Product {
            id: ProductId::from_uuid(row.try_get("id")?),
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            category: category
                .parse()
                .map_err(|_| StoreError::InvalidData(format!("unknown category {category:?}")))?,
            brand: row.try_get("brand")?,
            stock: u32::try_from(stock)
                .map_err(|_| StoreError::InvalidData(format!("stock out of range: {stock}")))?,
            images: row.try_get("images")?,
            rating: u8::try_from(rating)
                .ok()
                .and_then(Rating::from_tenths)
                .ok_or_else(|| StoreError::InvalidData(format!("rating out of range: {rating}")))?,
            num_reviews: u32::try_from(num_reviews).map_err(|_| {
                StoreError::InvalidData(format!("review count out of range: {num_reviews}"))
            })?,
            featured: row.try_get("featured")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_review(row: &PgRow) -> Result<Review> {
        let rating: i16 = row.try_get("rating")?;
        Ok(Review {
            id: ReviewId::from_uuid(row.try_get("id")?),
            product_id: ProductId::from_uuid(row.try_get("product_id")?),
            user_id: UserId::from_uuid(row.try_get("user_id")?),
            rating: u8::try_from(rating)
                .map_err(|_| StoreError::InvalidData(format!("review rating {rating}")))?,
            comment: row.try_get("comment")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_order(row: &PgRow) -> Result<Order> {
        let document: serde_json::Value = row.try_get("document")?;
        Ok(serde_json::from_value(document)?)
    }
}

/// Name of the violated constraint, if `err` is a constraint violation.
fn violated_constraint(err: &sqlx::Error) -> Option<&str> {
    match err {
        sqlx::Error::Database(db_err) => db_err.constraint(),
        _ => None,
    }
}

/// Narrows a count to an `INTEGER` column, rejecting values it cannot hold.
fn to_i32(column: &str, value: impl TryInto<i32> + Copy + std::fmt::Display) -> Result<i32> {
    value
        .try_into()
        .map_err(|_| StoreError::InvalidData(format!("{column} out of range: {value}")))
}

/// Upserts the user's cart row and rewrites its lines.
async fn write_cart(conn: &mut PgConnection, cart: &Cart) -> Result<()> {
    let cart_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO carts (id, user_id, created_at, updated_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (user_id) DO UPDATE SET updated_at = EXCLUDED.updated_at
        RETURNING id
        "#,
    )
    .bind(cart.id().as_uuid())
    .bind(cart.user_id().as_uuid())
    .bind(cart.created_at())
    .bind(cart.updated_at())
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
        .bind(cart_id)
        .execute(&mut *conn)
        .await?;

    for (position, item) in cart.items().iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO cart_items (id, cart_id, product_id, position, quantity, price_cents)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(cart_id)
        .bind(item.product_id.as_uuid())
        .bind(to_i32("position", position)?)
        .bind(i64::from(item.quantity))
        .bind(item.price.cents())
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Recomputes and stores a product's rating from its reviews.
async fn write_rating(conn: &mut PgConnection, product_id: ProductId) -> Result<RatingSummary> {
    let ratings: Vec<i16> = sqlx::query_scalar("SELECT rating FROM reviews WHERE product_id = $1")
        .bind(product_id.as_uuid())
        .fetch_all(&mut *conn)
        .await?;
    let stars = ratings
        .into_iter()
        .map(|r| {
            u8::try_from(r)
                .map_err(|_| StoreError::InvalidData(format!("review rating out of range: {r}")))
        })
        .collect::<Result<Vec<_>>>()?;
    let summary = Rating::average(stars);

    sqlx::query("UPDATE products SET rating_tenths = $2, num_reviews = $3 WHERE id = $1")
        .bind(product_id.as_uuid())
        .bind(i16::from(summary.rating.tenths()))
        .bind(to_i32("num_reviews", summary.num_reviews)?)
        .execute(&mut *conn)
        .await?;

    Ok(summary)
}

/// Writes the mutable order columns, guarded by the status the caller read.
async fn write_order_status(
    conn: &mut PgConnection,
    order: &Order,
    expected: OrderStatus,
) -> Result<()> {
    let document = serde_json::to_value(order)?;
    let result = sqlx::query(
        r#"
        UPDATE orders
        SET status = $2, payment_status = $3, document = $4, updated_at = $5
        WHERE id = $1 AND status = $6
        "#,
    )
    .bind(order.id().as_uuid())
    .bind(order.status().as_str())
    .bind(order.payment_status().as_str())
    .bind(document)
    .bind(order.updated_at())
    .bind(expected.as_str())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM orders WHERE id = $1")
            .bind(order.id().as_uuid())
            .fetch_optional(&mut *conn)
            .await?;
        return Err(match exists {
            None => StoreError::not_found("order", order.id()),
            Some(_) => StoreError::ConcurrencyConflict {
                order_id: order.id(),
                expected,
            },
        });
    }
    Ok(())
}

fn push_product_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &ProductQuery) {
    qb.push(" WHERE TRUE");
    if let Some(category) = query.category {
        qb.push(" AND category = ").push_bind(category.as_str());
    }
    if let Some(min) = query.min_price {
        qb.push(" AND price_cents >= ").push_bind(min.cents());
    }
    if let Some(max) = query.max_price {
        qb.push(" AND price_cents <= ").push_bind(max.cents());
    }
    if let Some(featured) = query.featured {
        qb.push(" AND featured = ").push_bind(featured);
    }
    if let Some(ref term) = query.search {
        qb.push(" AND name ILIKE ").push_bind(like_pattern(term));
    }
}

fn push_order_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &OrderQuery) {
    qb.push(" WHERE TRUE");
    if let Some(user_id) = query.user_id {
        qb.push(" AND o.user_id = ").push_bind(user_id.as_uuid());
    }
    if let Some(status) = query.status {
        qb.push(" AND o.status = ").push_bind(status.as_str());
    }
    if let Some(payment_status) = query.payment_status {
        qb.push(" AND o.payment_status = ")
            .push_bind(payment_status.as_str());
    }
    if let Some(ref term) = query.search {
        let pattern = like_pattern(term);
        qb.push(" AND (o.order_number ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR u.name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR u.email ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

fn push_page(qb: &mut QueryBuilder<'_, Postgres>, page: PageRequest) {
    qb.push(" LIMIT ").push_bind(page.take() as i64);
    qb.push(" OFFSET ").push_bind(page.offset() as i64);
}

fn total_from(count: i64) -> u64 {
    u64::try_from(count).unwrap_or(0)
}

#[async_trait]
impl UserStore for PostgresStore {
    async fn insert_user(&self, user: &User) -> Result<()> {
        let address = user.address.as_ref().map(serde_json::to_value).transpose()?;
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, password_hash, role, phone, address,
                is_email_verified, refresh_token, reset_password_token_hash,
                reset_password_expires, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(&user.phone)
        .bind(address)
        .bind(user.is_email_verified)
        .bind(&user.refresh_token)
        .bind(&user.reset_password_token_hash)
        .bind(user.reset_password_expires)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if violated_constraint(&e) == Some("users_email_key") {
                return StoreError::Conflict("Email already registered".to_string());
            }
            StoreError::Database(e)
        })?;
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_user).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_user).transpose()
    }

    async fn find_user_by_reset_token(&self, token_hash: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE reset_password_token_hash = $1"
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_user).transpose()
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        let address = user.address.as_ref().map(serde_json::to_value).transpose()?;
        let result = sqlx::query(
            r#"
            UPDATE users
            SET name = $2, email = $3, password_hash = $4, role = $5, phone = $6,
                address = $7, is_email_verified = $8, refresh_token = $9,
                reset_password_token_hash = $10, reset_password_expires = $11,
                updated_at = $12
            WHERE id = $1
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(&user.phone)
        .bind(address)
        .bind(user.is_email_verified)
        .bind(&user.refresh_token)
        .bind(&user.reset_password_token_hash)
        .bind(user.reset_password_expires)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if violated_constraint(&e) == Some("users_email_key") {
                return StoreError::Conflict("Email already registered".to_string());
            }
            StoreError::Database(e)
        })?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("user", user.id));
        }
        Ok(())
    }

    async fn delete_user(&self, id: UserId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let reviewed: Vec<Uuid> =
            sqlx::query_scalar("SELECT product_id FROM reviews WHERE user_id = $1")
                .bind(id.as_uuid())
                .fetch_all(&mut *tx)
                .await?;

        // Cart, orders and reviews go with the user (ON DELETE CASCADE).
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }

        for product_id in reviewed {
            write_rating(&mut tx, ProductId::from_uuid(product_id)).await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn list_users(&self, page: PageRequest) -> Result<Page<User>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2"
        ))
        .bind(page.take() as i64)
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        let users = rows
            .iter()
            .map(Self::row_to_user)
            .collect::<Result<Vec<_>>>()?;
        Ok(Page::new(users, page, total_from(total)))
    }
}

#[async_trait]
impl CatalogStore for PostgresStore {
    async fn insert_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, description, price_cents, category, brand, stock,
                images, rating_tenths, num_reviews, featured, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.cents())
        .bind(product.category.as_str())
        .bind(&product.brand)
        .bind(i64::from(product.stock))
        .bind(&product.images)
        .bind(i16::from(product.rating.tenths()))
        .bind(to_i32("num_reviews", product.num_reviews)?)
        .bind(product.featured)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_product).transpose()
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<HashMap<ProductId, Product>> {
        let ids: Vec<Uuid> = ids.iter().map(ProductId::as_uuid).collect();
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| Self::row_to_product(row).map(|p| (p.id, p)))
            .collect()
    }

    async fn query_products(&self, query: ProductQuery) -> Result<Page<Product>> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM products");
        push_product_filters(&mut count, &query);
        let total: i64 = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut select = QueryBuilder::new(format!("SELECT {PRODUCT_COLUMNS} FROM products"));
        push_product_filters(&mut select, &query);
        let column = match query.sort_by {
            ProductSort::CreatedAt => "created_at",
            ProductSort::Price => "price_cents",
            ProductSort::Rating => "rating_tenths",
            ProductSort::Name => "LOWER(name)",
        };
        let direction = match query.sort_order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        select.push(format!(" ORDER BY {column} {direction}, id {direction}"));
        push_page(&mut select, query.page);

        let rows = select.build().fetch_all(&self.pool).await?;
        let products = rows
            .iter()
            .map(Self::row_to_product)
            .collect::<Result<Vec<_>>>()?;
        Ok(Page::new(products, query.page, total_from(total)))
    }

    async fn update_product(
        &self,
        product: &Product,
        stock_read_at: Option<DateTime<Utc>>,
    ) -> Result<Product> {
        // $10 is NULL for catalog-only edits, which leave stock alone.
        let row = sqlx::query(&format!(
            r#"
            UPDATE products
            SET name = $2, description = $3, price_cents = $4, category = $5, brand = $6,
                images = $7, featured = $8, updated_at = $9, stock = COALESCE($10, stock)
            WHERE id = $1 AND ($11::TIMESTAMPTZ IS NULL OR updated_at = $11)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.cents())
        .bind(product.category.as_str())
        .bind(&product.brand)
        .bind(&product.images)
        .bind(product.featured)
        .bind(product.updated_at)
        .bind(stock_read_at.map(|_| i64::from(product.stock)))
        .bind(stock_read_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Self::row_to_product(&row);
        }
        if stock_read_at.is_some() && self.get_product(product.id).await?.is_some() {
            return Err(StoreError::product_changed());
        }
        Err(StoreError::not_found("product", product.id))
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool> {
        // Reviews and cart lines go with the product (ON DELETE CASCADE).
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_review(&self, review: &Review) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO reviews (id, product_id, user_id, rating, comment, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(review.id.as_uuid())
        .bind(review.product_id.as_uuid())
        .bind(review.user_id.as_uuid())
        .bind(i16::from(review.rating))
        .bind(&review.comment)
        .bind(review.created_at)
        .bind(review.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if violated_constraint(&e) == Some("reviews_product_user_key") {
                return StoreError::Conflict("You have already reviewed this product".to_string());
            }
            StoreError::Database(e)
        })?;
        Ok(())
    }

    async fn get_review(&self, id: ReviewId) -> Result<Option<Review>> {
        let row = sqlx::query(&format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_review).transpose()
    }

    async fn update_review(&self, review: &Review) -> Result<()> {
        let result = sqlx::query(
            "UPDATE reviews SET rating = $2, comment = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(review.id.as_uuid())
        .bind(i16::from(review.rating))
        .bind(&review.comment)
        .bind(review.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("review", review.id));
        }
        Ok(())
    }

    async fn delete_review(&self, id: ReviewId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_reviews(&self, product_id: ProductId) -> Result<Vec<Review>> {
        let rows = sqlx::query(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE product_id = $1 \
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(product_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_review).collect()
    }

    async fn refresh_product_rating(&self, product_id: ProductId) -> Result<RatingSummary> {
        let mut tx = self.pool.begin().await?;

        let locked: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM products WHERE id = $1 FOR UPDATE")
                .bind(product_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Err(StoreError::not_found("product", product_id));
        }

        let summary = write_rating(&mut tx, product_id).await?;
        tx.commit().await?;
        Ok(summary)
    }
}

#[async_trait]
impl CartStore for PostgresStore {
    async fn get_cart(&self, user_id: UserId) -> Result<Option<Cart>> {
        let Some(row) = sqlx::query(
            "SELECT id, user_id, created_at, updated_at FROM carts WHERE user_id = $1",
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let cart_id: Uuid = row.try_get("id")?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

        let item_rows = sqlx::query(
            r#"
            SELECT id, product_id, quantity, price_cents
            FROM cart_items
            WHERE cart_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(cart_id)
        .fetch_all(&self.pool)
        .await?;

        let items = item_rows
            .iter()
            .map(|row| {
                let quantity: i64 = row.try_get("quantity")?;
                Ok(CartItem {
                    id: CartItemId::from_uuid(row.try_get("id")?),
                    product_id: ProductId::from_uuid(row.try_get("product_id")?),
                    quantity: u32::try_from(quantity).map_err(|_| {
                        StoreError::InvalidData(format!("cart quantity out of range: {quantity}"))
                    })?,
                    price: Money::from_cents(row.try_get("price_cents")?),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(Cart::restore(
            CartId::from_uuid(cart_id),
            user_id,
            items,
            created_at,
            updated_at,
        )))
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        write_cart(&mut tx, cart).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn place_order(&self, order: &Order, cart: &Cart) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Lock product rows in a fixed order so concurrent checkouts cannot deadlock.
        let mut items: Vec<_> = order.items().iter().collect();
        items.sort_by_key(|item| item.product_id);

        for item in items {
            let result = sqlx::query(
                r#"
                UPDATE products
                SET stock = stock - $2, updated_at = $3
                WHERE id = $1 AND stock >= $2
                "#,
            )
            .bind(item.product_id.as_uuid())
            .bind(i64::from(item.quantity))
            .bind(order.created_at())
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                let exists: Option<Uuid> =
                    sqlx::query_scalar("SELECT id FROM products WHERE id = $1")
                        .bind(item.product_id.as_uuid())
                        .fetch_optional(&mut *tx)
                        .await?;
                tracing::debug!(product_id = %item.product_id, "conditional stock decrement matched no row");
                return Err(match exists {
                    None => StoreError::not_found("product", item.product_id),
                    Some(_) => StoreError::InsufficientStock {
                        product_id: item.product_id,
                    },
                });
            }
        }

        let document = serde_json::to_value(order)?;
        sqlx::query(
            r#"
            INSERT INTO orders (id, order_number, user_id, status, payment_status,
                total_amount_cents, document, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.order_number().as_str())
        .bind(order.user_id().as_uuid())
        .bind(order.status().as_str())
        .bind(order.payment_status().as_str())
        .bind(order.total_amount().cents())
        .bind(document)
        .bind(order.created_at())
        .bind(order.updated_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if violated_constraint(&e) == Some("orders_order_number_key") {
                return StoreError::Conflict(format!(
                    "Order number {} already exists",
                    order.order_number()
                ));
            }
            StoreError::Database(e)
        })?;

        write_cart(&mut tx, cart).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT document FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_order).transpose()
    }

    async fn query_orders(&self, query: OrderQuery) -> Result<Page<Order>> {
        const FROM: &str = " FROM orders o LEFT JOIN users u ON u.id = o.user_id";

        let mut count = QueryBuilder::new(format!("SELECT COUNT(*){FROM}"));
        push_order_filters(&mut count, &query);
        let total: i64 = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut select = QueryBuilder::new(format!("SELECT o.document{FROM}"));
        push_order_filters(&mut select, &query);
        select.push(" ORDER BY o.created_at DESC, o.id DESC");
        push_page(&mut select, query.page);

        let rows = select.build().fetch_all(&self.pool).await?;
        let orders = rows
            .iter()
            .map(Self::row_to_order)
            .collect::<Result<Vec<_>>>()?;
        Ok(Page::new(orders, query.page, total_from(total)))
    }

    async fn cancel_order(&self, order: &Order, expected: OrderStatus) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        write_order_status(&mut tx, order, expected).await?;

        let mut items: Vec<_> = order.items().iter().collect();
        items.sort_by_key(|item| item.product_id);
        for item in items {
            // Products deleted since checkout are skipped. Stock saturates at
            // the largest value a product can hold.
            sqlx::query(
                "UPDATE products SET stock = LEAST(stock + $2, $4), updated_at = $3 WHERE id = $1",
            )
                .bind(item.product_id.as_uuid())
                .bind(i64::from(item.quantity))
                .bind(order.updated_at())
                .bind(i64::from(u32::MAX))
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn update_order(&self, order: &Order, expected: OrderStatus) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        write_order_status(&mut conn, order, expected).await
    }

    async fn order_stats(&self, user_id: Option<UserId>) -> Result<OrderStats> {
        let mut qb = QueryBuilder::new(
            "SELECT status, COUNT(*) AS count, \
             COALESCE(SUM(total_amount_cents), 0)::BIGINT AS revenue FROM orders",
        );
        if let Some(user_id) = user_id {
            qb.push(" WHERE user_id = ").push_bind(user_id.as_uuid());
        }
        qb.push(" GROUP BY status");

        let rows = qb.build().fetch_all(&self.pool).await?;
        let mut stats = OrderStats::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let status: OrderStatus = status
                .parse()
                .map_err(|_| StoreError::InvalidData(format!("unknown order status {status:?}")))?;
            let count: i64 = row.try_get("count")?;
            let revenue: i64 = row.try_get("revenue")?;
            stats.add(status, total_from(count), Money::from_cents(revenue));
        }
        Ok(stats)
    }
}
