//! Catalog and review endpoints.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::routing::{get, put};
use common::{ProductId, ReviewId};
use domain::{Money, NewProduct, Product, ProductCategory, ProductUpdate, Review};
use serde::Deserialize;
use serde_json::Value;
use store::{ProductQuery, ProductSort, SortOrder, Store};

use crate::error::ApiError;
use crate::extract::{AdminUser, ApiJson, ApiPath, ApiQuery, AuthUser};
use crate::response::{ApiResponse, listing};
use crate::routes::{PageParams, QueryFields};
use crate::state::AppState;

pub fn router<S: Store + Clone + 'static>() -> Router<Arc<AppState<S>>> {
    Router::new()
        .route("/", get(list::<S>).post(create::<S>))
        .route(
            "/{id}",
            get(get_product::<S>)
                .put(update::<S>)
                .delete(delete::<S>),
        )
        .route("/{id}/reviews", get(reviews::<S>).post(add_review::<S>))
        .route(
            "/reviews/{review_id}",
            put(update_review::<S>).delete(delete_review::<S>),
        )
}

// -- Request types --

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListProductsParams {
    pub category: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub search: Option<String>,
    pub featured: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl ListProductsParams {
    fn into_query(self) -> Result<ProductQuery, ApiError> {
        let mut fields = QueryFields::default();
        let mut query = ProductQuery::new().page(fields.page(&PageParams {
            page: self.page,
            limit: self.limit,
        }));

        query.category = fields.parse::<ProductCategory>(
            "category",
            self.category.as_deref(),
            "Invalid category",
        );
        query.min_price = fields.parse::<Money>(
            "minPrice",
            self.min_price.as_deref(),
            "Minimum price must be a positive number",
        );
        query.max_price = fields.parse::<Money>(
            "maxPrice",
            self.max_price.as_deref(),
            "Maximum price must be a positive number",
        );
        if query.min_price.is_some_and(|p| p.is_negative()) {
            fields.reject("minPrice", "Minimum price must be a positive number");
        }
        if query.max_price.is_some_and(|p| p.is_negative()) {
            fields.reject("maxPrice", "Maximum price must be a positive number");
        }
        query.featured =
            fields.parse::<bool>("featured", self.featured.as_deref(), "Featured must be a boolean");
        query.search = self
            .search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let sort_by = fields
            .parse::<ProductSort>("sortBy", self.sort_by.as_deref(), "Invalid sort field")
            .unwrap_or_default();
        let sort_order = fields
            .parse::<SortOrder>(
                "sortOrder",
                self.sort_order.map(|s| s.to_lowercase()).as_deref(),
                "Sort order must be ASC or DESC",
            )
            .unwrap_or_default();
        query = query.sort(sort_by, sort_order);

        fields.finish()?;
        Ok(query)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReviewRequest {
    pub rating: Option<i64>,
    pub comment: String,
}

impl ReviewRequest {
    fn rating(&self) -> Result<u8, ApiError> {
        let rating = self
            .rating
            .ok_or_else(|| ApiError::bad_request("rating", "Rating is required"))?;
        u8::try_from(rating)
            .map_err(|_| ApiError::bad_request("rating", "Rating must be between 1 and 5"))
    }
}

// -- Handlers --

/// GET /api/products: filtered, sorted, paginated listing.
#[tracing::instrument(skip_all)]
pub async fn list<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    ApiQuery(params): ApiQuery<ListProductsParams>,
) -> Result<ApiResponse<Value>, ApiError> {
    let query = params.into_query()?;
    let products = state.catalog.list_products(query).await?;
    Ok(ApiResponse::ok(
        listing("products", products)?,
        "Products retrieved successfully",
    ))
}

/// GET /api/products/{id}
#[tracing::instrument(skip(state))]
pub async fn get_product<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    ApiPath(id): ApiPath<ProductId>,
) -> Result<ApiResponse<Product>, ApiError> {
    let product = state.catalog.get_product(id).await?;
    Ok(ApiResponse::ok(product, "Product retrieved successfully"))
}

/// POST /api/products
#[tracing::instrument(skip_all)]
pub async fn create<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    ApiJson(new): ApiJson<NewProduct>,
) -> Result<ApiResponse<Product>, ApiError> {
    let product = state.catalog.create_product(new).await?;
    Ok(ApiResponse::created(product, "Product created successfully"))
}

/// PUT /api/products/{id}
#[tracing::instrument(skip(state, _admin, update))]
pub async fn update<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<ProductId>,
    ApiJson(update): ApiJson<ProductUpdate>,
) -> Result<ApiResponse<Product>, ApiError> {
    let product = state.catalog.update_product(id, update).await?;
    Ok(ApiResponse::ok(product, "Product updated successfully"))
}

/// DELETE /api/products/{id}
#[tracing::instrument(skip(state, _admin))]
pub async fn delete<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<ProductId>,
) -> Result<ApiResponse<()>, ApiError> {
    state.catalog.delete_product(id).await?;
    Ok(ApiResponse::empty("Product deleted successfully"))
}

/// GET /api/products/{id}/reviews
#[tracing::instrument(skip(state))]
pub async fn reviews<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    ApiPath(id): ApiPath<ProductId>,
) -> Result<ApiResponse<Vec<Review>>, ApiError> {
    let reviews = state.catalog.list_reviews(id).await?;
    Ok(ApiResponse::ok(reviews, "Reviews retrieved successfully"))
}

/// POST /api/products/{id}/reviews
#[tracing::instrument(skip(state, identity, req))]
pub async fn add_review<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(identity): AuthUser,
    ApiPath(id): ApiPath<ProductId>,
    ApiJson(req): ApiJson<ReviewRequest>,
) -> Result<ApiResponse<Review>, ApiError> {
    let review = state
        .catalog
        .add_review(id, identity.user_id, req.rating()?, &req.comment)
        .await?;
    Ok(ApiResponse::created(review, "Review added successfully"))
}

/// PUT /api/products/reviews/{review_id}: authors only.
#[tracing::instrument(skip(state, identity, req))]
pub async fn update_review<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(identity): AuthUser,
    ApiPath(review_id): ApiPath<ReviewId>,
    ApiJson(req): ApiJson<ReviewRequest>,
) -> Result<ApiResponse<Review>, ApiError> {
    let review = state
        .catalog
        .update_review(review_id, identity.user_id, req.rating()?, &req.comment)
        .await?;
    Ok(ApiResponse::ok(review, "Review updated successfully"))
}

/// DELETE /api/products/reviews/{review_id}: authors only.
#[tracing::instrument(skip(state, identity))]
pub async fn delete_review<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(identity): AuthUser,
    ApiPath(review_id): ApiPath<ReviewId>,
) -> Result<ApiResponse<()>, ApiError> {
    state
        .catalog
        .delete_review(review_id, identity.user_id)
        .await?;
    Ok(ApiResponse::empty("Review deleted successfully"))
}
