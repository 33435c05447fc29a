//! Catalog service: products and reviews.

use chrono::Utc;
use common::{Page, ProductId, ReviewId, UserId};
use domain::{NewProduct, Product, ProductUpdate, Review};
use store::{ProductQuery, Store};

use crate::error::{Result, ServiceError};

/// Service for browsing and curating the product catalog.
pub struct CatalogService<S: Store> {
    store: S,
}

impl<S: Store> CatalogService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_products(&self, query: ProductQuery) -> Result<Page<Product>> {
        if let (Some(min), Some(max)) = (query.min_price, query.max_price) {
            if min > max {
                return Err(ServiceError::invalid_field(
                    "minPrice",
                    "minPrice must not exceed maxPrice",
                ));
            }
        }
        Ok(self.store.query_products(query).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_product(&self, id: ProductId) -> Result<Product> {
        self.store
            .get_product(id)
            .await?
            .ok_or_else(product_not_found)
    }

    #[tracing::instrument(skip(self, new), fields(name = %new.name))]
    pub async fn create_product(&self, new: NewProduct) -> Result<Product> {
        let product = Product::create(new, Utc::now())?;
        self.store.insert_product(&product).await?;
        tracing::info!(product_id = %product.id, "product created");
        Ok(product)
    }

    /// Applies a partial update. Stock is only written when the update sets
    /// it, and then only if nothing (a checkout or a cancel) touched the
    /// product since it was read here; otherwise `Conflict`.
    #[tracing::instrument(skip(self, update))]
    pub async fn update_product(&self, id: ProductId, update: ProductUpdate) -> Result<Product> {
        let mut product = self.get_product(id).await?;
        let stock_read_at = update.stock.is_some().then_some(product.updated_at);
        product.apply_update(update, Utc::now())?;
        Ok(self.store.update_product(&product, stock_read_at).await?)
    }

    /// Deletes a product along with its reviews.
    #[tracing::instrument(skip(self))]
    pub async fn delete_product(&self, id: ProductId) -> Result<()> {
        if !self.store.delete_product(id).await? {
            return Err(product_not_found());
        }
        tracing::info!(product_id = %id, "product deleted");
        Ok(())
    }

    /// Lists a product's reviews, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_reviews(&self, product_id: ProductId) -> Result<Vec<Review>> {
        self.get_product(product_id).await?;
        Ok(self.store.list_reviews(product_id).await?)
    }

    #[tracing::instrument(skip(self, comment))]
    pub async fn add_review(
        &self,
        product_id: ProductId,
        user_id: UserId,
        rating: u8,
        comment: &str,
    ) -> Result<Review> {
        self.get_product(product_id).await?;
        let review = Review::new(product_id, user_id, rating, comment, Utc::now())?;
        self.store.insert_review(&review).await?;
        self.store.refresh_product_rating(product_id).await?;
        Ok(review)
    }

    #[tracing::instrument(skip(self, comment))]
    pub async fn update_review(
        &self,
        review_id: ReviewId,
        user_id: UserId,
        rating: u8,
        comment: &str,
    ) -> Result<Review> {
        let mut review = self.own_review(review_id, user_id).await?;
        review.edit(rating, comment, Utc::now())?;
        self.store.update_review(&review).await?;
        self.store.refresh_product_rating(review.product_id).await?;
        Ok(review)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_review(&self, review_id: ReviewId, user_id: UserId) -> Result<()> {
        let review = self.own_review(review_id, user_id).await?;
        self.store.delete_review(review.id).await?;
        self.store.refresh_product_rating(review.product_id).await?;
        Ok(())
    }

    /// A review the caller wrote. Other users' reviews read as missing.
    async fn own_review(&self, review_id: ReviewId, user_id: UserId) -> Result<Review> {
        self.store
            .get_review(review_id)
            .await?
            .filter(|review| review.user_id == user_id)
            .ok_or_else(|| ServiceError::NotFound("Review not found".to_string()))
    }
}

fn product_not_found() -> ServiceError {
    ServiceError::NotFound("Product not found".to_string())
}
