//! Product catalog: products, reviews and rating maintenance.

mod product;
mod rating;
mod review;

pub use product::{MAX_PRICE, NewProduct, Product, ProductCategory, ProductUpdate};
pub use rating::{MAX_STARS, MIN_STARS, Rating, RatingSummary};
pub use review::Review;

use thiserror::Error;

/// Errors that can occur during catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A review rating outside 1..=5.
    #[error("Rating must be between {MIN_STARS} and {MAX_STARS}, got {rating}")]
    InvalidRating { rating: u8 },

    /// A product or review field failed validation.
    #[error("{message}")]
    InvalidField { field: &'static str, message: String },
}

impl CatalogError {
    pub(crate) fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        CatalogError::InvalidField {
            field,
            message: message.into(),
        }
    }

    /// Name of the offending field, for field-level error reporting.
    pub fn field(&self) -> &'static str {
        match self {
            CatalogError::InvalidRating { .. } => "rating",
            CatalogError::InvalidField { field, .. } => field,
        }
    }
}
