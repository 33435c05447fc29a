//! Product reviews.

use chrono::{DateTime, Utc};
use common::{ProductId, ReviewId, UserId};
use serde::{Deserialize, Serialize};

use super::CatalogError;
use super::rating::{MAX_STARS, MIN_STARS};

pub const MAX_COMMENT_LEN: usize = 1000;

/// A user's review of a product. One per (product, user).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: ReviewId,
    pub product_id: ProductId,
    pub user_id: UserId,
    pub rating: u8,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Review {
    pub fn new(
        product_id: ProductId,
        user_id: UserId,
        rating: u8,
        comment: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, CatalogError> {
        validate(rating, comment)?;
        Ok(Self {
            id: ReviewId::new(),
            product_id,
            user_id,
            rating,
            comment: comment.trim().to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn edit(&mut self, rating: u8, comment: &str, now: DateTime<Utc>) -> Result<(), CatalogError> {
        validate(rating, comment)?;
        self.rating = rating;
        self.comment = comment.trim().to_string();
        self.updated_at = now;
        Ok(())
    }
}

fn validate(rating: u8, comment: &str) -> Result<(), CatalogError> {
    if !(MIN_STARS..=MAX_STARS).contains(&rating) {
        return Err(CatalogError::InvalidRating { rating });
    }
    let comment = comment.trim();
    if comment.is_empty() {
        return Err(CatalogError::invalid("comment", "Comment is required"));
    }
    if comment.chars().count() > MAX_COMMENT_LEN {
        return Err(CatalogError::invalid(
            "comment",
            format!("Comment cannot exceed {MAX_COMMENT_LEN} characters"),
        ));
    }
    Ok(())
}
