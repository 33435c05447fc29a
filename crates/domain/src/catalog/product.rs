//! Catalog product record.

use chrono::{DateTime, Utc};
use common::ProductId;
use serde::{Deserialize, Serialize};

use super::{CatalogError, Rating, RatingSummary};
use crate::Money;

pub const MAX_NAME_LEN: usize = 200;
pub const MAX_DESCRIPTION_LEN: usize = 2000;
pub const MAX_BRAND_LEN: usize = 100;
/// Highest accepted unit price, 99,999,999.99.
pub const MAX_PRICE: Money = Money::from_cents(9_999_999_999);

/// Product category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ProductCategory {
    Electronics,
    Smartphones,
    Laptops,
    Tablets,
    Accessories,
    Audio,
    Gaming,
    #[default]
    Other,
}

impl ProductCategory {
    pub const ALL: [ProductCategory; 8] = [
        ProductCategory::Electronics,
        ProductCategory::Smartphones,
        ProductCategory::Laptops,
        ProductCategory::Tablets,
        ProductCategory::Accessories,
        ProductCategory::Audio,
        ProductCategory::Gaming,
        ProductCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductCategory::Electronics => "Electronics",
            ProductCategory::Smartphones => "Smartphones",
            ProductCategory::Laptops => "Laptops",
            ProductCategory::Tablets => "Tablets",
            ProductCategory::Accessories => "Accessories",
            ProductCategory::Audio => "Audio",
            ProductCategory::Gaming => "Gaming",
            ProductCategory::Other => "Other",
        }
    }
}

impl std::fmt::Display for ProductCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProductCategory {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProductCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| CatalogError::invalid("category", format!("unknown category {s:?}")))
    }
}

/// A product in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub category: ProductCategory,
    pub brand: Option<String>,
    /// Units available for sale. Unsigned, so it can never go negative.
    pub stock: u32,
    pub images: Vec<String>,
    pub rating: Rating,
    pub num_reviews: u32,
    pub featured: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when creating a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub price: Money,
    #[serde(default)]
    pub category: ProductCategory,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub stock: u32,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub featured: bool,
}

/// Partial update of a product; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Money>,
    pub category: Option<ProductCategory>,
    pub brand: Option<String>,
    pub stock: Option<u32>,
    pub images: Option<Vec<String>>,
    pub featured: Option<bool>,
}

impl Product {
    /// Creates a product after validating the supplied fields.
    pub fn create(new: NewProduct, now: DateTime<Utc>) -> Result<Self, CatalogError> {
        validate_name(&new.name)?;
        validate_description(&new.description)?;
        validate_price(new.price)?;
        if let Some(brand) = &new.brand {
            validate_brand(brand)?;
        }

        Ok(Self {
            id: ProductId::new(),
            name: new.name.trim().to_string(),
            description: new.description.trim().to_string(),
            price: new.price,
            category: new.category,
            brand: new.brand.map(|b| b.trim().to_string()),
            stock: new.stock,
            images: new.images,
            rating: Rating::default(),
            num_reviews: 0,
            featured: new.featured,
            created_at: now,
            updated_at: now,
        })
    }

    /// Applies a partial update. Nothing is changed if any field is invalid.
    pub fn apply_update(
        &mut self,
        update: ProductUpdate,
        now: DateTime<Utc>,
    ) -> Result<(), CatalogError> {
        if let Some(name) = &update.name {
            validate_name(name)?;
        }
        if let Some(description) = &update.description {
            validate_description(description)?;
        }
        if let Some(price) = update.price {
            validate_price(price)?;
        }
        if let Some(brand) = &update.brand {
            validate_brand(brand)?;
        }

        if let Some(name) = update.name {
            self.name = name.trim().to_string();
        }
        if let Some(description) = update.description {
            self.description = description.trim().to_string();
        }
        if let Some(price) = update.price {
            self.price = price;
        }
        if let Some(category) = update.category {
            self.category = category;
        }
        if let Some(brand) = update.brand {
            self.brand = Some(brand.trim().to_string());
        }
        if let Some(stock) = update.stock {
            self.stock = stock;
        }
        if let Some(images) = update.images {
            self.images = images;
        }
        if let Some(featured) = update.featured {
            self.featured = featured;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Returns true if at least `quantity` units are in stock.
    pub fn has_stock(&self, quantity: u32) -> bool {
        self.stock >= quantity
    }

    pub fn set_rating(&mut self, summary: RatingSummary) {
        self.rating = summary.rating;
        self.num_reviews = summary.num_reviews;
    }
}

fn validate_name(name: &str) -> Result<(), CatalogError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CatalogError::invalid("name", "Product name is required"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(CatalogError::invalid(
            "name",
            format!("Product name cannot exceed {MAX_NAME_LEN} characters"),
        ));
    }
    Ok(())
}

fn validate_description(description: &str) -> Result<(), CatalogError> {
    let description = description.trim();
    if description.is_empty() {
        return Err(CatalogError::invalid(
            "description",
            "Product description is required",
        ));
    }
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(CatalogError::invalid(
            "description",
            format!("Description cannot exceed {MAX_DESCRIPTION_LEN} characters"),
        ));
    }
    Ok(())
}

fn validate_price(price: Money) -> Result<(), CatalogError> {
    if price.is_negative() {
        return Err(CatalogError::invalid(
            "price",
            "Price must be a positive number",
        ));
    }
    if price > MAX_PRICE {
        return Err(CatalogError::invalid(
            "price",
            format!("Price cannot exceed {MAX_PRICE}"),
        ));
    }
    Ok(())
}

fn validate_brand(brand: &str) -> Result<(), CatalogError> {
    if brand.trim().chars().count() > MAX_BRAND_LEN {
        return Err(CatalogError::invalid(
            "brand",
            format!("Brand cannot exceed {MAX_BRAND_LEN} characters"),
        ));
    }
    Ok(())
}
