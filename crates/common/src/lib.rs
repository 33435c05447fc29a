//! Shared types for the commerce backend.

pub mod ids;
pub mod pagination;

pub use ids::{CartId, CartItemId, OrderId, ProductId, ReviewId, UserId};
pub use pagination::{DEFAULT_LIMIT, MAX_LIMIT, Page, PageRequest, Pagination};
