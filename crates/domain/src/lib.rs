//! Domain layer for the commerce backend.
//!
//! This crate holds the business rules, free of any I/O:
//! - `Money` fixed-point arithmetic
//! - Catalog products, reviews and rating averages
//! - The cart aggregate with its derived total
//! - The order aggregate, its status machine and checkout pricing
//! - User accounts and credential rules

pub mod account;
pub mod cart;
pub mod catalog;
pub mod money;
pub mod order;

pub use account::{AccountError, Address, ProfileUpdate, PublicUser, Role, User};
pub use cart::{Cart, CartError, CartItem};
pub use catalog::{
    CatalogError, MAX_PRICE, NewProduct, Product, ProductCategory, ProductUpdate, Rating,
    RatingSummary, Review,
};
pub use money::{Money, ParseMoneyError};
pub use order::{
    Order, OrderError, OrderItem, OrderNumber, OrderStatus, PaymentStatus, PriceBreakdown,
    PricingPolicy, ShippingInfo,
};
