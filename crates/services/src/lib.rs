//! Application services for the commerce backend.
//!
//! Each service wraps a [`store::Store`] and applies the domain rules:
//! - `CartService`: per-user carts checked against live stock
//! - `CheckoutService`: all-or-nothing checkout and the order lifecycle
//! - `CatalogService`: products, reviews and rating upkeep
//! - `AccountService`: profiles and user administration
//! - `AuthService`: registration, login, token rotation, password resets

pub mod account;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod error;

pub use account::AccountService;
pub use auth::{
    Argon2PasswordService, AuthService, AuthSession, Claims, Identity, JwtTokenService,
    PasswordService, Registration, TokenKind, TokenPair, TokenService,
};
pub use cart::{CartLineView, CartService, CartView};
pub use catalog::CatalogService;
pub use checkout::{CheckoutService, MAX_ORDER_NUMBER_ATTEMPTS, validate_shipping};
pub use error::{FieldError, Result, ServiceError};
