//! Service error types.

use domain::{AccountError, CartError, CatalogError, OrderError};
use serde::Serialize;
use store::StoreError;
use thiserror::Error;

/// One field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors that can occur in the service layer.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The requested entity does not exist, or is not visible to the caller.
    #[error("{0}")]
    NotFound(String),

    /// Current stock cannot cover the requested quantity.
    #[error("{0}")]
    InsufficientStock(String),

    /// A request argument is malformed.
    #[error("{0}")]
    InvalidArgument(String),

    /// One or more fields failed validation.
    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    /// The entity is not in a state that allows the operation.
    #[error("{0}")]
    InvalidState(String),

    /// Missing or bad credentials.
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated, but not allowed.
    #[error("{0}")]
    Forbidden(String),

    /// A uniqueness rule was violated.
    #[error("{0}")]
    Conflict(String),

    /// The store failed.
    #[error("Store error: {0}")]
    Store(StoreError),

    /// Something else went wrong that the caller cannot fix.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Single-field validation failure.
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        ServiceError::Validation(vec![FieldError::new(field, message)])
    }

    /// Stable numeric code, matching the HTTP status the error maps to.
    pub fn code(&self) -> u16 {
        match self {
            ServiceError::NotFound(_) => 404,
            ServiceError::InsufficientStock(_)
            | ServiceError::InvalidArgument(_)
            | ServiceError::Validation(_)
            | ServiceError::InvalidState(_) => 400,
            ServiceError::Unauthorized(_) => 401,
            ServiceError::Forbidden(_) => 403,
            ServiceError::Conflict(_) => 409,
            ServiceError::Store(_) | ServiceError::Internal(_) => 500,
        }
    }

    /// Field-level failures, empty for every other kind.
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            ServiceError::Validation(errors) => errors,
            _ => &[],
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.code() >= 500
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { entity, .. } => {
                ServiceError::NotFound(format!("{} not found", capitalize(entity)))
            }
            StoreError::Conflict(message) => ServiceError::Conflict(message),
            StoreError::InsufficientStock { product_id } => {
                ServiceError::InsufficientStock(format!("Insufficient stock for product {product_id}"))
            }
            StoreError::ConcurrencyConflict { .. } => {
                ServiceError::InvalidState("Order was modified concurrently".to_string())
            }
            other => ServiceError::Store(other),
        }
    }
}

impl From<OrderError> for ServiceError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::EmptyCart | OrderError::InvalidState { .. } => {
                ServiceError::InvalidState(e.to_string())
            }
            OrderError::ProductNotFound { .. } => {
                ServiceError::NotFound("Product not found".to_string())
            }
            OrderError::InsufficientStock { .. } => ServiceError::InsufficientStock(e.to_string()),
            OrderError::AmountTooLarge => ServiceError::InvalidArgument(e.to_string()),
            OrderError::UnknownStatus(_) => ServiceError::invalid_field("status", e.to_string()),
            OrderError::UnknownPaymentStatus(_) => {
                ServiceError::invalid_field("paymentStatus", e.to_string())
            }
        }
    }
}

impl From<CartError> for ServiceError {
    fn from(e: CartError) -> Self {
        match e {
            CartError::InvalidQuantity => ServiceError::invalid_field("quantity", e.to_string()),
            CartError::InsufficientStock { .. } => ServiceError::InsufficientStock(e.to_string()),
            CartError::ItemNotFound { .. } => ServiceError::NotFound(e.to_string()),
            CartError::AmountTooLarge => ServiceError::InvalidArgument(e.to_string()),
        }
    }
}

impl From<CatalogError> for ServiceError {
    fn from(e: CatalogError) -> Self {
        ServiceError::invalid_field(e.field(), e.to_string())
    }
}

impl From<AccountError> for ServiceError {
    fn from(e: AccountError) -> Self {
        ServiceError::invalid_field(e.field(), e.to_string())
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Convenience type alias for service results.
pub type Result<T> = std::result::Result<T, ServiceError>;
