//! Order aggregate and related types.

mod aggregate;
mod pricing;
mod state;
mod value_objects;

pub use aggregate::Order;
pub use pricing::{PriceBreakdown, PricingPolicy};
pub use state::{OrderStatus, PaymentStatus};
pub use value_objects::{OrderItem, OrderNumber, ShippingInfo};

use common::ProductId;
use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Checkout was attempted on a cart without items.
    #[error("Cart is empty")]
    EmptyCart,

    /// A cart line references a product that no longer exists.
    #[error("Product {product_id} not found")]
    ProductNotFound { product_id: ProductId },

    /// Current stock cannot cover a cart line.
    #[error("Insufficient stock for {product_name}")]
    InsufficientStock {
        product_id: ProductId,
        product_name: String,
        available: u32,
        requested: u32,
    },

    /// Order is not in a status that allows the action.
    #[error("Cannot {action} order with status {status}")]
    InvalidState {
        status: OrderStatus,
        action: &'static str,
    },

    /// An order amount does not fit in a money value.
    #[error("Order total is too large")]
    AmountTooLarge,

    #[error("Invalid order status: {0}")]
    UnknownStatus(String),

    #[error("Invalid payment status: {0}")]
    UnknownPaymentStatus(String),
}
