//! User accounts and credential rules.

mod user;
pub mod validation;

pub use user::{Address, ProfileUpdate, PublicUser, Role, User};

use thiserror::Error;

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum AccountError {
    /// A user-supplied field failed validation.
    #[error("{message}")]
    InvalidField { field: &'static str, message: String },
}

impl AccountError {
    pub(crate) fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        AccountError::InvalidField {
            field,
            message: message.into(),
        }
    }

    /// Name of the offending field, for field-level error reporting.
    pub fn field(&self) -> &'static str {
        match self {
            AccountError::InvalidField { field, .. } => field,
        }
    }
}
