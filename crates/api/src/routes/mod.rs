//! Route handlers, one module per resource.

pub mod auth;
pub mod cart;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod products;
pub mod users;

use std::str::FromStr;

use common::{MAX_LIMIT, PageRequest};
use serde::Deserialize;
use services::FieldError;

use crate::error::ApiError;

/// `page` and `limit` query parameters, kept as text so bad values are
/// reported per field.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<String>,
    pub limit: Option<String>,
}

/// Collects field errors while parsing query parameters.
#[derive(Default)]
pub(crate) struct QueryFields {
    errors: Vec<FieldError>,
}

impl QueryFields {
    /// Parses an optional parameter, recording `message` against `field`
    /// when it does not parse.
    pub fn parse<T: FromStr>(
        &mut self,
        field: &str,
        value: Option<&str>,
        message: &str,
    ) -> Option<T> {
        let value = value.map(str::trim).filter(|v| !v.is_empty())?;
        match value.parse() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                self.errors.push(FieldError::new(field, message));
                None
            }
        }
    }

    pub fn reject(&mut self, field: &str, message: &str) {
        self.errors.push(FieldError::new(field, message));
    }

    pub fn page(&mut self, params: &PageParams) -> PageRequest {
        let defaults = PageRequest::default();

        let page = self
            .parse::<u32>("page", params.page.as_deref(), "Page must be a positive integer")
            .unwrap_or(defaults.page);
        if page < 1 {
            self.reject("page", "Page must be a positive integer");
        }

        let limit = self
            .parse::<u32>("limit", params.limit.as_deref(), "Limit must be between 1 and 100")
            .unwrap_or(defaults.limit);
        if !(1..=MAX_LIMIT).contains(&limit) {
            self.reject("limit", "Limit must be between 1 and 100");
        }

        PageRequest::new(page, limit)
    }

    pub fn finish(self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::BadRequest {
                message: "Validation failed".to_string(),
                errors: self.errors,
            })
        }
    }
}

/// Parses a plain pagination query.
pub(crate) fn page_request(params: &PageParams) -> Result<PageRequest, ApiError> {
    let mut fields = QueryFields::default();
    let page = fields.page(params);
    fields.finish()?;
    Ok(page)
}
