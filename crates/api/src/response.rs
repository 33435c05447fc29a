//! Success envelope shared by every route.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::Page;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ApiError;

/// Success contract: `{statusCode, data, message}`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    status_code: u16,
    data: T,
    message: &'static str,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T, message: &'static str) -> Self {
        Self {
            status_code: StatusCode::OK.as_u16(),
            data,
            message,
        }
    }

    pub fn created(data: T, message: &'static str) -> Self {
        Self {
            status_code: StatusCode::CREATED.as_u16(),
            data,
            message,
        }
    }
}

impl ApiResponse<()> {
    /// A response whose `data` is `null`.
    pub fn empty(message: &'static str) -> Self {
        Self::ok((), message)
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::OK);
        (status, Json(self)).into_response()
    }
}

/// Renders a page as `{<key>: [...], pagination: {...}}`.
pub fn listing<T: Serialize>(key: &str, page: Page<T>) -> Result<Value, ApiError> {
    let mut body = Map::new();
    body.insert(key.to_string(), serde_json::to_value(page.items)?);
    body.insert("pagination".to_string(), serde_json::to_value(page.pagination)?);
    Ok(Value::Object(body))
}

#[cfg(test)]
mod tests {
    use common::PageRequest;

    use super::*;

    #[test]
    fn listing_names_the_collection() {
        let page = Page::new(vec!["a", "b"], PageRequest::new(1, 2), 5);
        let body = listing("products", page).unwrap();

        assert_eq!(body["products"], serde_json::json!(["a", "b"]));
        assert_eq!(body["pagination"]["total"], 5);
        assert_eq!(body["pagination"]["pages"], 3);
    }

    #[test]
    fn empty_response_has_null_data() {
        let body = serde_json::to_value(ApiResponse::empty("Cart cleared successfully")).unwrap();
        assert_eq!(body["data"], Value::Null);
        assert_eq!(body["statusCode"], 200);
    }
}
