use axum::{http::StatusCode, Json};
use serde::Serialize;

/// The `{success, data|message|error}` envelope every endpoint answers with.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, crate::error::AppError>;

impl<T: Serialize> ApiResponse<T> {
    pub const fn data(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            error: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>, error: Option<serde_json::Value>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
            error,
        }
    }
}

pub fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse::data(data))
}

pub fn created<T: Serialize>(data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::CREATED, Json(ApiResponse::data(data)))
}

pub fn message(message: impl Into<String>) -> Json<ApiResponse<()>> {
    Json(ApiResponse::message(message))
}

/// One page of a list endpoint.
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, page: i64, limit: i64, total: i64) -> Self {
        let total_pages = if limit > 0 {
            (total + limit - 1) / limit
        } else {
            0
        };
        Self {
            items,
            page,
            limit,
            total,
            total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn data_envelope_skips_empty_fields() {
        let body = serde_json::to_value(ApiResponse::data(vec![1, 2])).unwrap();
        assert_eq!(body, json!({"success": true, "data": [1, 2]}));
    }

    #[test]
    fn failure_envelope_carries_message_and_details() {
        let body = serde_json::to_value(ApiResponse::failure(
            "Validation failed",
            Some(json!({"name": ["length"]})),
        ))
        .unwrap();
        assert_eq!(
            body,
            json!({"success": false, "message": "Validation failed", "error": {"name": ["length"]}})
        );
    }

    #[test]
    fn page_rounds_total_pages_up() {
        let page = Page::new(vec!["a"; 20], 1, 20, 41);
        assert_eq!(page.total_pages, 3);
        assert_eq!(Page::<u8>::new(vec![], 1, 20, 0).total_pages, 0);
    }
}
