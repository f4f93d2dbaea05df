use std::sync::Arc;

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use color_eyre::eyre::eyre;
use tracing::error;
use validator::ValidationErrors;

use crate::{response::ApiResponse, storage::StorageError, weather::IngestError};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Validation failed")]
    Validation(#[from] ValidationErrors),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Upstream(String),
    #[error("database error: {0}")]
    Database(sqlx::Error),
    #[error("{0}")]
    Internal(color_eyre::Report),
}

impl AppError {
    pub fn not_found(what: &str) -> Self {
        Self::NotFound(format!("{what} not found"))
    }

    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let body = match self {
            Self::Validation(errors) => {
                ApiResponse::failure("Validation failed", serde_json::to_value(&errors).ok())
            }
            Self::Database(err) => {
                error!("database error: {err}");
                ApiResponse::failure("Something went wrong", None)
            }
            Self::Internal(err) => {
                error!("internal error: {err:?}");
                ApiResponse::failure("Something went wrong", None)
            }
            other => ApiResponse::failure(other.to_string(), None),
        };

        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if matches!(err, sqlx::Error::RowNotFound) {
            return Self::NotFound(String::from("Resource not found"));
        }

        let code = match &err {
            sqlx::Error::Database(db) => db.code().map(|code| code.into_owned()),
            _ => None,
        };

        match code.as_deref() {
            Some("23505") => Self::Conflict(String::from("Resource already exists")),
            Some("23503") => Self::BadRequest(String::from("Referenced resource does not exist")),
            _ => Self::Database(err),
        }
    }
}

// moka hands back loader errors behind an Arc.
impl From<Arc<sqlx::Error>> for AppError {
    fn from(err: Arc<sqlx::Error>) -> Self {
        Self::Internal(eyre!("{err}"))
    }
}

impl From<color_eyre::Report> for AppError {
    fn from(err: color_eyre::Report) -> Self {
        Self::Internal(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(_: jsonwebtoken::errors::Error) -> Self {
        Self::Unauthorized(String::from("Invalid or expired token"))
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::AlreadyRunning => Self::Conflict(err.to_string()),
            IngestError::UnknownProvince(_) => Self::not_found("Province"),
            IngestError::Database(err) => err.into(),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Http(err) => {
                error!("image storage request failed: {err}");
                Self::Upstream(String::from("Image storage is unreachable"))
            }
            StorageError::Rejected(message) => Self::Upstream(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use validator::Validate;

    async fn body_json(err: AppError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[derive(Validate)]
    struct Named {
        #[validate(length(min = 1))]
        name: String,
    }

    #[tokio::test]
    async fn not_found_renders_envelope() {
        let (status, body) = body_json(AppError::not_found("Place")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Place not found");
    }

    #[tokio::test]
    async fn validation_errors_list_fields() {
        let errors = Named {
            name: String::new(),
        }
        .validate()
        .unwrap_err();
        let (status, body) = body_json(errors.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Validation failed");
        assert!(body["error"].get("name").is_some());
    }

    #[tokio::test]
    async fn internal_errors_hide_details() {
        let (status, body) = body_json(AppError::Internal(eyre!("pool exploded"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Something went wrong");
    }

    #[test]
    fn row_not_found_maps_to_404() {
        assert_eq!(
            AppError::from(sqlx::Error::RowNotFound).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn ingestion_errors_map_to_http_statuses() {
        assert_eq!(
            AppError::from(IngestError::AlreadyRunning).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(IngestError::UnknownProvince(7)).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(StorageError::Rejected(String::from("Invalid signature"))).status(),
            StatusCode::BAD_GATEWAY
        );
    }
}
