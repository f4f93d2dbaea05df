use std::{sync::Arc, time::Instant};

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use metrics::{histogram, increment_counter};
use tracing::info;

use crate::{
    auth::AuthUser,
    error::AppError,
    extract::ApiPath,
    response::{created, message, ApiResponse, ApiResult},
    storage::{is_image, ImageStorage, UploadedImage},
    AppState,
};

fn storage(state: &AppState) -> Result<Arc<ImageStorage>, AppError> {
    state
        .storage
        .clone()
        .ok_or_else(|| AppError::Unavailable(String::from("Image storage is not configured")))
}

pub async fn upload(
    State(state): State<AppState>,
    auth: AuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<UploadedImage>>), AppError> {
    let storage = storage(&state)?;
    let max_bytes = state.config.upload_max_bytes;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::BadRequest(err.body_text()))?
    {
        if !matches!(field.name(), Some("image" | "file")) {
            continue;
        }

        let content_type = field.content_type().unwrap_or_default().to_string();
        if !is_image(&content_type) {
            return Err(AppError::BadRequest(String::from(
                "Only image files can be uploaded",
            )));
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();

        let bytes = field
            .bytes()
            .await
            .map_err(|err| AppError::BadRequest(err.body_text()))?;
        if bytes.is_empty() {
            return Err(AppError::BadRequest(String::from("Uploaded file is empty")));
        }
        if bytes.len() > max_bytes {
            return Err(AppError::BadRequest(format!(
                "File exceeds the {max_bytes} byte limit"
            )));
        }

        let start = Instant::now();
        let uploaded = storage
            .upload(bytes.to_vec(), file_name, &content_type)
            .await?;

        increment_counter!("weatherplaces_upload");
        histogram!("weatherplaces_upload_time", start.elapsed());
        info!(
            "user {} uploaded {} ({} bytes)",
            auth.id,
            uploaded.public_id,
            bytes.len()
        );

        return Ok(created(uploaded));
    }

    Err(AppError::BadRequest(String::from(
        "Missing `image` file field",
    )))
}

pub async fn remove(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(public_id): ApiPath<String>,
) -> ApiResult<()> {
    let storage = storage(&state)?;
    let public_id = public_id.trim_start_matches('/');
    if public_id.is_empty() {
        return Err(AppError::BadRequest(String::from("Missing image id")));
    }

    if !storage.delete(public_id).await? {
        return Err(AppError::not_found("Image"));
    }

    info!("user {} deleted image {public_id}", auth.id);
    Ok(message("Image deleted"))
}
