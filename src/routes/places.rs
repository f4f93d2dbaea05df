use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use super::conflict_on_duplicate;
use crate::{
    auth::AuthUser,
    entities::Place,
    error::AppError,
    extract::{ApiPath, ApiQuery, ValidatedJson},
    response::{created, message, ok, ApiResponse, ApiResult, Page},
    util::{fetch_place, fetch_province, Paging, PLACE_SELECT},
    AppState,
};

const DUPLICATE_PLACE: &str = "A place with this name already exists in the province";

#[derive(Debug, Deserialize)]
pub struct PlaceQuery {
    pub province_id: Option<i32>,
    pub category: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PlaceRequest {
    pub province_id: i32,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub description: Option<String>,
    #[validate(length(max = 50))]
    pub category: Option<String>,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: Option<f64>,
    #[validate(url)]
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePlaceRequest {
    pub province_id: Option<i32>,
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(length(max = 50))]
    pub category: Option<String>,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: Option<f64>,
    #[validate(url)]
    pub image_url: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PlaceQuery>,
) -> ApiResult<Page<Place>> {
    let paging = Paging::new(query.page, query.limit);
    let category = query
        .category
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());

    let places = sqlx::query_as::<_, Place>(&format!(
        "{PLACE_SELECT}
        WHERE ($1::INTEGER IS NULL OR p.province_id = $1)
            AND ($2::TEXT IS NULL OR LOWER(p.category) = LOWER($2))
        ORDER BY p.created_at DESC, p.id DESC
        LIMIT $3 OFFSET $4"
    ))
    .bind(query.province_id)
    .bind(category.as_deref())
    .bind(paging.limit)
    .bind(paging.offset())
    .fetch_all(&state.pool)
    .await?;

    let (total,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM places p
        WHERE ($1::INTEGER IS NULL OR p.province_id = $1)
            AND ($2::TEXT IS NULL OR LOWER(p.category) = LOWER($2))",
    )
    .bind(query.province_id)
    .bind(category.as_deref())
    .fetch_one(&state.pool)
    .await?;

    Ok(ok(Page::new(places, paging.page, paging.limit, total)))
}

pub async fn get(State(state): State<AppState>, ApiPath(id): ApiPath<i32>) -> ApiResult<Place> {
    let place = fetch_place(id, &state.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Place"))?;
    Ok(ok(place))
}

pub async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(payload): ValidatedJson<PlaceRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Place>>), AppError> {
    if fetch_province(payload.province_id, &state.pool)
        .await?
        .is_none()
    {
        return Err(AppError::not_found("Province"));
    }

    let (id,): (i32,) = sqlx::query_as(
        "INSERT INTO places (province_id, name, description, category, latitude, longitude, image_url, created_by)
        VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
        RETURNING id",
    )
    .bind(payload.province_id)
    .bind(payload.name.trim())
    .bind(payload.description)
    .bind(payload.category)
    .bind(payload.latitude)
    .bind(payload.longitude)
    .bind(payload.image_url)
    .bind(auth.id)
    .fetch_one(&state.pool)
    .await
    .map_err(|err| conflict_on_duplicate(err, DUPLICATE_PLACE))?;

    info!("user {} created place {id}", auth.id);

    let place = fetch_place(id, &state.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Place"))?;
    Ok(created(place))
}

pub async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i32>,
    ValidatedJson(payload): ValidatedJson<UpdatePlaceRequest>,
) -> ApiResult<Place> {
    let existing = fetch_place(id, &state.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Place"))?;
    auth.require_owner_or_admin(existing.created_by)?;

    if let Some(province_id) = payload.province_id {
        if fetch_province(province_id, &state.pool).await?.is_none() {
            return Err(AppError::not_found("Province"));
        }
    }

    sqlx::query(
        "UPDATE places SET
            province_id = COALESCE($2, province_id),
            name = COALESCE($3, name),
            description = COALESCE($4, description),
            category = COALESCE($5, category),
            latitude = COALESCE($6, latitude),
            longitude = COALESCE($7, longitude),
            image_url = COALESCE($8, image_url),
            updated_at = NOW()
        WHERE id = $1",
    )
    .bind(id)
    .bind(payload.province_id)
    .bind(payload.name.as_deref().map(str::trim))
    .bind(payload.description)
    .bind(payload.category)
    .bind(payload.latitude)
    .bind(payload.longitude)
    .bind(payload.image_url)
    .execute(&state.pool)
    .await
    .map_err(|err| conflict_on_duplicate(err, DUPLICATE_PLACE))?;

    let place = fetch_place(id, &state.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Place"))?;
    Ok(ok(place))
}

pub async fn remove(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i32>,
) -> ApiResult<()> {
    let existing = fetch_place(id, &state.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Place"))?;
    auth.require_owner_or_admin(existing.created_by)?;

    sqlx::query("DELETE FROM places WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    info!("user {} deleted place {id}", auth.id);
    Ok(message("Place deleted"))
}
