use std::time::Instant;

use axum::{extract::State, http::StatusCode, Json};
use metrics::{histogram, increment_counter};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{conflict_on_duplicate, PageQuery};
use crate::{
    auth::AuthUser,
    entities::{AqiData, Place, Province, WeatherData, WeatherScore},
    error::AppError,
    extract::{ApiPath, ApiQuery, ValidatedJson},
    response::{created, message, ok, ApiResponse, ApiResult, Page},
    util::{fetch_province, AQI_SELECT, PLACE_SELECT, SCORE_SELECT, WEATHER_SELECT},
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct ProvinceQuery {
    pub region: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProvinceRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 100))]
    pub name_local: Option<String>,
    #[validate(length(max = 50))]
    pub region: Option<String>,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: Option<f64>,
    pub description: Option<String>,
    #[validate(url)]
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProvinceRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(length(max = 100))]
    pub name_local: Option<String>,
    #[validate(length(max = 50))]
    pub region: Option<String>,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: Option<f64>,
    pub description: Option<String>,
    #[validate(url)]
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProvinceDetail {
    #[serde(flatten)]
    pub province: Province,
    pub place_count: i64,
    pub latest_weather: Option<WeatherData>,
    pub latest_aqi: Option<AqiData>,
    pub score: Option<WeatherScore>,
}

pub async fn list(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ProvinceQuery>,
) -> ApiResult<Vec<Province>> {
    increment_counter!("weatherplaces_provinces_request");
    let start = Instant::now();

    let provinces = state
        .province_cache
        .try_get_with((), async {
            increment_counter!("weatherplaces_provinces_request_cache_miss");
            sqlx::query_as::<_, Province>("SELECT * FROM provinces ORDER BY name ASC")
                .fetch_all(&state.pool)
                .await
        })
        .await?;

    let provinces = match query.region.as_deref().map(str::trim) {
        Some(region) if !region.is_empty() => provinces
            .into_iter()
            .filter(|p| {
                p.region
                    .as_deref()
                    .is_some_and(|r| r.eq_ignore_ascii_case(region))
            })
            .collect(),
        _ => provinces,
    };

    histogram!("weatherplaces_query", start.elapsed(), "type" => "provinces");

    Ok(ok(provinces))
}

pub async fn get(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i32>,
) -> ApiResult<ProvinceDetail> {
    let province = fetch_province(id, &state.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Province"))?;

    let (place_count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM places WHERE province_id = $1")
        .bind(id)
        .fetch_one(&state.pool)
        .await?;

    let latest_weather = sqlx::query_as::<_, WeatherData>(&format!(
        "{WEATHER_SELECT} WHERE w.province_id = $1 ORDER BY w.observed_at DESC LIMIT 1"
    ))
    .bind(id)
    .fetch_optional(&state.pool)
    .await?;

    let latest_aqi = sqlx::query_as::<_, AqiData>(&format!(
        "{AQI_SELECT} WHERE a.province_id = $1 ORDER BY a.observed_at DESC LIMIT 1"
    ))
    .bind(id)
    .fetch_optional(&state.pool)
    .await?;

    let score = sqlx::query_as::<_, WeatherScore>(&format!("{SCORE_SELECT} WHERE s.province_id = $1"))
        .bind(id)
        .fetch_optional(&state.pool)
        .await?;

    Ok(ok(ProvinceDetail {
        province,
        place_count,
        latest_weather,
        latest_aqi,
        score,
    }))
}

pub async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(payload): ValidatedJson<ProvinceRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Province>>), AppError> {
    auth.require_admin()?;

    let province = sqlx::query_as::<_, Province>(
        "INSERT INTO provinces (name, name_local, region, latitude, longitude, description, image_url)
        VALUES ($1,$2,$3,$4,$5,$6,$7)
        RETURNING *",
    )
    .bind(payload.name.trim())
    .bind(payload.name_local)
    .bind(payload.region)
    .bind(payload.latitude)
    .bind(payload.longitude)
    .bind(payload.description)
    .bind(payload.image_url)
    .fetch_one(&state.pool)
    .await
    .map_err(|err| conflict_on_duplicate(err, "A province with this name already exists"))?;

    state.province_cache.invalidate_all();

    Ok(created(province))
}

pub async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i32>,
    ValidatedJson(payload): ValidatedJson<UpdateProvinceRequest>,
) -> ApiResult<Province> {
    auth.require_admin()?;

    let province = sqlx::query_as::<_, Province>(
        "UPDATE provinces SET
            name = COALESCE($2, name),
            name_local = COALESCE($3, name_local),
            region = COALESCE($4, region),
            latitude = COALESCE($5, latitude),
            longitude = COALESCE($6, longitude),
            description = COALESCE($7, description),
            image_url = COALESCE($8, image_url),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *",
    )
    .bind(id)
    .bind(payload.name.as_deref().map(str::trim))
    .bind(payload.name_local)
    .bind(payload.region)
    .bind(payload.latitude)
    .bind(payload.longitude)
    .bind(payload.description)
    .bind(payload.image_url)
    .fetch_optional(&state.pool)
    .await
    .map_err(|err| conflict_on_duplicate(err, "A province with this name already exists"))?
    .ok_or_else(|| AppError::not_found("Province"))?;

    state.province_cache.invalidate_all();

    Ok(ok(province))
}

pub async fn remove(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i32>,
) -> ApiResult<()> {
    auth.require_admin()?;

    let deleted = sqlx::query("DELETE FROM provinces WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?
        .rows_affected();

    if deleted == 0 {
        return Err(AppError::not_found("Province"));
    }

    // observations cascade with the province
    state.province_cache.invalidate_all();
    state.weather_caches.invalidate();

    Ok(message("Province deleted"))
}

pub async fn places(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i32>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> ApiResult<Page<Place>> {
    if fetch_province(id, &state.pool).await?.is_none() {
        return Err(AppError::not_found("Province"));
    }
    let paging = query.paging();

    let places = sqlx::query_as::<_, Place>(&format!(
        "{PLACE_SELECT} WHERE p.province_id = $1 ORDER BY p.name ASC LIMIT $2 OFFSET $3"
    ))
    .bind(id)
    .bind(paging.limit)
    .bind(paging.offset())
    .fetch_all(&state.pool)
    .await?;

    let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM places WHERE province_id = $1")
        .bind(id)
        .fetch_one(&state.pool)
        .await?;

    Ok(ok(Page::new(places, paging.page, paging.limit, total)))
}
