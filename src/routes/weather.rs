use std::time::Instant;

use axum::{extract::State, http::StatusCode, Json};
use metrics::{histogram, increment_counter};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    auth::AuthUser,
    entities::{Province, WeatherData, WeatherScore},
    error::AppError,
    extract::{ApiPath, ApiQuery},
    response::{ok, ApiResponse, ApiResult},
    util::{fetch_province, SCORE_SELECT, WEATHER_SELECT},
    weather::{scheduler::SchedulerStatus, ProvinceOutcome},
    AppState,
};

const DEFAULT_HISTORY: i64 = 24;
const MAX_HISTORY: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

impl HistoryQuery {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_HISTORY).clamp(1, MAX_HISTORY)
    }
}

#[derive(Debug, Serialize)]
pub struct ProvinceWeather {
    pub province: Province,
    pub latest: Option<WeatherData>,
    pub history: Vec<WeatherData>,
}

pub async fn latest(State(state): State<AppState>) -> ApiResult<Vec<WeatherData>> {
    let start = Instant::now();

    let weather = state
        .weather_caches
        .latest_weather
        .try_get_with((), async {
            increment_counter!("weatherplaces_weather_request_cache_miss");
            sqlx::query_as::<_, WeatherData>(&format!(
                "{WEATHER_SELECT}
                WHERE w.id IN (
                    SELECT DISTINCT ON (province_id) id FROM weather_data
                    ORDER BY province_id, observed_at DESC
                )
                ORDER BY pr.name ASC"
            ))
            .fetch_all(&state.pool)
            .await
        })
        .await?;

    histogram!("weatherplaces_query", start.elapsed(), "type" => "latest_weather");

    Ok(ok(weather))
}

pub async fn province(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i32>,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> ApiResult<ProvinceWeather> {
    let province = fetch_province(id, &state.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Province"))?;

    let history = sqlx::query_as::<_, WeatherData>(&format!(
        "{WEATHER_SELECT} WHERE w.province_id = $1 ORDER BY w.observed_at DESC LIMIT $2"
    ))
    .bind(id)
    .bind(query.limit())
    .fetch_all(&state.pool)
    .await?;

    Ok(ok(ProvinceWeather {
        province,
        latest: history.first().cloned(),
        history,
    }))
}

pub async fn scores(State(state): State<AppState>) -> ApiResult<Vec<WeatherScore>> {
    let scores = sqlx::query_as::<_, WeatherScore>(&format!(
        "{SCORE_SELECT} ORDER BY s.score DESC, pr.name ASC"
    ))
    .fetch_all(&state.pool)
    .await?;

    Ok(ok(scores))
}

pub async fn score(
    State(state): State<AppState>,
    ApiPath(province_id): ApiPath<i32>,
) -> ApiResult<WeatherScore> {
    let score = sqlx::query_as::<_, WeatherScore>(&format!("{SCORE_SELECT} WHERE s.province_id = $1"))
        .bind(province_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Weather score"))?;

    Ok(ok(score))
}

pub async fn status(State(state): State<AppState>) -> ApiResult<SchedulerStatus> {
    Ok(ok(state.scheduler.status().await))
}

/// Kicks off a full pass in the background and answers straight away.
pub async fn refresh_all(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<(StatusCode, Json<ApiResponse<()>>), AppError> {
    auth.require_admin()?;

    let claim = state.weather.claim_run()?;

    info!("manual weather refresh requested by {}", auth.username);
    tokio::spawn(async move {
        match claim.run().await {
            Ok(summary) => info!(
                "manual weather refresh finished: {}/{} provinces",
                summary.succeeded, summary.total
            ),
            Err(err) => warn!("manual weather refresh failed: {err}"),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::message("Weather refresh started")),
    ))
}

pub async fn refresh_one(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(province_id): ApiPath<i32>,
) -> ApiResult<ProvinceOutcome> {
    auth.require_admin()?;

    let outcome = state.weather.refresh_province(province_id).await?;
    let message = if outcome.succeeded() {
        "Province refreshed"
    } else {
        "Province refreshed with errors"
    };

    Ok(Json(ApiResponse::data(outcome).with_message(message)))
}

pub async fn start_scheduler(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<SchedulerStatus> {
    auth.require_admin()?;

    let message = if state.scheduler.start() {
        "Weather scheduler started"
    } else {
        "Weather scheduler is already running"
    };

    Ok(Json(
        ApiResponse::data(state.scheduler.status().await).with_message(message),
    ))
}

pub async fn stop_scheduler(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<SchedulerStatus> {
    auth.require_admin()?;

    let message = if state.scheduler.stop() {
        "Weather scheduler stopped"
    } else {
        "Weather scheduler was not running"
    };

    Ok(Json(
        ApiResponse::data(state.scheduler.status().await).with_message(message),
    ))
}
