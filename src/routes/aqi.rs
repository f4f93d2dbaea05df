use std::time::Instant;

use axum::extract::State;
use metrics::{histogram, increment_counter};
use serde::Serialize;

use super::weather::HistoryQuery;
use crate::{
    entities::{AqiData, Province},
    error::AppError,
    extract::{ApiPath, ApiQuery},
    response::{ok, ApiResult},
    util::{fetch_province, AQI_SELECT},
    weather::score::aqi_category,
    AppState,
};

/// A stored reading with its US EPA category label.
#[derive(Debug, Serialize)]
pub struct AqiView {
    #[serde(flatten)]
    pub reading: AqiData,
    pub category: &'static str,
}

impl From<AqiData> for AqiView {
    fn from(reading: AqiData) -> Self {
        Self {
            category: aqi_category(reading.aqi),
            reading,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProvinceAqi {
    pub province: Province,
    pub latest: Option<AqiView>,
    pub history: Vec<AqiView>,
}

pub async fn latest(State(state): State<AppState>) -> ApiResult<Vec<AqiView>> {
    let start = Instant::now();

    let readings = state
        .weather_caches
        .latest_aqi
        .try_get_with((), async {
            increment_counter!("weatherplaces_aqi_request_cache_miss");
            sqlx::query_as::<_, AqiData>(&format!(
                "{AQI_SELECT}
                WHERE a.id IN (
                    SELECT DISTINCT ON (province_id) id FROM aqi_data
                    ORDER BY province_id, observed_at DESC
                )
                ORDER BY pr.name ASC"
            ))
            .fetch_all(&state.pool)
            .await
        })
        .await?;

    histogram!("weatherplaces_query", start.elapsed(), "type" => "latest_aqi");

    Ok(ok(readings.into_iter().map(AqiView::from).collect()))
}

pub async fn province(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i32>,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> ApiResult<ProvinceAqi> {
    let province = fetch_province(id, &state.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Province"))?;

    let history = sqlx::query_as::<_, AqiData>(&format!(
        "{AQI_SELECT} WHERE a.province_id = $1 ORDER BY a.observed_at DESC LIMIT $2"
    ))
    .bind(id)
    .bind(query.limit())
    .fetch_all(&state.pool)
    .await?;

    let latest = history.first().cloned().map(AqiView::from);

    Ok(ok(ProvinceAqi {
        province,
        latest,
        history: history.into_iter().map(AqiView::from).collect(),
    }))
}
