use std::time::Instant;

use axum::extract::State;
use metrics::histogram;
use serde::{Deserialize, Serialize};

use crate::{
    entities::{Place, Post, Province},
    error::AppError,
    extract::ApiQuery,
    response::{ok, ApiResult},
    util::{like_pattern, PLACE_SELECT, POST_SELECT},
    AppState,
};

const RESULTS_PER_KIND: i64 = 20;

#[derive(Debug, Default, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    #[default]
    All,
    Places,
    Provinces,
    Posts,
}

impl SearchKind {
    const fn includes(self, kind: Self) -> bool {
        matches!(self, Self::All) || self as u8 == kind as u8
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: SearchKind,
}

#[derive(Debug, Default, Serialize)]
pub struct SearchResults {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub places: Option<Vec<Place>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provinces: Option<Vec<Province>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub posts: Option<Vec<Post>>,
}

pub async fn search(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> ApiResult<SearchResults> {
    let term = query
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| AppError::BadRequest(String::from("Search query `q` is required")))?;

    let start = Instant::now();
    let pattern = like_pattern(term);
    let mut results = SearchResults {
        query: term.to_string(),
        ..SearchResults::default()
    };

    if query.kind.includes(SearchKind::Places) {
        results.places = Some(
            sqlx::query_as::<_, Place>(&format!(
                "{PLACE_SELECT}
                WHERE p.name ILIKE $1 OR p.description ILIKE $1 OR p.category ILIKE $1
                ORDER BY p.name ASC LIMIT $2"
            ))
            .bind(&pattern)
            .bind(RESULTS_PER_KIND)
            .fetch_all(&state.pool)
            .await?,
        );
    }

    if query.kind.includes(SearchKind::Provinces) {
        results.provinces = Some(
            sqlx::query_as::<_, Province>(
                "SELECT * FROM provinces
                WHERE name ILIKE $1 OR name_local ILIKE $1 OR region ILIKE $1
                ORDER BY name ASC LIMIT $2",
            )
            .bind(&pattern)
            .bind(RESULTS_PER_KIND)
            .fetch_all(&state.pool)
            .await?,
        );
    }

    if query.kind.includes(SearchKind::Posts) {
        results.posts = Some(
            sqlx::query_as::<_, Post>(&format!(
                "{POST_SELECT}
                WHERE po.title ILIKE $1 OR po.content ILIKE $1
                ORDER BY po.created_at DESC LIMIT $2"
            ))
            .bind(&pattern)
            .bind(RESULTS_PER_KIND)
            .fetch_all(&state.pool)
            .await?,
        );
    }

    histogram!("weatherplaces_query", start.elapsed(), "type" => "search");

    Ok(ok(results))
}
