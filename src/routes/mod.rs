use axum::{
    extract::{DefaultBodyLimit, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{error::AppError, response::ApiResponse, util::Paging, AppState};

pub mod aqi;
pub mod auth;
pub mod places;
pub mod posts;
pub mod provinces;
pub mod search;
pub mod upload;
pub mod users;
pub mod weather;

/// `?page=&limit=` shared by every list endpoint.
#[derive(Debug, Default, Deserialize, Clone, Copy)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PageQuery {
    pub fn paging(self) -> Paging {
        Paging::new(self.page, self.limit)
    }
}

/// The full HTTP surface, minus `/metrics` which the binary mounts itself.
pub fn router(state: AppState) -> Router {
    // Leave room for the multipart framing around the file itself.
    let upload_limit = state.config.upload_max_bytes + 64 * 1024;

    let api = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        .route("/users", get(users::list))
        .route(
            "/users/:id",
            get(users::get).put(users::update).delete(users::remove),
        )
        .route("/users/:id/posts", get(users::posts))
        .route("/provinces", get(provinces::list).post(provinces::create))
        .route(
            "/provinces/:id",
            get(provinces::get)
                .put(provinces::update)
                .delete(provinces::remove),
        )
        .route("/provinces/:id/places", get(provinces::places))
        .route("/places", get(places::list).post(places::create))
        .route(
            "/places/:id",
            get(places::get).put(places::update).delete(places::remove),
        )
        .route("/posts", get(posts::list).post(posts::create))
        .route(
            "/posts/:id",
            get(posts::get).put(posts::update).delete(posts::remove),
        )
        .route("/weather", get(weather::latest))
        .route("/weather/province/:id", get(weather::province))
        .route("/weather/scores", get(weather::scores))
        .route("/weather/scores/:province_id", get(weather::score))
        .route("/weather/status", get(weather::status))
        .route("/weather/refresh", post(weather::refresh_all))
        .route("/weather/refresh/:province_id", post(weather::refresh_one))
        .route("/weather/scheduler/start", post(weather::start_scheduler))
        .route("/weather/scheduler/stop", post(weather::stop_scheduler))
        .route("/aqi", get(aqi::latest))
        .route("/aqi/province/:id", get(aqi::province))
        .route("/search", get(search::search))
        .route(
            "/upload",
            post(upload::upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/upload/*public_id", delete(upload::remove));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub database: &'static str,
}

async fn health(State(state): State<AppState>) -> Json<ApiResponse<Health>> {
    let database = match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => "up",
        Err(_) => "down",
    };

    Json(ApiResponse::data(Health {
        status: "ok",
        database,
    }))
}

/// Replaces the generic unique-violation message with one naming the clash.
fn conflict_on_duplicate(err: sqlx::Error, conflict: &str) -> AppError {
    match AppError::from(err) {
        AppError::Conflict(_) => AppError::Conflict(conflict.to_string()),
        other => other,
    }
}

async fn not_found() -> AppError {
    AppError::NotFound(String::from("Route not found"))
}
