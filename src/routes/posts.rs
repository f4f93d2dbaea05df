use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use validator::Validate;

use crate::{
    auth::AuthUser,
    entities::Post,
    error::AppError,
    extract::{ApiPath, ApiQuery, ValidatedJson},
    response::{created, message, ok, ApiResponse, ApiResult, Page},
    util::{fetch_place, fetch_post, Paging, POST_SELECT},
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct PostQuery {
    pub place_id: Option<i32>,
    pub user_id: Option<i32>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PostRequest {
    pub place_id: Option<i32>,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 10000))]
    pub content: String,
    #[validate(url)]
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePostRequest {
    pub place_id: Option<i32>,
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 10000))]
    pub content: Option<String>,
    #[validate(url)]
    pub image_url: Option<String>,
}

async fn ensure_place(place_id: Option<i32>, state: &AppState) -> Result<(), AppError> {
    match place_id {
        Some(id) if fetch_place(id, &state.pool).await?.is_none() => {
            Err(AppError::not_found("Place"))
        }
        _ => Ok(()),
    }
}

pub async fn list(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PostQuery>,
) -> ApiResult<Page<Post>> {
    let paging = Paging::new(query.page, query.limit);

    let posts = sqlx::query_as::<_, Post>(&format!(
        "{POST_SELECT}
        WHERE ($1::INTEGER IS NULL OR po.place_id = $1)
            AND ($2::INTEGER IS NULL OR po.user_id = $2)
        ORDER BY po.created_at DESC, po.id DESC
        LIMIT $3 OFFSET $4"
    ))
    .bind(query.place_id)
    .bind(query.user_id)
    .bind(paging.limit)
    .bind(paging.offset())
    .fetch_all(&state.pool)
    .await?;

    let (total,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM posts po
        WHERE ($1::INTEGER IS NULL OR po.place_id = $1)
            AND ($2::INTEGER IS NULL OR po.user_id = $2)",
    )
    .bind(query.place_id)
    .bind(query.user_id)
    .fetch_one(&state.pool)
    .await?;

    Ok(ok(Page::new(posts, paging.page, paging.limit, total)))
}

pub async fn get(State(state): State<AppState>, ApiPath(id): ApiPath<i32>) -> ApiResult<Post> {
    let post = fetch_post(id, &state.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Post"))?;
    Ok(ok(post))
}

pub async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(payload): ValidatedJson<PostRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Post>>), AppError> {
    ensure_place(payload.place_id, &state).await?;

    let (id,): (i32,) = sqlx::query_as(
        "INSERT INTO posts (user_id, place_id, title, content, image_url)
        VALUES ($1,$2,$3,$4,$5)
        RETURNING id",
    )
    .bind(auth.id)
    .bind(payload.place_id)
    .bind(payload.title.trim())
    .bind(payload.content)
    .bind(payload.image_url)
    .fetch_one(&state.pool)
    .await?;

    let post = fetch_post(id, &state.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Post"))?;
    Ok(created(post))
}

pub async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i32>,
    ValidatedJson(payload): ValidatedJson<UpdatePostRequest>,
) -> ApiResult<Post> {
    let existing = fetch_post(id, &state.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Post"))?;
    auth.require_owner_or_admin(Some(existing.user_id))?;
    ensure_place(payload.place_id, &state).await?;

    sqlx::query(
        "UPDATE posts SET
            place_id = COALESCE($2, place_id),
            title = COALESCE($3, title),
            content = COALESCE($4, content),
            image_url = COALESCE($5, image_url),
            updated_at = NOW()
        WHERE id = $1",
    )
    .bind(id)
    .bind(payload.place_id)
    .bind(payload.title.as_deref().map(str::trim))
    .bind(payload.content)
    .bind(payload.image_url)
    .execute(&state.pool)
    .await?;

    let post = fetch_post(id, &state.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Post"))?;
    Ok(ok(post))
}

pub async fn remove(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i32>,
) -> ApiResult<()> {
    let existing = fetch_post(id, &state.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Post"))?;
    auth.require_owner_or_admin(Some(existing.user_id))?;

    sqlx::query("DELETE FROM posts WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    Ok(message("Post deleted"))
}
