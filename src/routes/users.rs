use axum::extract::State;
use serde::Deserialize;
use validator::Validate;

use super::PageQuery;
use crate::{
    auth::{AuthUser, ROLE_ADMIN, ROLE_USER},
    entities::{Post, User},
    error::AppError,
    extract::{ApiPath, ApiQuery, ValidatedJson},
    response::{message, ok, ApiResult, Page},
    util::{fetch_user, POST_SELECT},
    AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 100))]
    pub display_name: Option<String>,
    #[validate(url)]
    pub avatar_url: Option<String>,
    /// Only admins may change roles.
    pub role: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> ApiResult<Page<User>> {
    auth.require_admin()?;
    let paging = query.paging();

    let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY id ASC LIMIT $1 OFFSET $2")
        .bind(paging.limit)
        .bind(paging.offset())
        .fetch_all(&state.pool)
        .await?;

    let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(&state.pool)
        .await?;

    Ok(ok(Page::new(users, paging.page, paging.limit, total)))
}

pub async fn get(State(state): State<AppState>, ApiPath(id): ApiPath<i32>) -> ApiResult<User> {
    let user = fetch_user(id, &state.pool)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    Ok(ok(user))
}

pub async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i32>,
    ValidatedJson(payload): ValidatedJson<UpdateUserRequest>,
) -> ApiResult<User> {
    auth.require_owner_or_admin(Some(id))?;

    if let Some(role) = payload.role.as_deref() {
        auth.require_admin()?;
        if role != ROLE_ADMIN && role != ROLE_USER {
            return Err(AppError::BadRequest(format!("Unknown role `{role}`")));
        }
    }

    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET
            email = COALESCE($2, email),
            display_name = COALESCE($3, display_name),
            avatar_url = COALESCE($4, avatar_url),
            role = COALESCE($5, role),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *",
    )
    .bind(id)
    .bind(payload.email.map(|email| email.trim().to_lowercase()))
    .bind(payload.display_name)
    .bind(payload.avatar_url)
    .bind(payload.role)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::not_found("User"))?;

    Ok(ok(user))
}

pub async fn remove(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i32>,
) -> ApiResult<()> {
    auth.require_owner_or_admin(Some(id))?;

    let deleted = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?
        .rows_affected();

    if deleted == 0 {
        return Err(AppError::not_found("User"));
    }
    Ok(message("User deleted"))
}

pub async fn posts(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i32>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> ApiResult<Page<Post>> {
    if fetch_user(id, &state.pool).await?.is_none() {
        return Err(AppError::not_found("User"));
    }
    let paging = query.paging();

    let posts = sqlx::query_as::<_, Post>(&format!(
        "{POST_SELECT} WHERE po.user_id = $1 ORDER BY po.created_at DESC LIMIT $2 OFFSET $3"
    ))
    .bind(id)
    .bind(paging.limit)
    .bind(paging.offset())
    .fetch_all(&state.pool)
    .await?;

    let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts WHERE user_id = $1")
        .bind(id)
        .fetch_one(&state.pool)
        .await?;

    Ok(ok(Page::new(posts, paging.page, paging.limit, total)))
}
