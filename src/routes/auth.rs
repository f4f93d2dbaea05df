use axum::{extract::State, http::StatusCode, Json};
use color_eyre::eyre::eyre;
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use crate::{
    auth::{hash_password, verify_password, AuthUser, ROLE_USER},
    entities::User,
    error::AppError,
    extract::ValidatedJson,
    response::{created, ok, ApiResponse, ApiResult},
    util::fetch_user,
    AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 50))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[validate(length(max = 100))]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    /// Username or email.
    #[serde(alias = "username", alias = "email")]
    #[validate(length(min = 1))]
    pub login: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AuthResponse>>), AppError> {
    let username = payload.username.trim().to_string();
    let email = payload.email.trim().to_lowercase();

    let taken: Option<(i32,)> =
        sqlx::query_as("SELECT id FROM users WHERE username = $1 OR email = $2")
            .bind(&username)
            .bind(&email)
            .fetch_optional(&state.pool)
            .await?;
    if taken.is_some() {
        return Err(AppError::Conflict(String::from(
            "Username or email already registered",
        )));
    }

    let password_hash = hash_password(payload.password).await?;

    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (username, email, password_hash, display_name, role)
        VALUES ($1,$2,$3,$4,$5)
        RETURNING *",
    )
    .bind(&username)
    .bind(&email)
    .bind(password_hash)
    .bind(payload.display_name)
    .bind(ROLE_USER)
    .fetch_one(&state.pool)
    .await?;

    info!("registered user {} ({})", user.username, user.id);

    let token = issue_token(&state, &user)?;
    Ok(created(AuthResponse { token, user }))
}

pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<LoginRequest>,
) -> ApiResult<AuthResponse> {
    let login = payload.login.trim();

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1 OR email = $2")
        .bind(login)
        .bind(login.to_lowercase())
        .fetch_optional(&state.pool)
        .await?;

    let invalid = || AppError::Unauthorized(String::from("Invalid credentials"));
    let user = user.ok_or_else(invalid)?;

    if !verify_password(payload.password, user.password_hash.clone()).await? {
        return Err(invalid());
    }

    let token = issue_token(&state, &user)?;
    Ok(ok(AuthResponse { token, user }))
}

pub async fn me(State(state): State<AppState>, auth: AuthUser) -> ApiResult<User> {
    let user = fetch_user(auth.id, &state.pool)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    Ok(ok(user))
}

fn issue_token(state: &AppState, user: &User) -> Result<String, AppError> {
    state
        .jwt
        .issue(user)
        .map_err(|err| AppError::Internal(eyre!("failed to sign token: {err}")))
}
