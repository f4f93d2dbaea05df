use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;
use weatherplaces::{
    auth::{JwtKeys, ROLE_ADMIN, ROLE_USER},
    config::Config,
    entities::User,
    routes, AppState,
};

const SECRET: &str = "integration-secret";

fn config() -> Config {
    Config::from_lookup(|key: &str| match key {
        "DATABASE_URL" => Some(String::from("postgres://localhost/weatherplaces_test")),
        "JWT_SECRET" => Some(String::from(SECRET)),
        _ => None,
    })
    .unwrap()
}

// Nothing below reaches the database: every request is decided by routing,
// extraction or authorization first.
fn app() -> (Router, AppState) {
    let config = config();
    let pool = PgPoolOptions::new()
        .connect_lazy(&config.database_url)
        .unwrap();
    let state = AppState::with_pool(config, pool).unwrap();
    (routes::router(state.clone()), state)
}

fn token(id: i32, role: &str) -> String {
    let user = User {
        id,
        username: format!("user{id}"),
        email: format!("user{id}@example.com"),
        password_hash: String::new(),
        display_name: None,
        avatar_url: None,
        role: role.to_string(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    JwtKeys::new(SECRET, 1).issue(&user).unwrap()
}

fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn creating_a_place_requires_a_token() {
    let (app, _) = app();
    let (status, body) = send(
        app,
        request(
            Method::POST,
            "/api/places",
            None,
            Some(json!({"province_id": 1, "name": "Doi Suthep"})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Missing bearer token");
}

#[tokio::test]
async fn forged_tokens_are_rejected() {
    let (app, _) = app();
    let forged = {
        let user = User {
            id: 1,
            username: String::from("mallory"),
            email: String::from("m@example.com"),
            password_hash: String::new(),
            display_name: None,
            avatar_url: None,
            role: ROLE_ADMIN.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        JwtKeys::new("some-other-secret", 1).issue(&user).unwrap()
    };

    let (status, body) = send(
        app,
        request(Method::GET, "/api/auth/me", Some(&forged), None),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid or expired token");
}

#[tokio::test]
async fn province_writes_are_admin_only() {
    let (app, _) = app();
    let (status, body) = send(
        app,
        request(
            Method::POST,
            "/api/provinces",
            Some(&token(5, ROLE_USER)),
            Some(json!({"name": "Atlantis"})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Admin access required");
}

#[tokio::test]
async fn weather_refresh_is_admin_only() {
    let (app, _) = app();
    let (status, _) = send(
        app,
        request(
            Method::POST,
            "/api/weather/refresh",
            Some(&token(5, ROLE_USER)),
            None,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn users_cannot_edit_someone_else() {
    let (app, _) = app();
    let (status, _) = send(
        app,
        request(
            Method::PUT,
            "/api/users/2",
            Some(&token(1, ROLE_USER)),
            Some(json!({"display_name": "not me"})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn register_validates_its_payload() {
    let (app, _) = app();
    let (status, body) = send(
        app,
        request(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({"username": "ab", "email": "not-an-email", "password": "short"})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Validation failed");
    assert!(body["error"].get("username").is_some());
    assert!(body["error"].get("email").is_some());
    assert!(body["error"].get("password").is_some());
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let (app, _) = app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn search_needs_a_query() {
    let (app, _) = app();
    let (status, body) = send(app.clone(), request(Method::GET, "/api/search", None, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = send(
        app,
        request(Method::GET, "/api/search?q=%20%20", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn search_rejects_unknown_types() {
    let (app, _) = app();
    let (status, _) = send(
        app,
        request(Method::GET, "/api/search?q=beach&type=restaurants", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn non_numeric_ids_are_rejected() {
    let (app, _) = app();
    let (status, body) = send(app, request(Method::GET, "/api/places/abc", None, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn unknown_routes_answer_with_the_envelope() {
    let (app, _) = app();
    let (status, body) = send(app, request(Method::GET, "/api/nowhere", None, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Route not found");
}

#[tokio::test]
async fn uploads_need_configured_storage() {
    let (app, _) = app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/upload")
        .header(header::AUTHORIZATION, format!("Bearer {}", token(3, ROLE_USER)))
        .header(
            header::CONTENT_TYPE,
            "multipart/form-data; boundary=X-BOUNDARY",
        )
        .body(Body::from("--X-BOUNDARY--\r\n"))
        .unwrap();

    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["message"], "Image storage is not configured");
}

#[tokio::test]
async fn weather_status_reports_an_idle_scheduler() {
    let (app, _) = app();
    let (status, body) = send(app, request(Method::GET, "/api/weather/status", None, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["scheduled"], false);
    assert_eq!(body["data"]["running"], false);
    assert_eq!(body["data"]["current_interval_secs"], 1800);
}

#[tokio::test]
async fn admins_can_start_and_stop_the_scheduler() {
    let (app, state) = app();
    let admin = token(1, ROLE_ADMIN);

    let (status, body) = send(
        app.clone(),
        request(Method::POST, "/api/weather/scheduler/start", Some(&admin), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Weather scheduler started");
    assert_eq!(body["data"]["scheduled"], true);

    let (_, body) = send(
        app.clone(),
        request(Method::POST, "/api/weather/scheduler/start", Some(&admin), None),
    )
    .await;
    assert_eq!(body["message"], "Weather scheduler is already running");

    let (status, body) = send(
        app,
        request(Method::POST, "/api/weather/scheduler/stop", Some(&admin), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Weather scheduler stopped");
    assert!(!state.scheduler.is_scheduled());
}

#[tokio::test]
async fn refresh_is_refused_while_a_pass_holds_the_flag() {
    let (app, state) = app();
    let admin = token(1, ROLE_ADMIN);
    let claim = state.weather.claim_run().unwrap();

    let (status, body) = send(
        app.clone(),
        request(Method::POST, "/api/weather/refresh", Some(&admin), None),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "an ingestion pass is already running");

    drop(claim);
    let (_, body) = send(app, request(Method::GET, "/api/weather/status", None, None)).await;
    assert_eq!(body["data"]["running"], false);
}
