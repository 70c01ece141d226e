use std::time::Duration;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use foodgram_api::{config::AppConfig, routes::create_api_router, state::AppState};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

// The pool never connects: every request here must be answered before
// touching the database.
fn app() -> Router {
    let pool = PgPoolOptions::new()
        .acquire_timeout(Duration::from_millis(300))
        .connect_lazy("postgres://foodgram@127.0.0.1:1/foodgram")
        .expect("lazy pool");
    let config = AppConfig {
        database_url: String::new(),
        host: "127.0.0.1".into(),
        port: 0,
        media_root: std::env::temp_dir(),
        shopping_list_filename: "shopping_list.txt".into(),
        max_body_bytes: 1024 * 1024,
    };
    Router::new()
        .nest("/api", create_api_router())
        .with_state(AppState::new(pool, config))
}

async fn send(method: Method, uri: &str, auth: Option<&str>) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(value) = auth {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    let response = app()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[tokio::test]
async fn membership_endpoints_require_a_token() {
    let (status, body) = send(Method::POST, "/api/recipes/1/favorite", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["data"]["error"], "Authentication required");

    let (status, _) = send(Method::DELETE, "/api/recipes/1/shopping_cart", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn shopping_list_download_requires_a_token() {
    let (status, _) = send(Method::GET, "/api/recipes/download_shopping_cart", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unsupported_auth_scheme_is_rejected() {
    let (status, _) = send(Method::GET, "/api/users/me", Some("Basic YWRtaW46YWRtaW4=")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(Method::POST, "/api/users/2/subscribe", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(Method::POST, "/api/users/set_password", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_routes_are_not_found() {
    let (status, _) = send(Method::GET, "/api/recipes/1/comments", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
