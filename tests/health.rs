use std::time::Duration;

use axum::extract::State;
use foodgram_api::{config::AppConfig, routes::health::health_check, state::AppState};
use sqlx::postgres::PgPoolOptions;

fn offline_state() -> AppState {
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
        max_body_bytes: 1024,
    };
    AppState::new(pool, config)
}

#[tokio::test]
async fn health_check_reports_ok_even_when_database_is_down() {
    let response = health_check(State(offline_state())).await;
    assert_eq!(response.0.message, "Health check");

    let body = serde_json::to_value(&response.0).expect("serializable");
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["database"], "down");
}
