//! Tests over the fully assembled application router.
//!
//! Uses a lazily-connected pool, so no database is required: every request
//! exercised here is answered before a connection would be acquired.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use gatehouse_api::auth::jwt::{generate_access_token, JwtConfig};
use gatehouse_api::config::ServerConfig;
use gatehouse_api::router::build_app_router;
use gatehouse_api::state::AppState;
use gatehouse_api::watchlist::DisabledWatchlist;
use gatehouse_core::policy::PolicyConfig;

fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".into()],
        request_timeout_secs: 5,
        sweep_interval_secs: 60,
        notify_webhook_url: None,
        watchlist_url: None,
        jwt: JwtConfig {
            secret: "routing-test-secret".into(),
            access_token_expiry_mins: 15,
        },
        policy: PolicyConfig::default(),
    }
}

fn test_app(config: &ServerConfig) -> axum::Router {
    let pool = gatehouse_db::DbPool::connect_lazy("postgres://gatehouse@localhost/gatehouse")
        .expect("Failed to build lazy pool");
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        event_bus: Arc::new(gatehouse_events::EventBus::default()),
        watchlist: Arc::new(DisabledWatchlist),
    };
    build_app_router(state, config)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_served_alongside_the_api_routes() {
    let config = test_config();
    let app = test_app(&config);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn visit_routes_require_a_bearer_token() {
    let config = test_config();
    let app = test_app(&config);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/visits")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn create_rejects_an_unknown_visit_type_before_touching_the_pool() {
    let config = test_config();
    let app = test_app(&config);
    let token = generate_access_token(11, "employee", "Asha Rao", &config.jwt).unwrap();

    let body = serde_json::json!({
        "visitor_id": 1,
        "host_name": "Asha Rao",
        "visit_type": "wormhole",
        "expected_arrival": "2026-03-10T12:00:00Z",
    });
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/visits")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
}
