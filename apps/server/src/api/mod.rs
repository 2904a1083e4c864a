mod health;
mod sync;

use std::sync::Arc;

use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tower_http::LatencyUnit;
use tracing::Level;

use crate::config::Config;
use crate::main_lib::AppState;

pub fn app_router(state: Arc<AppState>, config: &Config) -> Router {
    let trace = TraceLayer::new_for_http()
        .make_span_with(|request: &axum::http::Request<_>| {
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri()
            )
        })
        .on_response(
            DefaultOnResponse::new()
                .level(Level::INFO)
                .latency_unit(LatencyUnit::Millis),
        );

    Router::new()
        .nest("/api", api_routes())
        .with_state(state)
        .layer(trace)
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(RequestBodyLimitLayer::new(config.body_limit_bytes))
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new().merge(sync::router()).merge(health::router())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::main_lib::build_state;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use axum::response::Response;
    use futures::StreamExt;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        token: String,
        _dir: TempDir,
    }

    async fn setup(rate_limit_per_minute: u64) -> TestApp {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = Config::from_lookup(|_| None).expect("default config");
        config.data_dir = dir.path().to_string_lossy().to_string();
        config.rate_limit_per_minute = rate_limit_per_minute;

        let state = build_state(&config).expect("state");
        let token = state
            .sessions
            .create_session("alice", chrono::Duration::hours(1))
            .await
            .expect("session")
            .token;
        TestApp {
            router: app_router(state, &config),
            token,
            _dir: dir,
        }
    }

    fn batch_request(token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/api/sync/batch")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(Method::GET).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn batch_then_change_feed_round_trip() {
        let app = setup(0).await;
        let response = app
            .router
            .clone()
            .oneshot(batch_request(
                Some(&app.token),
                json!({ "items": [
                    { "entityType": "receipt", "entityId": "r1", "operation": "create",
                      "data": { "merchantName": "Maxi", "totalAmount": 1250.5, "date": "2026-01-31" } },
                    { "entityType": "device", "entityId": "d1", "operation": "create",
                      "data": { "brand": "Acme" } },
                    { "entityType": "spaceship", "entityId": "s1", "operation": "create", "data": {} }
                ]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let result = body_json(response).await;
        assert_eq!(result["total"], 3);
        assert_eq!(result["success"], 1);
        assert_eq!(result["failed"], 2);
        assert_eq!(
            result["errors"][1],
            "spaceship/s1: Unsupported entity type: spaceship"
        );

        let response = app
            .router
            .clone()
            .oneshot(get("/api/sync/changes", Some(&app.token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let feed = body_json(response).await;
        let changes = feed["changes"].as_array().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0]["entityType"], "receipt");
        assert_eq!(changes[0]["data"]["merchantName"], "Maxi");
        let updated_at = changes[0]["updatedAt"].as_str().unwrap();
        assert_eq!(feed["cursor"], format!("{updated_at}|receipt|r1"));

        let response = app
            .router
            .clone()
            .oneshot(get(
                &format!(
                    "/api/sync/changes?since={}",
                    feed["cursor"].as_str().unwrap().replace('|', "%7C")
                ),
                Some(&app.token),
            ))
            .await
            .unwrap();
        let next = body_json(response).await;
        assert_eq!(next["changes"], json!([]));
        assert_eq!(next["cursor"], feed["cursor"]);
    }

    #[tokio::test]
    async fn missing_or_unknown_token_is_unauthorized() {
        let app = setup(0).await;
        for token in [None, Some("not-a-session")] {
            let response = app
                .router
                .clone()
                .oneshot(batch_request(token, json!({ "items": [] })))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(
                body_json(response).await,
                json!({ "success": false, "error": "Unauthorized" })
            );
        }
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let app = setup(0).await;
        let response = app
            .router
            .clone()
            .oneshot(batch_request(Some(&app.token), json!({ "records": [] })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({ "success": false, "error": "Invalid request format - items array required" })
        );
    }

    #[tokio::test]
    async fn non_post_batch_is_method_not_allowed() {
        let app = setup(0).await;
        let response = app
            .router
            .clone()
            .oneshot(get("/api/sync/batch", Some(&app.token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body_json(response).await["success"], false);
    }

    #[tokio::test]
    async fn rate_limit_returns_retry_after() {
        let app = setup(1).await;
        let first = app
            .router
            .clone()
            .oneshot(batch_request(Some(&app.token), json!({ "items": [] })))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .router
            .clone()
            .oneshot(batch_request(Some(&app.token), json!({ "items": [] })))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().contains_key(header::RETRY_AFTER));
    }

    #[tokio::test]
    async fn rotating_bad_tokens_share_one_bucket() {
        let app = setup(1).await;
        let first = app
            .router
            .clone()
            .oneshot(batch_request(Some("garbage-1"), json!({ "items": [] })))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::UNAUTHORIZED);

        let second = app
            .router
            .clone()
            .oneshot(batch_request(Some("garbage-2"), json!({ "items": [] })))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);

        // The signed-in user keeps their own budget.
        let own = app
            .router
            .clone()
            .oneshot(batch_request(Some(&app.token), json!({ "items": [] })))
            .await
            .unwrap();
        assert_eq!(own.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn bad_since_cursor_is_bad_request() {
        let app = setup(0).await;
        let response = app
            .router
            .clone()
            .oneshot(get("/api/sync/changes?since=yesterday", Some(&app.token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["error"],
            "Invalid since cursor: yesterday"
        );
    }

    #[tokio::test]
    async fn health_reports_database() {
        let app = setup(0).await;
        let response = app
            .router
            .clone()
            .oneshot(get("/api/health", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({ "status": "ok", "database": "ok" })
        );
    }

    #[tokio::test]
    async fn events_stream_the_callers_changes() {
        let app = setup(0).await;
        let unauthorized = app
            .router
            .clone()
            .oneshot(get("/api/sync/events", None))
            .await
            .unwrap();
        assert_eq!(unauthorized.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .router
            .clone()
            .oneshot(get("/api/sync/events", Some(&app.token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let mut frames = response.into_body().into_data_stream();

        let batch = app
            .router
            .clone()
            .oneshot(batch_request(
                Some(&app.token),
                json!({ "items": [
                    { "entityType": "reminder", "entityId": "rem1", "operation": "create",
                      "data": { "reminderType": "warranty", "reminderDate": "2026-03-01" } }
                ]}),
            ))
            .await
            .unwrap();
        assert_eq!(batch.status(), StatusCode::OK);

        let frame = tokio::time::timeout(Duration::from_secs(5), frames.next())
            .await
            .expect("event before timeout")
            .expect("stream open")
            .expect("frame");
        let text = String::from_utf8(frame.to_vec()).unwrap();
        assert!(text.starts_with("event: sync-change"), "{text}");
        assert!(text.contains("\"entityId\":\"rem1\""), "{text}");
        assert!(text.contains("\"userId\":\"alice\""), "{text}");
    }
}
