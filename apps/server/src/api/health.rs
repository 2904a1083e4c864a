use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

use crate::main_lib::AppState;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    database: &'static str,
}

async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let pool = state.pool.clone();
    let db_ok = matches!(
        tokio::task::spawn_blocking(move || ledgerbox_storage_sqlite::db::ping(&pool)).await,
        Ok(Ok(()))
    );

    if db_ok {
        (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                database: "ok",
            }),
        )
    } else {
        tracing::warn!("health check: database unavailable");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "degraded",
                database: "unavailable",
            }),
        )
    }
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}
