//! Batch sync, change feed and realtime event endpoints.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header::AUTHORIZATION, HeaderMap},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, Stream};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use ledgerbox_core::sync::{BatchResult, ChangeFeed};

use crate::error::{ApiError, ApiResult};
use crate::main_lib::AppState;

const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
/// Shared bucket for requests whose credential did not resolve to a user.
const UNAUTHENTICATED_BUCKET: &str = "unauthenticated";
const SSE_KEEP_ALIVE_SECS: u64 = 15;

fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok())
}

/// Charges one request to `key`. Keys are user ids or the shared
/// unauthenticated bucket, so the limiter holds at most one entry per user.
async fn enforce_rate_limit(state: &AppState, key: &str) -> ApiResult<()> {
    let outcome = state
        .rate_limiter
        .check(key, state.rate_limit_per_minute, RATE_LIMIT_WINDOW)
        .await;
    if outcome.allowed {
        return Ok(());
    }
    let retry_after_secs = outcome
        .retry_after
        .map(|d| d.as_secs().max(1))
        .unwrap_or(RATE_LIMIT_WINDOW.as_secs());
    warn!(key, retry_after_secs, "batch sync rate limited");
    Err(ApiError::RateLimited { retry_after_secs })
}

async fn sync_batch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<BatchResult>> {
    let service = &state.batch_sync_service;
    let user_id = match service.authenticate(authorization(&headers)).await {
        Ok(user_id) => user_id,
        Err(err) => {
            enforce_rate_limit(&state, UNAUTHENTICATED_BUCKET).await?;
            return Err(err.into());
        }
    };
    enforce_rate_limit(&state, &format!("user:{user_id}")).await?;
    let result = service.process_body(&user_id, &body).await?;
    info!(
        total = result.total,
        success = result.success,
        failed = result.failed,
        "batch sync processed"
    );
    Ok(Json(result))
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

#[derive(Debug, Deserialize)]
struct ChangesQuery {
    since: Option<String>,
    limit: Option<i64>,
}

async fn sync_changes(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ChangesQuery>,
) -> ApiResult<Json<ChangeFeed>> {
    let feed = state
        .batch_sync_service
        .changes_since(authorization(&headers), query.since.as_deref(), query.limit)
        .await?;
    debug!(count = feed.changes.len(), "change feed served");
    Ok(Json(feed))
}

/// Streams the caller's own changes as `sync-change` server-sent events.
async fn sync_events(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let user_id = state
        .batch_sync_service
        .authenticate(authorization(&headers))
        .await?;
    let receiver = state.event_bus.subscribe();
    debug!(user = %user_id, "realtime subscriber connected");

    let events = stream::unfold((receiver, user_id), |(mut receiver, user_id)| async move {
        loop {
            match receiver.recv().await {
                Ok(change) if change.user_id == user_id => {
                    let Ok(data) = serde_json::to_string(&change) else {
                        continue;
                    };
                    let event = Event::default().event("sync-change").data(data);
                    return Some((Ok(event), (receiver, user_id)));
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "realtime subscriber lagged");
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Ok(Sse::new(events).keep_alive(
        KeepAlive::new().interval(Duration::from_secs(SSE_KEEP_ALIVE_SECS)),
    ))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/sync/batch",
            post(sync_batch).fallback(method_not_allowed),
        )
        .route("/sync/changes", get(sync_changes))
        .route("/sync/events", get(sync_events))
}
