mod api;
mod config;
mod error;
mod events;
mod logging;
mod main_lib;
mod rate_limit;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::net::TcpListener;

use crate::config::Config;
use crate::main_lib::{build_state, AppState};

const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);
const DEFAULT_SESSION_TTL_DAYS: i64 = 30;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    logging::init(config.log_format);

    let state = build_state(&config)?;

    // `ledgerbox-server issue-session <user-id> [ttl-days]` prints a bearer token.
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.first().map(String::as_str) == Some("issue-session") {
        return issue_session(&state, &args[1..]).await;
    }

    spawn_session_purge(state.clone());
    let router = api::app_router(state, &config);
    serve(config.listen_addr, router).await
}

async fn issue_session(state: &AppState, args: &[String]) -> Result<()> {
    let user_id = args
        .first()
        .ok_or_else(|| anyhow!("usage: ledgerbox-server issue-session <user-id> [ttl-days]"))?;
    let ttl_days = match args.get(1) {
        Some(raw) => raw
            .parse::<i64>()
            .with_context(|| format!("Invalid ttl-days '{}'", raw))?,
        None => DEFAULT_SESSION_TTL_DAYS,
    };
    let session = state
        .sessions
        .create_session(user_id, chrono::Duration::days(ttl_days))
        .await
        .context("Failed to create session")?;
    tracing::info!(
        session = %session.session_id,
        user = %session.user_id,
        expires_at = %session.expires_at,
        "session issued"
    );
    println!("{}", session.token);
    Ok(())
}

fn spawn_session_purge(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            match state.sessions.purge_expired(chrono::Utc::now()).await {
                Ok(0) => {}
                Ok(purged) => tracing::info!(purged, "expired sessions purged"),
                Err(e) => tracing::warn!(error = %e, "session purge failed"),
            }
        }
    });
}

async fn serve(addr: SocketAddr, router: axum::Router) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("shutdown requested");
    }
}
