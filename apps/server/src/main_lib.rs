use std::sync::Arc;

use anyhow::{Context, Result};

use ledgerbox_core::auth::TokenVerifier;
use ledgerbox_core::sync::BatchSyncService;
use ledgerbox_storage_sqlite::sessions::SessionRepository;
use ledgerbox_storage_sqlite::{
    build_entity_handlers, create_pool, init, run_migrations, spawn_writer, DbPool,
};

use crate::config::Config;
use crate::events::EventBus;
use crate::rate_limit::RateLimiter;

pub struct AppState {
    pub batch_sync_service: Arc<BatchSyncService>,
    pub sessions: Arc<SessionRepository>,
    pub event_bus: EventBus,
    pub rate_limiter: RateLimiter,
    pub rate_limit_per_minute: u64,
    pub pool: Arc<DbPool>,
}

/// Opens the database, applies migrations and wires the services.
pub fn build_state(config: &Config) -> Result<Arc<AppState>> {
    let db_path = init(&config.data_dir).context("Failed to prepare data directory")?;
    run_migrations(&db_path).context("Failed to run database migrations")?;
    let pool = create_pool(&db_path).context("Failed to create database pool")?;
    let writer = spawn_writer(pool.as_ref().clone());

    let sessions = Arc::new(SessionRepository::new(pool.clone(), writer.clone()));
    let verifier = Arc::new(TokenVerifier::new(sessions.clone()));
    let event_bus = EventBus::default();

    let batch_sync_service = BatchSyncService::new(
        verifier,
        build_entity_handlers(pool.clone(), writer),
    )
    .with_window_size(config.sync_window)
    .with_notifier(Arc::new(event_bus.clone()));

    tracing::info!(
        db = %db_path,
        window = config.sync_window,
        "sync services initialized"
    );

    Ok(Arc::new(AppState {
        batch_sync_service: Arc::new(batch_sync_service),
        sessions,
        event_bus,
        rate_limiter: RateLimiter::new(),
        rate_limit_per_minute: config.rate_limit_per_minute,
        pool,
    }))
}
