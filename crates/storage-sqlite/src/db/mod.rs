//! SQLite connection management: file layout, pool, migrations and the
//! single-writer actor.

pub mod write_actor;

use diesel::connection::SimpleConnection;
use diesel::r2d2::{self, ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use diesel::Connection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::{debug, info};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ledgerbox_core::errors::Result;

use crate::errors::StorageError;

pub use write_actor::{spawn_writer, WriteHandle};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

pub const DB_FILE_NAME: &str = "ledgerbox.db";

const POOL_MAX_SIZE: u32 = 8;
const BUSY_TIMEOUT_MS: u32 = 5_000;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

#[derive(Debug, Clone, Copy)]
struct ConnectionOptions;

impl CustomizeConnection<SqliteConnection, r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), r2d2::Error> {
        apply_pragmas(conn).map_err(r2d2::Error::QueryError)
    }
}

fn apply_pragmas(conn: &mut SqliteConnection) -> diesel::QueryResult<()> {
    conn.batch_execute(&format!(
        "PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL; PRAGMA foreign_keys = ON; PRAGMA busy_timeout = {};",
        BUSY_TIMEOUT_MS
    ))
}

/// Ensures the data directory exists and returns the database file path.
pub fn init(app_data_dir: &str) -> Result<String> {
    std::fs::create_dir_all(app_data_dir).map_err(StorageError::from)?;
    let db_path = Path::new(app_data_dir).join(DB_FILE_NAME);
    info!("Using database at {}", db_path.display());
    Ok(db_path.to_string_lossy().to_string())
}

/// Applies pending embedded migrations on a dedicated connection.
pub fn run_migrations(db_path: &str) -> Result<()> {
    let mut conn = SqliteConnection::establish(db_path).map_err(StorageError::from)?;
    apply_pragmas(&mut conn).map_err(StorageError::from)?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| StorageError::Migration(e.to_string()))?;
    for version in &applied {
        debug!("Applied migration {}", version);
    }
    Ok(())
}

pub fn create_pool(db_path: &str) -> Result<Arc<DbPool>> {
    let manager = ConnectionManager::<SqliteConnection>::new(db_path);
    let pool = Pool::builder()
        .max_size(POOL_MAX_SIZE)
        .connection_timeout(Duration::from_secs(10))
        .connection_customizer(Box::new(ConnectionOptions))
        .build(manager)
        .map_err(StorageError::from)?;
    Ok(Arc::new(pool))
}

pub fn get_connection(pool: &DbPool) -> Result<DbConnection> {
    Ok(pool.get().map_err(StorageError::from)?)
}

/// Cheap readiness probe used by health checks.
pub fn ping(pool: &DbPool) -> Result<()> {
    let mut conn = get_connection(pool)?;
    conn.batch_execute("SELECT 1").map_err(StorageError::from)?;
    Ok(())
}
