//! Single-writer actor. SQLite allows one writer at a time, so every mutation
//! is funneled through one thread and runs inside its own transaction.

use diesel::sqlite::SqliteConnection;
use diesel::Connection;
use log::{error, info};
use tokio::sync::{mpsc, oneshot};

use ledgerbox_core::errors::{DatabaseError, Error, Result};

use super::DbPool;
use crate::errors::StorageError;

type Job = Box<dyn FnOnce(&mut SqliteConnection) + Send + 'static>;

/// Error carried out of a writer transaction so it rolls back.
enum TxAbort {
    Job(Error),
    Diesel(diesel::result::Error),
}

impl From<diesel::result::Error> for TxAbort {
    fn from(err: diesel::result::Error) -> Self {
        TxAbort::Diesel(err)
    }
}

impl From<TxAbort> for Error {
    fn from(abort: TxAbort) -> Self {
        match abort {
            TxAbort::Job(err) => err,
            TxAbort::Diesel(err) => StorageError::from(err).into(),
        }
    }
}

#[derive(Clone)]
pub struct WriteHandle {
    tx: mpsc::UnboundedSender<Job>,
}

impl WriteHandle {
    /// Runs `job` on the writer connection inside a transaction.
    ///
    /// Any `Err` returned by the job rolls the transaction back and is handed
    /// to the caller unchanged.
    pub async fn exec<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel::<Result<T>>();
        let wrapped: Job = Box::new(move |conn: &mut SqliteConnection| {
            let result = conn
                .immediate_transaction::<T, TxAbort, _>(|tx_conn| job(tx_conn).map_err(TxAbort::Job))
                .map_err(Error::from);
            let _ = reply_tx.send(result);
        });

        self.tx.send(wrapped).map_err(|_| writer_gone())?;
        reply_rx.await.map_err(|_| writer_gone())?
    }
}

fn writer_gone() -> Error {
    Error::Database(DatabaseError::ConnectionFailed(
        "Database writer is not running".to_string(),
    ))
}

/// Starts the writer thread. It exits once every handle has been dropped.
pub fn spawn_writer(pool: DbPool) -> WriteHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

    let spawned = std::thread::Builder::new()
        .name("ledgerbox-db-writer".to_string())
        .spawn(move || {
            while let Some(job) = rx.blocking_recv() {
                match pool.get() {
                    Ok(mut conn) => job(&mut *conn),
                    // Dropping the job closes its reply channel; the caller sees writer_gone.
                    Err(e) => error!("Writer could not acquire a connection: {}", e),
                }
            }
            info!("Database writer stopped");
        });

    if let Err(e) = spawned {
        error!("Failed to spawn database writer thread: {}", e);
    }

    WriteHandle { tx }
}
