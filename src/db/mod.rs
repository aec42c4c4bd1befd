use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex, MutexGuard},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use log::{error, info};
use rusqlite::Connection;
use tokio::sync::oneshot;

mod helpers;
mod migrations;
pub mod models;
mod repositories;

use migrations::run_migrations;

pub use models::PersistedRecord;
pub use repositories::records::{DumpOutcome, PROGRESS_EVERY_ROWS};

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct Worker {
    sender: mpsc::Sender<DbCommand>,
    handle: JoinHandle<()>,
}

impl Worker {
    fn shutdown(self) {
        if let Err(err) = self.sender.send(DbCommand::Shutdown) {
            error!("Failed to send shutdown to DB thread: {err}");
        }
        if let Err(join_err) = self.handle.join() {
            error!("Failed to join DB thread: {join_err:?}");
        }
    }
}

struct StoreInner {
    db_path: PathBuf,
    worker: Mutex<Option<Worker>>,
}

impl StoreInner {
    fn worker(&self) -> MutexGuard<'_, Option<Worker>> {
        match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        if let Some(worker) = self.worker().take() {
            worker.shutdown();
        }
    }
}

/// Append-only time-series store backed by SQLite.
///
/// All statements run on one dedicated thread, so writes are serialized and a
/// reader never sees a half-written row. Handles are cheap to clone; the
/// connection closes when [`TimeSeriesStore::close`] is called or the last
/// handle is dropped.
#[derive(Clone)]
pub struct TimeSeriesStore {
    inner: Arc<StoreInner>,
}

impl TimeSeriesStore {
    /// Creates a handle without touching the file system. Call [`open`](Self::open)
    /// or let the first query open it.
    pub fn new(db_path: PathBuf) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                db_path,
                worker: Mutex::new(None),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        self.inner.db_path.as_path()
    }

    pub fn is_open(&self) -> bool {
        self.inner.worker().is_some()
    }

    /// Opens the connection and creates the schema. No-op if already open.
    pub fn open(&self) -> Result<()> {
        let mut guard = self.inner.worker();
        if guard.is_some() {
            return Ok(());
        }

        let db_path = self.inner.db_path.clone();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let handle = thread::Builder::new()
            .name("cellmapper-db".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(anyhow::Error::new(err)
                            .context("failed to open SQLite database")));
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run database migrations");
                let init_failed = init_result.is_err();
                if ready_tx.send(init_result).is_err() {
                    error!("DB initialization receiver dropped before ready signal");
                    return;
                }
                if init_failed {
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => {
                            task(&mut conn);
                        }
                        DbCommand::Shutdown => break,
                    }
                }

                info!("Database thread shutting down");
            })
            .with_context(|| "failed to spawn database worker thread")?;

        let ready = ready_rx
            .recv()
            .context("database worker exited before signaling readiness")
            .and_then(|result| result);
        if let Err(err) = ready {
            if let Err(join_err) = handle.join() {
                error!("Failed to join DB thread: {join_err:?}");
            }
            return Err(err);
        }

        info!("Opened sample store at {}", db_path.display());

        *guard = Some(Worker {
            sender: command_tx,
            handle,
        });
        Ok(())
    }

    /// Closes the connection. Safe to call repeatedly.
    pub fn close(&self) {
        let worker = self.inner.worker().take();
        if let Some(worker) = worker {
            info!("Closing sample store at {}", self.path().display());
            worker.shutdown();
        }
    }

    pub(crate) async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.open()?;
        let sender = self
            .inner
            .worker()
            .as_ref()
            .map(|worker| worker.sender.clone())
            .ok_or_else(|| anyhow!("sample store closed while dispatching"))?;
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("DB caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to DB thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread terminated unexpectedly"))?
    }
}
