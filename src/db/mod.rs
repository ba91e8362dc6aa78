use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use log::{error, info};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::oneshot;

mod migrations;

use migrations::run_migrations;

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct DatabaseInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("Failed to send shutdown to DB thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join DB thread: {join_err:?}");
            }
        }
    }
}

/// Where the worker thread opens its connection.
enum Location {
    File(PathBuf),
    Memory,
}

/// SQLite keyed store owned by a single worker thread.
///
/// Every call is shipped to the thread as a closure and answered over a
/// oneshot channel, so async callers never block on rusqlite.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
    db_path: Option<Arc<PathBuf>>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let inner = spawn_worker(Location::File(db_path.clone()))?;
        info!("Database initialized at {}", db_path.display());

        Ok(Self {
            inner: Arc::new(inner),
            db_path: Some(Arc::new(db_path)),
        })
    }

    /// Throwaway database for tests and for running without a data directory.
    pub fn open_in_memory() -> Result<Self> {
        let inner = spawn_worker(Location::Memory)?;
        Ok(Self {
            inner: Arc::new(inner),
            db_path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref().map(PathBuf::as_path)
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
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

    pub async fn get_value(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.execute(move |conn| {
            conn.query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .with_context(|| format!("failed to read key {key}"))
        })
        .await
    }

    pub async fn put_value(&self, key: &str, value: String) -> Result<()> {
        let key = key.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, Utc::now().to_rfc3339()],
            )
            .with_context(|| format!("failed to write key {key}"))?;
            Ok(())
        })
        .await
    }
}

fn spawn_worker(location: Location) -> Result<DatabaseInner> {
    let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
    let (ready_tx, ready_rx) = mpsc::channel();

    let worker = thread::Builder::new()
        .name("smartsynch-db".into())
        .spawn(move || {
            let opened = match &location {
                Location::File(path) => Connection::open(path),
                Location::Memory => Connection::open_in_memory(),
            };
            let mut conn = match opened {
                Ok(connection) => connection,
                Err(err) => {
                    let _ = ready_tx.send(Err(
                        anyhow::Error::new(err).context("failed to open SQLite database")
                    ));
                    return;
                }
            };

            if matches!(location, Location::File(_)) {
                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }
            }

            let init_result =
                run_migrations(&mut conn).context("failed to run database migrations");
            if ready_tx.send(init_result).is_err() {
                error!("DB initialization receiver dropped before ready signal");
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

    ready_rx
        .recv()
        .context("database worker exited before signaling readiness")??;

    Ok(DatabaseInner {
        sender: command_tx,
        worker: Mutex::new(Some(worker)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_and_overwrite_values() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.get_value("missing").await.unwrap(), None);

        db.put_value("tasks", "[]".into()).await.unwrap();
        db.put_value("tasks", "[1]".into()).await.unwrap();
        assert_eq!(db.get_value("tasks").await.unwrap().as_deref(), Some("[1]"));
    }

    #[tokio::test]
    async fn values_survive_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("smartsynch.sqlite3");

        {
            let db = Database::new(path.clone()).unwrap();
            assert_eq!(db.path(), Some(path.as_path()));
            db.put_value("k", "v".into()).await.unwrap();
        }

        let reopened = Database::new(path).unwrap();
        assert_eq!(reopened.get_value("k").await.unwrap().as_deref(), Some("v"));
    }
}
