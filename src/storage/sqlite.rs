use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use log::{error, info};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::oneshot;

use super::{migrations::run_migrations, LocalStorage};

type StorageTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum StorageCommand {
    Execute(StorageTask),
    Shutdown,
}

struct WorkerInner {
    sender: mpsc::Sender<StorageCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for WorkerInner {
    fn drop(&mut self) {
        let handle = match self.worker.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(handle) = handle else {
            return;
        };

        // A closed channel means the worker already stopped.
        let _ = self.sender.send(StorageCommand::Shutdown);
        if handle.join().is_err() {
            error!("Storage worker panicked");
        }
    }
}

/// Key/value storage in a single SQLite table, owned by one worker thread.
///
/// Every caller shares the connection through [`SqliteStorage::execute`]; keys are scoped
/// by `namespace` so both apps can live in one database file.
#[derive(Clone)]
pub struct SqliteStorage {
    inner: Arc<WorkerInner>,
    db_path: Arc<PathBuf>,
    namespace: Arc<str>,
}

impl SqliteStorage {
    pub fn open(db_path: PathBuf, namespace: &str) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create storage directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<StorageCommand>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let worker_path = db_path.clone();

        let worker = thread::Builder::new()
            .name("focuspal-storage".into())
            .spawn(move || {
                let mut conn = match open_connection(&worker_path) {
                    Ok(conn) => {
                        let _ = ready_tx.send(Ok(()));
                        conn
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                serve(&mut conn, command_rx);
            })
            .context("could not spawn storage thread")?;

        ready_rx
            .recv()
            .map_err(|_| anyhow!("storage thread died during startup"))??;
        info!("Storage ready at {} ({namespace})", db_path.display());

        Ok(Self {
            inner: Arc::new(WorkerInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            db_path: Arc::new(db_path),
            namespace: Arc::from(namespace),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Same database, different key scope.
    pub fn with_namespace(&self, namespace: &str) -> Self {
        Self {
            inner: self.inner.clone(),
            db_path: self.db_path.clone(),
            namespace: Arc::from(namespace),
        }
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = StorageCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("Storage caller dropped before receiving result");
            }
        }));

        self.inner
            .sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to storage thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("storage thread terminated unexpectedly"))?
    }

    /// Keys stored under this namespace, sorted.
    pub async fn keys(&self) -> Result<Vec<String>> {
        let namespace = self.namespace.to_string();
        self.execute(move |conn| {
            let mut stmt =
                conn.prepare("SELECT key FROM kv_store WHERE namespace = ?1 ORDER BY key")?;
            let keys = stmt
                .query_map(params![namespace], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(keys)
        })
        .await
    }
}

fn open_connection(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("could not open {}", path.display()))?;
    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        error!("WAL journal unavailable, using default journal: {err}");
    }
    run_migrations(&mut conn)?;
    Ok(conn)
}

fn serve(conn: &mut Connection, commands: mpsc::Receiver<StorageCommand>) {
    for command in commands {
        match command {
            StorageCommand::Execute(task) => task(conn),
            StorageCommand::Shutdown => break,
        }
    }
    info!("Storage thread stopped");
}

#[async_trait]
impl LocalStorage for SqliteStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        let namespace = self.namespace.to_string();
        let key = key.to_string();
        self.execute(move |conn| {
            conn.query_row(
                "SELECT value FROM kv_store WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .with_context(|| format!("failed to read key '{key}'"))
        })
        .await
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let namespace = self.namespace.to_string();
        let key = key.to_string();
        let value = value.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO kv_store (namespace, key, value, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(namespace, key) DO UPDATE SET
                     value = excluded.value,
                     updated_at = excluded.updated_at",
                params![namespace, key, value, Utc::now().to_rfc3339()],
            )
            .with_context(|| format!("failed to write key '{key}'"))?;
            Ok(())
        })
        .await
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        let namespace = self.namespace.to_string();
        let key = key.to_string();
        self.execute(move |conn| {
            conn.execute(
                "DELETE FROM kv_store WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
            )
            .with_context(|| format!("failed to remove key '{key}'"))?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn values_round_trip_and_overwrite() {
        let dir = tempdir().unwrap();
        let storage = SqliteStorage::open(dir.path().join("store.sqlite3"), "focuspal").unwrap();

        assert_eq!(storage.get_item("snapshot").await.unwrap(), None);
        storage.set_item("snapshot", "{\"a\":1}").await.unwrap();
        storage.set_item("snapshot", "{\"a\":2}").await.unwrap();
        assert_eq!(
            storage.get_item("snapshot").await.unwrap().as_deref(),
            Some("{\"a\":2}")
        );

        storage.remove_item("snapshot").await.unwrap();
        assert_eq!(storage.get_item("snapshot").await.unwrap(), None);
    }

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let dir = tempdir().unwrap();
        let focus = SqliteStorage::open(dir.path().join("store.sqlite3"), "focuspal").unwrap();
        let docbook = focus.with_namespace("docbook");

        focus.set_item("k", "focus").await.unwrap();
        docbook.set_item("k", "docbook").await.unwrap();

        assert_eq!(focus.get_item("k").await.unwrap().as_deref(), Some("focus"));
        assert_eq!(docbook.get_item("k").await.unwrap().as_deref(), Some("docbook"));
        assert_eq!(focus.keys().await.unwrap(), vec!["k".to_string()]);
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("store.sqlite3");
        {
            let storage = SqliteStorage::open(path.clone(), "focuspal").unwrap();
            storage.set_item("k", "v").await.unwrap();
        }
        let reopened = SqliteStorage::open(path, "focuspal").unwrap();
        assert_eq!(reopened.get_item("k").await.unwrap().as_deref(), Some("v"));
    }
}
