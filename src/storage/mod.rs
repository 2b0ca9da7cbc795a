//! Snapshot persistence on top of a local key/value store.

pub mod migrations;
pub mod snapshot;
pub mod sqlite;

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::{log_debug, log_error, log_info, log_warn};

pub use snapshot::{from_stored, merge_over_defaults, DocbookSnapshot, FocusSnapshot, Snapshot};
pub use sqlite::SqliteStorage;

const ENABLE_LOGS: bool = true;

/// String key/value storage in the shape of browser local storage.
#[async_trait]
pub trait LocalStorage: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>>;
    async fn set_item(&self, key: &str, value: &str) -> Result<()>;
    async fn remove_item(&self, key: &str) -> Result<()>;
}

#[derive(Default, Clone)]
pub struct MemoryStorage {
    items: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LocalStorage for MemoryStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.lock().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.items
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.items.lock().await.remove(key);
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to read backup {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("backup is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid file format: missing '{0}'")]
    InvalidFormat(String),
}

/// Loads, saves and backs up app snapshots.
#[derive(Clone)]
pub struct Persistence {
    storage: Arc<dyn LocalStorage>,
}

impl Persistence {
    pub fn new(storage: Arc<dyn LocalStorage>) -> Self {
        Self { storage }
    }

    /// Never fails: a missing or unreadable blob yields defaults.
    pub async fn load<T: Snapshot>(&self) -> T {
        let raw = match self.storage.get_item(T::STORAGE_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                log_debug!("No stored data under {}; using defaults", T::STORAGE_KEY);
                return T::default();
            }
            Err(err) => {
                log_error!("Failed to read {}: {err:#}", T::STORAGE_KEY);
                return T::default();
            }
        };

        match serde_json::from_str::<Value>(&raw)
            .map_err(anyhow::Error::from)
            .and_then(|stored| with_defaults::<T>(&stored))
        {
            Ok(snapshot) => snapshot,
            Err(err) => {
                log_warn!("Stored data under {} is corrupt, using defaults: {err:#}", T::STORAGE_KEY);
                T::default()
            }
        }
    }

    /// Writes the whole snapshot. Returns whether the write landed; failures are only
    /// logged.
    pub async fn save<T: Snapshot>(&self, snapshot: &T) -> bool {
        let result = async {
            let serialized = serde_json::to_string(snapshot).context("failed to serialize snapshot")?;
            self.storage.set_item(T::STORAGE_KEY, &serialized).await
        }
        .await;

        match result {
            Ok(()) => true,
            Err(err) => {
                log_error!("Failed to save {}: {err:#}", T::STORAGE_KEY);
                false
            }
        }
    }

    pub async fn export<T: Snapshot>(&self, snapshot: &T, dir: &Path) -> Result<PathBuf> {
        export_on(snapshot, dir, Utc::now().date_naive())
    }

    pub async fn import<T: Snapshot>(&self, path: &Path) -> Result<T, ImportError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ImportError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let snapshot = parse_backup::<T>(&text)?;
        log_info!("Imported backup from {}", path.display());
        Ok(snapshot)
    }
}

pub fn backup_file_name<T: Snapshot>(date: NaiveDate) -> String {
    format!("{}-backup-{}.json", T::BACKUP_PREFIX, date.format("%Y-%m-%d"))
}

/// Writes `snapshot` as pretty JSON into `dir`, named for `date`.
pub fn export_on<T: Snapshot>(snapshot: &T, dir: &Path, date: NaiveDate) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create export directory {}", dir.display()))?;
    let path = dir.join(backup_file_name::<T>(date));
    let serialized =
        serde_json::to_string_pretty(snapshot).context("failed to serialize backup")?;
    std::fs::write(&path, serialized)
        .with_context(|| format!("failed to write backup to {}", path.display()))?;
    log_info!("Exported backup to {}", path.display());
    Ok(path)
}

/// Validates the required sections, then merges over defaults like [`Persistence::load`].
pub fn parse_backup<T: Snapshot>(text: &str) -> Result<T, ImportError> {
    let stored: Value = serde_json::from_str(text)?;
    for section in T::REQUIRED_SECTIONS {
        match stored.get(*section) {
            Some(value) if !value.is_null() => {}
            _ => return Err(ImportError::InvalidFormat((*section).to_string())),
        }
    }
    Ok(from_stored(&stored)?)
}

fn with_defaults<T: Snapshot>(stored: &Value) -> Result<T> {
    from_stored(stored).context("stored data does not match the snapshot shape")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PetState, ThemeType};
    use tempfile::tempdir;

    struct BrokenStorage;

    #[async_trait]
    impl LocalStorage for BrokenStorage {
        async fn get_item(&self, _key: &str) -> Result<Option<String>> {
            anyhow::bail!("quota exceeded")
        }
        async fn set_item(&self, _key: &str, _value: &str) -> Result<()> {
            anyhow::bail!("quota exceeded")
        }
        async fn remove_item(&self, _key: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn save_then_load_returns_the_same_snapshot() {
        let persistence = Persistence::new(Arc::new(MemoryStorage::new()));
        let mut snapshot = FocusSnapshot::default();
        snapshot.settings.theme = ThemeType::Forest;
        snapshot.pet.on_session_complete(25);

        assert!(persistence.save(&snapshot).await);
        let loaded: FocusSnapshot = persistence.load().await;
        assert_eq!(loaded, snapshot);
    }

    #[tokio::test]
    async fn corrupt_blob_loads_defaults() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .set_item(FocusSnapshot::STORAGE_KEY, "{not json")
            .await
            .unwrap();
        let persistence = Persistence::new(storage.clone());
        assert_eq!(persistence.load::<FocusSnapshot>().await, FocusSnapshot::default());

        storage
            .set_item(FocusSnapshot::STORAGE_KEY, r#"{"pet": {"health": "full"}}"#)
            .await
            .unwrap();
        assert_eq!(persistence.load::<FocusSnapshot>().await, FocusSnapshot::default());
    }

    #[tokio::test]
    async fn partial_blob_is_backfilled() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .set_item(FocusSnapshot::STORAGE_KEY, r#"{"pet": {"name": "Pip", "health": 40}}"#)
            .await
            .unwrap();
        let loaded: FocusSnapshot = Persistence::new(storage).load().await;
        assert_eq!(loaded.pet.name, "Pip");
        assert_eq!(loaded.pet.health, 40.0);
        assert_eq!(loaded.pet.happiness, PetState::default().happiness);
        assert_eq!(loaded.settings.daily_goal_minutes, 120);
    }

    const LEGACY_FOCUS_BLOB: &str = r#"{
        "settings": {"username": "kim", "dailyGoalMinutes": 45},
        "sessions": [],
        "pet": {"name": "Bit", "level": 2, "xp": 1500, "health": 50, "happiness": 40}
    }"#;

    #[tokio::test]
    async fn legacy_pet_blob_keeps_user_data() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .set_item(FocusSnapshot::STORAGE_KEY, LEGACY_FOCUS_BLOB)
            .await
            .unwrap();
        let loaded: FocusSnapshot = Persistence::new(storage).load().await;
        assert_eq!(loaded.settings.username, "kim");
        assert_eq!(loaded.settings.daily_goal_minutes, 45);
        assert_eq!(loaded.pet.name, "Bit");
        assert_eq!(loaded.pet.experience, 1500.0);

        let imported = parse_backup::<FocusSnapshot>(LEGACY_FOCUS_BLOB).unwrap();
        assert_eq!(imported, loaded);
    }

    #[tokio::test]
    async fn storage_failures_are_swallowed() {
        let persistence = Persistence::new(Arc::new(BrokenStorage));
        assert!(!persistence.save(&DocbookSnapshot::default()).await);
        assert_eq!(persistence.load::<DocbookSnapshot>().await, DocbookSnapshot::default());
    }

    #[tokio::test]
    async fn export_then_import_round_trips() {
        let dir = tempdir().unwrap();
        let persistence = Persistence::new(Arc::new(MemoryStorage::new()));
        let mut snapshot = DocbookSnapshot::default();
        snapshot.settings.username = "Ana".into();

        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let path = export_on(&snapshot, dir.path(), date).unwrap();
        assert_eq!(path.file_name().unwrap(), "docbook-backup-2024-03-09.json");

        let imported: DocbookSnapshot = persistence.import(&path).await.unwrap();
        assert_eq!(imported, snapshot);
    }

    #[test]
    fn import_requires_every_section() {
        let err = parse_backup::<DocbookSnapshot>(r#"{"settings": {}}"#).unwrap_err();
        assert!(matches!(err, ImportError::InvalidFormat(section) if section == "appointments"));

        let err = parse_backup::<FocusSnapshot>("[]").unwrap_err();
        assert!(matches!(err, ImportError::InvalidFormat(_)));

        assert!(matches!(
            parse_backup::<FocusSnapshot>("nope"),
            Err(ImportError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn missing_backup_file_is_an_io_error() {
        let persistence = Persistence::new(Arc::new(MemoryStorage::new()));
        let result = persistence
            .import::<FocusSnapshot>(Path::new("/definitely/not/here.json"))
            .await;
        assert!(matches!(result, Err(ImportError::Io { .. })));
    }
}
