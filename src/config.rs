use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
    time::Duration,
};

pub const CONFIG_FILE_NAME: &str = "config.json";
pub const STORAGE_FILE_NAME: &str = "focuspal.sqlite3";

const ENV_DATA_DIR: &str = "FOCUSPAL_DATA_DIR";
const ENV_API_KEY: &str = "FOCUSPAL_API_KEY";
const ENV_GEMINI_API_KEY: &str = "GEMINI_API_KEY";
const ENV_DEBUG: &str = "FOCUSPAL_DEBUG";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Used when the app's own settings carry no key.
    pub api_key: String,
    pub text_model: String,
    pub image_model: String,
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub tick_interval_ms: u64,
    #[serde(skip)]
    pub debug: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            text_model: "gemini-2.5-flash".into(),
            image_model: "gemini-2.5-flash-image".into(),
            api_base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
            request_timeout_secs: 60,
            tick_interval_ms: 1000,
            debug: false,
        }
    }
}

impl AppConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// The first non-blank of `preferred` and the configured key.
    pub fn effective_api_key<'a>(&'a self, preferred: &'a str) -> &'a str {
        if preferred.trim().is_empty() {
            self.api_key.trim()
        } else {
            preferred.trim()
        }
    }

    fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = var(ENV_API_KEY).or_else(|| var(ENV_GEMINI_API_KEY)) {
            if !key.trim().is_empty() {
                self.api_key = key.trim().to_string();
            }
        }
        if let Some(flag) = var(ENV_DEBUG) {
            self.debug = is_truthy(&flag);
        }
    }
}

/// `FOCUSPAL_DEBUG` is set to 1 or true.
pub fn debug_from_env() -> bool {
    std::env::var(ENV_DEBUG).map_or(false, |flag| is_truthy(&flag))
}

fn is_truthy(flag: &str) -> bool {
    matches!(flag.trim().to_ascii_lowercase().as_str(), "1" | "true")
}

/// Resolves the data directory: explicit override, then `FOCUSPAL_DATA_DIR`, then the
/// platform data dir.
pub fn resolve_data_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir.to_path_buf());
    }
    if let Some(dir) = std::env::var_os(ENV_DATA_DIR).filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    dirs::data_dir()
        .map(|dir| dir.join("focuspal"))
        .ok_or_else(|| anyhow!("could not determine a data directory; set {ENV_DATA_DIR}"))
}

pub struct ConfigStore {
    path: PathBuf,
    data: RwLock<AppConfig>,
}

impl ConfigStore {
    pub fn open(data_dir: &Path) -> Result<Self> {
        Self::open_with_env(data_dir, |name| std::env::var(name).ok())
    }

    fn open_with_env<F>(data_dir: &Path, var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = data_dir.join(CONFIG_FILE_NAME);
        let mut data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!("Ignoring malformed config at {}: {err}", path.display());
                AppConfig::default()
            })
        } else {
            AppConfig::default()
        };
        data.apply_env(var);

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> AppConfig {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update<F>(&self, change: F) -> Result<AppConfig>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut guard = self
            .data
            .write()
            .map_err(|_| anyhow!("config lock poisoned"))?;
        change(&mut guard);
        self.persist(&guard)?;
        Ok(guard.clone())
    }

    fn persist(&self, data: &AppConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write config to {}", self.path.display()))
    }
}
