use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

use crate::error::{StoreError, StoreResult};
use crate::file::FileStore;

/// Flush/sync strategy for the file store log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` after every record (safest, highest latency).
    EveryWrite,
    /// Flush to the OS page cache only.
    #[default]
    OsDefault,
}

/// Diagnostic log verbosity.
///
/// Parsing is lenient: an unrecognised level falls back to `info`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    None,
}

impl LogLevel {
    /// The `tracing` filter corresponding to this level.
    pub fn level_filter(self) -> LevelFilter {
        match self {
            Self::Debug => LevelFilter::DEBUG,
            Self::Info => LevelFilter::INFO,
            Self::Warning => LevelFilter::WARN,
            Self::Error => LevelFilter::ERROR,
            Self::None => LevelFilter::OFF,
        }
    }
}

impl From<&str> for LogLevel {
    fn from(level: &str) -> Self {
        match level.to_ascii_lowercase().as_str() {
            "debug" => Self::Debug,
            "info" => Self::Info,
            "warning" | "warn" => Self::Warning,
            "error" => Self::Error,
            "none" | "off" => Self::None,
            _ => Self::Info,
        }
    }
}

impl From<String> for LogLevel {
    fn from(level: String) -> Self {
        Self::from(level.as_str())
    }
}

/// Store configuration: where store files live and how they are written.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KvConfig {
    /// Directory holding one log file per store id.
    pub root_dir: PathBuf,
    /// Diagnostic log verbosity for binaries embedding the store.
    pub log_level: LogLevel,
    /// Sync strategy for store logs.
    pub sync_mode: SyncMode,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("kvstore"),
            log_level: LogLevel::default(),
            sync_mode: SyncMode::default(),
        }
    }
}

impl KvConfig {
    /// A default configuration rooted at `root_dir`.
    pub fn with_root(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Default::default()
        }
    }

    /// Parse a configuration from TOML. Missing fields take their defaults.
    pub fn from_toml_str(text: &str) -> StoreResult<Self> {
        toml::from_str(text).map_err(|e| StoreError::Config(e.to_string()))
    }

    /// Load a configuration from a TOML file.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Path of the log file for store `id`.
    pub fn store_path(&self, id: &str) -> StoreResult<PathBuf> {
        validate_store_id(id)?;
        Ok(self.root_dir.join(format!("{id}.kvlog")))
    }

    /// Open (or create) the file store for `id`.
    pub fn open_store(&self, id: &str) -> StoreResult<FileStore> {
        FileStore::open(&self.store_path(id)?, self.sync_mode)
    }
}

fn validate_store_id(id: &str) -> StoreResult<()> {
    let valid = !id.is_empty()
        && id != "."
        && id != ".."
        && !id.contains(['/', '\\'])
        && !id.chars().any(char::is_control);
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidId(id.to_string()))
    }
}
