//! Runtime configuration for the notice store.
//!
//! # Responsibility
//! - Resolve database path, log level/directory and busy timeout from
//!   `NOTICE_*` environment variables.
//! - Provide defaults that work without any environment set.
//!
//! # Invariants
//! - Blank variables are treated as unset.
//! - A configured log directory must be absolute.

use crate::db::{open_db_with_busy_timeout, DbResult, DEFAULT_BUSY_TIMEOUT};
use crate::logging::{default_log_level, init_logging, normalize_level};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_DB_PATH: &str = "NOTICE_DB_PATH";
pub const ENV_LOG_LEVEL: &str = "NOTICE_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "NOTICE_LOG_DIR";
pub const ENV_BUSY_TIMEOUT_MS: &str = "NOTICE_BUSY_TIMEOUT_MS";

const DEFAULT_DB_FILE_NAME: &str = "notice.sqlite3";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidLogLevel(String),
    RelativeLogDir(String),
    InvalidBusyTimeout(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidLogLevel(message) => write!(f, "{ENV_LOG_LEVEL}: {message}"),
            Self::RelativeLogDir(value) => {
                write!(f, "{ENV_LOG_DIR} must be an absolute path, got `{value}`")
            }
            Self::InvalidBusyTimeout(value) => write!(
                f,
                "{ENV_BUSY_TIMEOUT_MS} must be a non-negative integer, got `{value}`"
            ),
        }
    }
}

impl Error for ConfigError {}

/// Resolved runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoticeConfig {
    pub db_path: PathBuf,
    pub log_level: &'static str,
    /// File logging is enabled only when a directory is configured.
    pub log_dir: Option<PathBuf>,
    pub busy_timeout: Duration,
}

impl Default for NoticeConfig {
    fn default() -> Self {
        Self {
            db_path: std::env::temp_dir().join(DEFAULT_DB_FILE_NAME),
            log_level: default_log_level(),
            log_dir: None,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }
}

impl NoticeConfig {
    /// Loads configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut config = Self::default();

        if let Some(path) = read(ENV_DB_PATH) {
            config.db_path = PathBuf::from(path);
        }
        if let Some(level) = read(ENV_LOG_LEVEL) {
            config.log_level = normalize_level(&level).map_err(ConfigError::InvalidLogLevel)?;
        }
        if let Some(dir) = read(ENV_LOG_DIR) {
            if !Path::new(&dir).is_absolute() {
                return Err(ConfigError::RelativeLogDir(dir));
            }
            config.log_dir = Some(PathBuf::from(dir));
        }
        if let Some(raw) = read(ENV_BUSY_TIMEOUT_MS) {
            let millis = raw
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidBusyTimeout(raw.clone()))?;
            config.busy_timeout = Duration::from_millis(millis);
        }

        Ok(config)
    }

    /// Starts file logging when a log directory is configured.
    ///
    /// Returns `Ok(false)` when logging stays disabled.
    pub fn init_logging(&self) -> Result<bool, String> {
        let Some(dir) = self.log_dir.as_ref() else {
            return Ok(false);
        };
        let dir = dir
            .to_str()
            .ok_or_else(|| format!("log_dir `{}` is not valid UTF-8", dir.display()))?;
        init_logging(self.log_level, dir)?;
        Ok(true)
    }

    /// Opens the configured database with migrations applied.
    pub fn open_db(&self) -> DbResult<Connection> {
        open_db_with_busy_timeout(&self.db_path, self.busy_timeout)
    }
}
