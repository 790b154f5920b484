//! Runtime configuration.
//!
//! # Responsibility
//! - Define the settings front ends need to open the store and start logging.
//! - Load them from an optional JSON file with per-field defaults.
//!
//! # Invariants
//! - A missing config file yields defaults, a malformed one is an error.
//! - `validate()` is applied to every loaded config.

use crate::db::DbOptions;
use crate::logging::{default_log_level, normalize_level, LoggingError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_DB_FILE_NAME: &str = "taskrank.sqlite3";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_MAX_TX_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config `{path}`: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config `{path}`: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error(transparent)]
    LogLevel(#[from] LoggingError),
    #[error("max_tx_attempts must be at least 1")]
    ZeroAttempts,
}

/// Settings shared by the CLI and embedders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TaskrankConfig {
    pub db_path: PathBuf,
    pub log_level: String,
    /// Rolling log directory; stderr when unset.
    pub log_dir: Option<PathBuf>,
    pub busy_timeout_ms: u64,
    /// Total attempts for a contended store transaction.
    pub max_tx_attempts: u32,
}

impl Default for TaskrankConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_FILE_NAME),
            log_level: default_log_level().to_string(),
            log_dir: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            max_tx_attempts: DEFAULT_MAX_TX_ATTEMPTS,
        }
    }
}

impl TaskrankConfig {
    /// Loads `path` if it exists, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path.filter(|path| path.exists()) else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        normalize_level(&self.log_level)?;
        if self.max_tx_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        Ok(())
    }

    pub fn db_options(&self) -> DbOptions {
        DbOptions {
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
        }
    }
}
