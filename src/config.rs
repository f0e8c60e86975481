//! Tracker configuration
//!
//! [`TrackerConfig`] can be built in code with [`TrackerConfig::builder`] or
//! parsed from JSON, where any missing field falls back to its default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Environment variable overriding the default data directory.
pub const DATA_DIR_ENV: &str = "MLTRACKER_DIR";

/// Default database file name inside the data directory.
pub const DEFAULT_DB_FILE_NAME: &str = "mltracker.db";

/// Default length of generated run names.
pub const DEFAULT_RUN_NAME_LENGTH: usize = 10;

/// Longest generated run name (hex digits in a UUID).
pub const MAX_RUN_NAME_LENGTH: usize = 32;

/// Settings for a tracking session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Root directory holding the database file and the experiment tree.
    pub data_dir: PathBuf,
    /// Database file name, relative to `data_dir`.
    pub db_file_name: String,
    /// Length of auto-generated run names.
    pub run_name_length: usize,
    /// Insert attempts for auto-generated run names; 1 disables retrying.
    pub generated_name_attempts: u32,
    /// How long SQLite waits on a locked database, in milliseconds.
    pub busy_timeout_ms: u64,
    /// Run a reconciliation pass when a session opens.
    pub reconcile_on_open: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            db_file_name: DEFAULT_DB_FILE_NAME.to_string(),
            run_name_length: DEFAULT_RUN_NAME_LENGTH,
            generated_name_attempts: 1,
            busy_timeout_ms: 5000,
            reconcile_on_open: false,
        }
    }
}

impl TrackerConfig {
    /// Create a builder starting from the defaults.
    #[must_use]
    pub fn builder() -> TrackerConfigBuilder {
        TrackerConfigBuilder::default()
    }

    /// Parse a JSON document; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the JSON is malformed or fails validation.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check field ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] describing the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("data_dir must not be empty".to_string()));
        }
        if !(1..=MAX_RUN_NAME_LENGTH).contains(&self.run_name_length) {
            return Err(Error::InvalidConfig(format!(
                "run_name_length must be between 1 and {MAX_RUN_NAME_LENGTH}, got {}",
                self.run_name_length
            )));
        }
        if self.generated_name_attempts == 0 {
            return Err(Error::InvalidConfig(
                "generated_name_attempts must be at least 1".to_string(),
            ));
        }
        let file_name = Path::new(&self.db_file_name);
        if self.db_file_name.is_empty() || file_name.file_name() != Some(file_name.as_os_str()) {
            return Err(Error::InvalidConfig(format!(
                "db_file_name must be a plain file name, got '{}'",
                self.db_file_name
            )));
        }
        Ok(())
    }

    /// Full path of the database file.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_file_name)
    }

    /// Busy timeout as a `Duration`.
    #[must_use]
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Builder for `TrackerConfig`.
#[derive(Debug, Default)]
pub struct TrackerConfigBuilder {
    config: TrackerConfig,
}

impl TrackerConfigBuilder {
    /// Set the root data directory.
    #[must_use]
    pub fn data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = data_dir.into();
        self
    }

    /// Set the database file name.
    #[must_use]
    pub fn db_file_name(mut self, name: impl Into<String>) -> Self {
        self.config.db_file_name = name.into();
        self
    }

    /// Set the generated run name length.
    #[must_use]
    pub const fn run_name_length(mut self, len: usize) -> Self {
        self.config.run_name_length = len;
        self
    }

    /// Allow retrying generated run names that collide on insert.
    #[must_use]
    pub const fn generated_name_attempts(mut self, attempts: u32) -> Self {
        self.config.generated_name_attempts = attempts;
        self
    }

    /// Set the SQLite busy timeout.
    #[must_use]
    pub const fn busy_timeout_ms(mut self, ms: u64) -> Self {
        self.config.busy_timeout_ms = ms;
        self
    }

    /// Reconcile the directory tree with the database when a session opens.
    #[must_use]
    pub const fn reconcile_on_open(mut self, enabled: bool) -> Self {
        self.config.reconcile_on_open = enabled;
        self
    }

    /// Build the `TrackerConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if validation fails.
    pub fn build(self) -> Result<TrackerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// `$MLTRACKER_DIR`, else `$HOME/.mltracker`, else `.mltracker`.
#[must_use]
pub fn default_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map_or_else(|| PathBuf::from(".mltracker"), |home| PathBuf::from(home).join(".mltracker"))
}
