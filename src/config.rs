//! Configuration for the counts store
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{CountsError, Result};
use crate::storage::RECORD_SIZE;

/// Main configuration for a counts store instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding the two counts files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── {base_name}.a
    ///     └── {base_name}.b
    pub data_dir: PathBuf,

    /// Base file name, suffixed with `.a` and `.b`
    pub base_name: String,

    /// Written files are padded with empty records up to a multiple of this
    pub page_size: usize,

    /// Refuse to create files and skip rotations
    pub read_only: bool,

    // -------------------------------------------------------------------------
    // Snapshot Configuration
    // -------------------------------------------------------------------------
    /// How often a waiting snapshot re-checks store health (milliseconds)
    pub snapshot_poll_interval_ms: u64,

    /// Upper bound on the wait for the gap-free watermark (milliseconds)
    pub snapshot_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./counts_data"),
            base_name: "counts.db".to_string(),
            page_size: 8192,
            read_only: false,
            snapshot_poll_interval_ms: 10,
            snapshot_timeout_ms: 60_000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check values that would otherwise surface as odd runtime behavior
    pub fn validate(&self) -> Result<()> {
        if self.base_name.is_empty() {
            return Err(CountsError::Config("base_name must not be empty".to_string()));
        }
        if self.page_size == 0 || self.page_size % RECORD_SIZE != 0 {
            return Err(CountsError::Config(format!(
                "page_size {} must be a positive multiple of the record size {}",
                self.page_size, RECORD_SIZE
            )));
        }
        if self.snapshot_poll_interval_ms == 0 {
            return Err(CountsError::Config(
                "snapshot_poll_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Records per page, used to size trailing capacity
    pub fn records_per_page(&self) -> usize {
        self.page_size / RECORD_SIZE
    }

    pub fn snapshot_poll_interval(&self) -> Duration {
        Duration::from_millis(self.snapshot_poll_interval_ms)
    }

    pub fn snapshot_timeout(&self) -> Duration {
        Duration::from_millis(self.snapshot_timeout_ms)
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the base file name
    pub fn base_name(mut self, name: impl Into<String>) -> Self {
        self.config.base_name = name.into();
        self
    }

    /// Set the page size (in bytes)
    pub fn page_size(mut self, size: usize) -> Self {
        self.config.page_size = size;
        self
    }

    /// Open the store read-only
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.config.read_only = read_only;
        self
    }

    /// Set the snapshot poll interval (in milliseconds)
    pub fn snapshot_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.snapshot_poll_interval_ms = ms;
        self
    }

    /// Set the snapshot timeout (in milliseconds)
    pub fn snapshot_timeout_ms(mut self, ms: u64) -> Self {
        self.config.snapshot_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
