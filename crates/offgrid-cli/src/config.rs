//! OffGridChat CLI configuration
//!
//! Loaded from an optional TOML file. Every section and field is optional;
//! anything missing keeps its default. A minimal file:
//!
//! ```toml
//! [ble]
//! name_tokens = ["OffGridChat"]
//! known_addresses = ["48:CA:43:3A:67:51"]
//! write_chunk_size = 180
//!
//! [chat]
//! attachments_dir = "/tmp/offgrid"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use offgrid_ble::BleTransportConfig;
use serde::{Deserialize, Serialize};

use crate::error::{CliError, Result};

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the CLI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// BLE link settings
    pub ble: BleTransportConfig,
    /// Chat session settings
    pub chat: ChatConfig,
}

/// Chat session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Where received attachments are written; defaults to the user's
    /// local data directory
    pub attachments_dir: Option<PathBuf>,
    /// How long to wait for the link to become ready
    pub connect_timeout_secs: u64,
    /// Messages kept for `/history`
    pub history_limit: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            attachments_dir: None,
            connect_timeout_secs: 30,
            history_limit: 500,
        }
    }
}

impl ChatConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Configured attachment directory, or `<data dir>/offgrid/attachments`
    pub fn attachments_dir(&self) -> PathBuf {
        self.attachments_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("offgrid")
                .join("attachments")
        })
    }
}

// ----------------------------------------------------------------------------
// Loading
// ----------------------------------------------------------------------------

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            CliError::Config(format!("Failed to read {}: {}", path.as_ref().display(), e))
        })?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<()> {
        self.ble.validate().map_err(CliError::Config)?;

        if self.chat.connect_timeout_secs == 0 {
            return Err(CliError::Config(
                "Connect timeout must be greater than 0".to_string(),
            ));
        }
        if self.chat.history_limit == 0 {
            return Err(CliError::Config(
                "History limit must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
