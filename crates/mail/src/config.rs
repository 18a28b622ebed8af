//! Configuration loading for the mail sink
//!
//! Supports loading [`SinkConfig`] from (in order of priority):
//! 1. An explicit JSON file
//! 2. Environment variables layered over the default config file
//!    (~/.config/mailsink/mailsink.json)
//! 3. Built-in defaults

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config filename in the mailsink config directory
pub const CONFIG_FILE: &str = "mailsink.json";

/// Overrides the database path
pub const DATABASE_ENV: &str = "MAILSINK_DATABASE";

/// Overrides the zstd compression level
pub const COMPRESSION_LEVEL_ENV: &str = "MAILSINK_COMPRESSION_LEVEL";

const DEFAULT_DATABASE_PATH: &str = "mailsink/mailsink.sqlite";

/// Where and how messages are stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// SQLite database file
    pub database_path: PathBuf,
    /// zstd level applied to raw message payloads
    pub compression_level: i32,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(".").join(DEFAULT_DATABASE_PATH),
            compression_level: crate::storage::DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl SinkConfig {
    /// Load configuration using the following priority:
    /// 1. Default config file (~/.config/mailsink/mailsink.json), if present
    /// 2. Built-in defaults
    ///
    /// Environment overrides are applied on top of either.
    pub fn load() -> Result<Self> {
        let base = if config::config_exists(CONFIG_FILE) {
            config::load_json(CONFIG_FILE)?
        } else {
            Self::default()
        };
        base.with_env_overrides()
    }

    /// Load configuration from a specific JSON file, ignoring the environment
    pub fn from_file(path: &Path) -> Result<Self> {
        let cfg: Self = config::load_json_file(path)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json).context("Failed to parse config JSON")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply `MAILSINK_DATABASE` and `MAILSINK_COMPRESSION_LEVEL`
    pub fn with_env_overrides(self) -> Result<Self> {
        self.apply_overrides(
            std::env::var(DATABASE_ENV).ok(),
            std::env::var(COMPRESSION_LEVEL_ENV).ok(),
        )
    }

    fn apply_overrides(
        mut self,
        database_path: Option<String>,
        compression_level: Option<String>,
    ) -> Result<Self> {
        if let Some(path) = database_path.filter(|p| !p.trim().is_empty()) {
            self.database_path = PathBuf::from(path);
        }
        if let Some(level) = compression_level {
            self.compression_level = level
                .trim()
                .parse()
                .with_context(|| format!("{COMPRESSION_LEVEL_ENV} is not an integer: {level}"))?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Check that the compression level is one zstd accepts
    pub fn validate(&self) -> Result<()> {
        let range = zstd::compression_level_range();
        if !range.contains(&self.compression_level) {
            bail!(
                "compression level {} outside supported range {}..={}",
                self.compression_level,
                range.start(),
                range.end()
            );
        }
        Ok(())
    }

    /// Write this configuration to the default config file
    pub fn save(&self) -> Result<PathBuf> {
        config::save_json(CONFIG_FILE, self)
    }

    /// Get the default config file path (~/.config/mailsink/mailsink.json)
    pub fn default_config_path() -> Option<PathBuf> {
        config::config_path(CONFIG_FILE)
    }
}
