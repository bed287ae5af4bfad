//! Application configuration management

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main application configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub notification: NotificationConfig,
    pub history: HistoryConfig,
    pub system: Option<SystemConfig>,
}

/// Notification behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Cooldown between identical failure notifications, in seconds
    pub dedup_window_secs: u64,
}

/// Task history configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Upper bound on retained history entries (oldest dropped first);
    /// None keeps everything until the user dismisses it
    pub max_entries: Option<usize>,
}

/// System-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    pub log_level: Option<String>, // "error", "warn", "info", "debug", "trace"
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            notification: NotificationConfig::default(),
            history: HistoryConfig::default(),
            system: Some(SystemConfig::default()),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            dedup_window_secs: 5,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_entries: None }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self { log_level: None }
    }
}

impl AppConfig {
    /// Resolve the platform config file path
    pub fn config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("com", "firmware-rescue", "firmware-rescue")
            .context("Failed to resolve project directories")?;
        Ok(dirs.config_dir().join("config.json"))
    }

    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Persist configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Persist configuration to an explicit path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config dir: {}", parent.display()))?;
        }
        let data = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, data)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.notification.dedup_window_secs == 0 || self.notification.dedup_window_secs > 300 {
            anyhow::bail!(
                "notification.dedup_window_secs must be in 1..=300, got {}",
                self.notification.dedup_window_secs
            );
        }
        if let Some(max) = self.history.max_entries {
            if max == 0 {
                anyhow::bail!("history.max_entries must be greater than zero when set");
            }
        }
        if let Some(system) = &self.system {
            if let Some(level) = &system.log_level {
                match level.as_str() {
                    "error" | "warn" | "info" | "debug" | "trace" => {}
                    other => anyhow::bail!("unknown log level: {}", other),
                }
            }
        }
        Ok(())
    }
}
