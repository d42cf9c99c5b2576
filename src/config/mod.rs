//! Configuration file support for snapvault.
//!
//! This module handles loading and validating user settings from the configuration file
//! located at `~/.config/snapvault/config.toml`. Settings include the archive location,
//! filename templates, retention policy, and clipboard/notification behavior.
//!
//! If no config file exists, sensible defaults are used automatically. Callers re-read
//! the configuration at the start of each operation, so edits apply to the next capture
//! without restarting the daemon.

pub mod enums;
pub mod types;

// Re-export commonly used types at module level
pub use enums::{ImageFormat, OrganizeMode};
pub use types::{
    ClipboardConfig, NotificationConfig, RetentionConfig, StorageConfig, TriggerConfig,
};

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

/// Closure long-running tasks call to pick up the configuration on disk at
/// the time each operation runs.
pub type SettingsSource = Arc<dyn Fn() -> Config + Send + Sync>;

/// Main configuration structure containing all user settings.
///
/// This is the root configuration type that gets deserialized from the TOML file.
/// All fields have sensible defaults and will use those if not specified in the config file.
///
/// # Example TOML
/// ```toml
/// [storage]
/// save_dir = "~/Pictures/Snapvault"
/// organize = "by-date"
/// filename_template = "%Y%m%d_%H%M%S_{window}"
/// format = "png"
///
/// [retention]
/// enabled = true
/// max_age_days = 30
/// max_count = 1000
///
/// [clipboard]
/// copy_on_capture = true
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Archive location and filename settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Trigger queueing and busy-timeout settings
    #[serde(default)]
    pub triggers: TriggerConfig,

    /// Retention sweep settings
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Clipboard integration
    #[serde(default)]
    pub clipboard: ClipboardConfig,

    /// Desktop notifications
    #[serde(default)]
    pub notifications: NotificationConfig,
}

impl Config {
    /// Validates and clamps all configuration values to acceptable ranges.
    ///
    /// Invalid values are clamped to the nearest valid value and a warning is
    /// logged so a typo in the config file cannot stall the daemon.
    ///
    /// Validated ranges:
    /// - `triggers.store_busy_timeout_ms`: 100 - 60000
    /// - `retention.sweep_interval_hours`: 1 - 168
    /// - `storage.filename_template` and `storage.save_dir`: non-empty
    fn validate_and_clamp(&mut self) {
        if self.storage.save_dir.trim().is_empty() {
            log::warn!("Empty storage.save_dir, falling back to default");
            self.storage.save_dir = StorageConfig::default().save_dir;
        }

        if self.storage.filename_template.trim().is_empty() {
            log::warn!("Empty storage.filename_template, falling back to default");
            self.storage.filename_template = StorageConfig::default().filename_template;
        }

        // A bad strftime specifier would error at format time, deep inside a
        // capture. Catch it here instead.
        let template_broken = chrono::format::StrftimeItems::new(&self.storage.filename_template)
            .any(|item| matches!(item, chrono::format::Item::Error));
        if template_broken {
            log::warn!(
                "Invalid strftime specifier in filename_template '{}', falling back to default",
                self.storage.filename_template
            );
            self.storage.filename_template = StorageConfig::default().filename_template;
        }

        // Busy timeout: 100ms - 60s
        if !(100..=60_000).contains(&self.triggers.store_busy_timeout_ms) {
            log::warn!(
                "Invalid store_busy_timeout_ms {}, clamping to 100-60000 range",
                self.triggers.store_busy_timeout_ms
            );
            self.triggers.store_busy_timeout_ms =
                self.triggers.store_busy_timeout_ms.clamp(100, 60_000);
        }

        // Sweep interval: 1 hour - 1 week
        if !(1..=168).contains(&self.retention.sweep_interval_hours) {
            log::warn!(
                "Invalid sweep_interval_hours {}, clamping to 1-168 range",
                self.retention.sweep_interval_hours
            );
            self.retention.sweep_interval_hours =
                self.retention.sweep_interval_hours.clamp(1, 168);
        }
    }

    /// Returns the path to the configuration file.
    ///
    /// The config file is located at `~/.config/snapvault/config.toml`.
    ///
    /// # Errors
    /// Returns an error if the config directory cannot be determined (e.g., HOME not set).
    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not find config directory")?
            .join("snapvault");

        Ok(config_dir.join("config.toml"))
    }

    /// Returns the path of the history index database.
    ///
    /// The index lives at `~/.local/share/snapvault/history.db` (XDG data dir).
    ///
    /// # Errors
    /// Returns an error if the data directory cannot be determined.
    pub fn history_db_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .context("Could not find data directory")?
            .join("snapvault");

        Ok(data_dir.join("history.db"))
    }

    /// The archive root with `~` expanded.
    pub fn save_root(&self) -> PathBuf {
        crate::util::expand_tilde(&self.storage.save_dir)
    }

    /// Loads configuration from file, or returns defaults if not found.
    ///
    /// All loaded values are validated and clamped to acceptable ranges.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The config directory path cannot be determined
    /// - The file exists but cannot be read
    /// - The file exists but contains invalid TOML syntax
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if !config_path.exists() {
            info!("Config file not found, using defaults");
            debug!("Expected config at: {}", config_path.display());
            return Ok(Self::default());
        }

        let config_str = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config from {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config from {}", config_path.display()))?;

        config.validate_and_clamp();

        debug!("Loaded config from {}", config_path.display());

        Ok(config)
    }

    /// Loads configuration, falling back to defaults on any error.
    ///
    /// Used on the capture and sweep paths where a malformed config file should
    /// cost a logged error, not a dropped trigger.
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(err) => {
                log::error!("Failed to load config, using defaults: {err:#}");
                Self::default()
            }
        }
    }

    /// Saves the current configuration to file.
    ///
    /// Serializes the config to TOML format and writes it to `~/.config/snapvault/config.toml`.
    /// Creates the parent directory if it doesn't exist.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The config directory cannot be created
    /// - The config cannot be serialized to TOML
    /// - The file cannot be written
    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let config_str = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&config_path, config_str)
            .with_context(|| format!("Failed to write config to {}", config_path.display()))?;

        info!("Saved config to {}", config_path.display());
        Ok(())
    }

    /// Creates a default configuration file with documentation comments.
    ///
    /// Writes the example config from `config.example.toml` to the user's config
    /// directory, including the compositor keybinding snippets for the daemon's
    /// capture signals.
    ///
    /// # Errors
    /// Returns an error if:
    /// - A config file already exists at the target path
    /// - The config directory cannot be created
    /// - The file cannot be written
    pub fn create_default_file() -> Result<PathBuf> {
        let config_path = Self::get_config_path()?;

        if config_path.exists() {
            return Err(anyhow::anyhow!(
                "Config file already exists at {}",
                config_path.display()
            ));
        }

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let default_config = include_str!("../../config.example.toml");
        fs::write(&config_path, default_config)?;

        info!("Created default config at {}", config_path.display());
        Ok(config_path)
    }
}
