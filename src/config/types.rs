//! Configuration type definitions.

use super::enums::{ImageFormat, OrganizeMode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Storage and naming settings.
///
/// Controls where archived screenshots land on disk and how their filenames
/// are built. Paths may start with `~` which is expanded to the home directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for the screenshot archive
    #[serde(default = "default_save_dir")]
    pub save_dir: String,

    /// Subdirectory scheme: "by-date" (YYYY/MM/DD), "by-application", or "flat"
    #[serde(default = "default_organize")]
    pub organize: OrganizeMode,

    /// Filename template. Understands chrono strftime specifiers plus the
    /// placeholders `{window}` (focused window title) and `{app}` (application
    /// name); both fall back to "screen" when unknown.
    #[serde(default = "default_filename_template")]
    pub filename_template: String,

    /// Image encoding: "png" or "jpeg"
    #[serde(default = "default_format")]
    pub format: ImageFormat,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            save_dir: default_save_dir(),
            organize: default_organize(),
            filename_template: default_filename_template(),
            format: default_format(),
        }
    }
}

/// Trigger handling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Drop automatic (non-interactive) triggers with a busy result while
    /// another capture is queued or running, instead of queueing them
    #[serde(default = "default_coalesce_automatic")]
    pub coalesce_automatic: bool,

    /// How long a capture may wait for the history store's write lock before
    /// giving up with a busy result, in milliseconds (valid range: 100 - 60000)
    #[serde(default = "default_store_busy_timeout_ms")]
    pub store_busy_timeout_ms: u64,
}

impl TriggerConfig {
    /// The store-lock wait as a [`Duration`].
    pub fn store_busy_timeout(&self) -> Duration {
        Duration::from_millis(self.store_busy_timeout_ms)
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            coalesce_automatic: default_coalesce_automatic(),
            store_busy_timeout_ms: default_store_busy_timeout_ms(),
        }
    }
}

/// Retention sweeping settings.
///
/// When enabled, a background sweep deletes the oldest archived screenshots
/// past the configured age or count. Zero disables the respective limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Master switch for retention sweeping
    #[serde(default = "default_retention_enabled")]
    pub enabled: bool,

    /// Delete records older than this many days (0 = no age limit)
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,

    /// Keep at most this many records, oldest deleted first (0 = no cap)
    #[serde(default = "default_max_count")]
    pub max_count: u64,

    /// Hours between periodic sweeps in daemon mode (valid range: 1 - 168)
    #[serde(default = "default_sweep_interval_hours")]
    pub sweep_interval_hours: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: default_retention_enabled(),
            max_age_days: default_max_age_days(),
            max_count: default_max_count(),
            sweep_interval_hours: default_sweep_interval_hours(),
        }
    }
}

/// Clipboard integration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipboardConfig {
    /// Copy every archived screenshot to the Wayland clipboard
    #[serde(default = "default_copy_on_capture")]
    pub copy_on_capture: bool,
}

impl Default for ClipboardConfig {
    fn default() -> Self {
        Self {
            copy_on_capture: default_copy_on_capture(),
        }
    }
}

/// Desktop notification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Send a desktop notification after each archived screenshot
    #[serde(default = "default_notifications_enabled")]
    pub enabled: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: default_notifications_enabled(),
        }
    }
}

fn default_save_dir() -> String {
    "~/Pictures/Snapvault".to_string()
}

fn default_organize() -> OrganizeMode {
    OrganizeMode::ByDate
}

fn default_filename_template() -> String {
    "%Y%m%d_%H%M%S_{window}".to_string()
}

fn default_format() -> ImageFormat {
    ImageFormat::Png
}

fn default_coalesce_automatic() -> bool {
    false
}

fn default_store_busy_timeout_ms() -> u64 {
    5000
}

fn default_retention_enabled() -> bool {
    false
}

fn default_max_age_days() -> u32 {
    30
}

fn default_max_count() -> u64 {
    1000
}

fn default_sweep_interval_hours() -> u64 {
    24
}

fn default_copy_on_capture() -> bool {
    true
}

fn default_notifications_enabled() -> bool {
    true
}
