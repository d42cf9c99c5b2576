//! Record types and errors for the screenshot history store.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Stable record identifier. SQLite assigns these monotonically and never
/// reuses one, even after deletions.
pub type RecordId = i64;

/// One archived screenshot as stored in the index.
#[derive(Debug, Clone, Serialize)]
pub struct ScreenshotRecord {
    pub id: RecordId,
    pub file_path: PathBuf,
    pub created_at: DateTime<Utc>,
    /// Capture mode label: "fullscreen", "window", or "region".
    pub mode: String,
    pub window_title: Option<String>,
    pub application_name: Option<String>,
    pub width: u32,
    pub height: u32,
    pub file_size: u64,
    pub format: String,
}

/// Insert input: everything a [`ScreenshotRecord`] carries except the fields
/// the store derives (`id`, `file_size`).
#[derive(Debug, Clone)]
pub struct RecordDraft {
    /// Final destination path; the caller has already run collision
    /// disambiguation.
    pub file_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub mode: String,
    pub window_title: Option<String>,
    pub application_name: Option<String>,
    pub width: u32,
    pub height: u32,
    pub format: String,
}

/// Filters for [`HistoryStore::search`](super::HistoryStore::search).
/// Empty query matches everything.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    /// Case-insensitive substring match against window title, application
    /// name, and file path.
    pub text: Option<String>,
    /// Case-insensitive substring match against the application name only.
    pub application: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

/// Offset/limit pagination window.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub offset: u32,
    pub limit: u32,
}

impl Page {
    pub fn new(offset: u32, limit: u32) -> Self {
        Self { offset, limit }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// Errors from the history store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record {0} not found")]
    NotFound(RecordId),

    #[error("history store is busy, try again")]
    Busy,

    #[error("history database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("screenshot file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("destination already exists: {}", .0.display())]
    DestinationExists(PathBuf),

    #[error("history store worker unavailable")]
    WorkerGone,

    #[error("database schema version {found} is newer than this build supports ({supported})")]
    UnsupportedSchema { found: i32, supported: i32 },

    #[error("invalid record data: {0}")]
    Corrupt(String),
}
