//! Screenshot history: SQLite index, record types, and retention sweeping.
//!
//! The store pairs every image file on disk with one row in the index and
//! keeps the two in step through insert and delete. The sweeper walks the
//! index on a timer and applies the configured retention limits.

pub mod migrations;
pub mod record;
pub mod store;
pub mod sweeper;

pub use record::{Page, RecordDraft, RecordId, ScreenshotRecord, SearchQuery, StoreError};
pub use store::HistoryStore;
pub use sweeper::{RetentionPolicy, SweepReport, run_retention_loop, sweep_once};
