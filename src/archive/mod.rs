//! Trigger-to-archive pipeline.
//!
//! Every screenshot, whatever triggered it, flows through the same path: the
//! [`TriggerCoordinator`] queues it, a single worker captures and encodes it,
//! the history store commits the file and index row together, and clipboard
//! and notification fan-out run last against the committed record.

pub mod coordinator;
pub mod dependencies;
pub mod pipeline;
pub mod types;

#[cfg(test)]
mod tests;

pub use coordinator::{PendingArchive, TriggerCoordinator};
pub use pipeline::encode_image;
pub use dependencies::{
    ArchiveDeps, CaptureBackend, ClipboardSink, EngineBackend, NotificationSink,
};
pub use types::{ArchiveError, ArchiveOutcome, TriggerSource};
