use thiserror::Error;

use crate::capture::types::CaptureError;
use crate::history::{ScreenshotRecord, StoreError};

/// Where an archive request came from. Interactive sources always queue;
/// automatic ones can be coalesced away while another capture is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Hotkey,
    Ui,
    Cli,
    Automatic,
}

impl TriggerSource {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Hotkey => "hotkey",
            Self::Ui => "ui",
            Self::Cli => "cli",
            Self::Automatic => "automatic",
        }
    }

    pub(crate) fn is_automatic(&self) -> bool {
        matches!(self, Self::Automatic)
    }
}

/// A capture that made it all the way into the archive.
#[derive(Debug, Clone)]
pub struct ArchiveOutcome {
    pub record: ScreenshotRecord,
    /// Whether the image landed on the clipboard. Fan-out failures do not
    /// fail the archive, so this can be false on a successful capture.
    pub copied_to_clipboard: bool,
    pub notified: bool,
}

/// Errors from the trigger-to-archive pipeline.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to encode image: {0}")]
    Encode(String),

    #[error("capture pipeline is busy: {0}")]
    Busy(&'static str),

    #[error("capture was cancelled before it ran")]
    Cancelled,

    #[error("archive pipeline error: {0}")]
    Internal(String),
}

impl ArchiveError {
    /// True when the request itself was invalid, as opposed to the system
    /// failing to serve it.
    pub fn is_user_error(&self) -> bool {
        match self {
            Self::Capture(err) => err.is_user_error(),
            _ => false,
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy(_) | Self::Store(StoreError::Busy))
    }
}
