use std::sync::Arc;

use async_trait::async_trait;
use tokio::task;

use crate::capture::engine::CaptureEngine;
use crate::capture::types::{CaptureError, CaptureRequest, CapturedFrame};
use crate::config::SettingsSource;
use crate::history::{HistoryStore, ScreenshotRecord};

/// Abstraction over grabbing pixels for a capture request.
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    async fn capture(&self, request: CaptureRequest) -> Result<CapturedFrame, CaptureError>;
}

/// Abstraction over copying an encoded image to the clipboard.
pub trait ClipboardSink: Send + Sync {
    fn copy_image(&self, png_data: &[u8]) -> anyhow::Result<()>;
}

/// Abstraction over desktop notifications for finished captures.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify_saved(&self, record: &ScreenshotRecord) -> anyhow::Result<()>;
}

/// Bundle of dependencies used by the archive pipeline. Each component can be
/// mocked in tests.
#[derive(Clone)]
pub struct ArchiveDeps {
    pub backend: Arc<dyn CaptureBackend>,
    pub store: HistoryStore,
    pub clipboard: Arc<dyn ClipboardSink>,
    pub notifier: Arc<dyn NotificationSink>,
    /// Called at the start of every operation, so configuration edits apply
    /// to the next capture without a restart.
    pub settings: SettingsSource,
}

impl ArchiveDeps {
    /// Production wiring: real engine, Wayland clipboard, desktop
    /// notifications over D-Bus.
    pub fn new(store: HistoryStore, settings: SettingsSource) -> Self {
        Self {
            backend: Arc::new(EngineBackend::new()),
            store,
            clipboard: Arc::new(WaylandClipboard),
            notifier: Arc::new(DesktopNotifier),
            settings,
        }
    }
}

/// Default backend: the real capture engine behind `spawn_blocking`, since
/// compositor round-trips are synchronous.
pub struct EngineBackend {
    engine: Arc<CaptureEngine>,
}

impl EngineBackend {
    pub fn new() -> Self {
        Self {
            engine: Arc::new(CaptureEngine::new()),
        }
    }
}

impl Default for EngineBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureBackend for EngineBackend {
    async fn capture(&self, request: CaptureRequest) -> Result<CapturedFrame, CaptureError> {
        let engine = self.engine.clone();
        task::spawn_blocking(move || engine.capture(&request))
            .await
            .map_err(|err| CaptureError::CaptureFailed(format!("capture task failed: {err}")))?
    }
}

struct WaylandClipboard;

impl ClipboardSink for WaylandClipboard {
    fn copy_image(&self, png_data: &[u8]) -> anyhow::Result<()> {
        crate::clipboard::copy_png(png_data)
    }
}

struct DesktopNotifier;

#[async_trait]
impl NotificationSink for DesktopNotifier {
    async fn notify_saved(&self, record: &ScreenshotRecord) -> anyhow::Result<()> {
        crate::notification::notify_screenshot_saved(record).await
    }
}
