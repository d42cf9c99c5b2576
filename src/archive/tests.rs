use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use tempfile::TempDir;
use tokio::time::{Duration, sleep};

use super::coordinator::TriggerCoordinator;
use super::dependencies::{ArchiveDeps, CaptureBackend, ClipboardSink, NotificationSink};
use super::pipeline::encode_image;
use super::types::{ArchiveError, TriggerSource};
use crate::capture::types::{
    CaptureContext, CaptureError, CaptureMode, CaptureRequest, CapturedFrame,
};
use crate::config::{Config, ImageFormat, OrganizeMode, SettingsSource};
use crate::history::{HistoryStore, ScreenshotRecord};

const PNG_SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

#[derive(Clone)]
struct MockBackend {
    delay: Duration,
    error: Arc<Mutex<Option<CaptureError>>>,
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockBackend {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            error: Arc::new(Mutex::new(None)),
            calls: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn fail_next(&self, error: CaptureError) {
        *self.error.lock().unwrap() = Some(error);
    }
}

#[async_trait]
impl CaptureBackend for MockBackend {
    async fn capture(&self, request: CaptureRequest) -> Result<CapturedFrame, CaptureError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(err) = self.error.lock().unwrap().take() {
            return Err(err);
        }
        Ok(test_frame(&request))
    }
}

fn test_frame(request: &CaptureRequest) -> CapturedFrame {
    CapturedFrame {
        image: RgbaImage::from_pixel(4, 4, Rgba([120, 30, 60, 255])),
        context: CaptureContext {
            timestamp: request.requested_at,
            monitor_label: "eDP-1".to_string(),
            window_title: Some("Test Window".to_string()),
            application_name: Some("testapp".to_string()),
            width: 4,
            height: 4,
            mode_label: request.mode.label(),
        },
    }
}

#[derive(Clone)]
struct MockClipboard {
    should_fail: bool,
    calls: Arc<AtomicUsize>,
    last_bytes: Arc<Mutex<Option<Vec<u8>>>>,
}

impl MockClipboard {
    fn new(should_fail: bool) -> Self {
        Self {
            should_fail,
            calls: Arc::new(AtomicUsize::new(0)),
            last_bytes: Arc::new(Mutex::new(None)),
        }
    }
}

impl ClipboardSink for MockClipboard {
    fn copy_image(&self, png_data: &[u8]) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_bytes.lock().unwrap() = Some(png_data.to_vec());
        if self.should_fail {
            anyhow::bail!("clipboard failure");
        }
        Ok(())
    }
}

#[derive(Clone)]
struct MockNotifier {
    should_fail: bool,
    calls: Arc<AtomicUsize>,
}

impl MockNotifier {
    fn new(should_fail: bool) -> Self {
        Self {
            should_fail,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl NotificationSink for MockNotifier {
    async fn notify_saved(&self, _record: &ScreenshotRecord) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail {
            anyhow::bail!("notification failure");
        }
        Ok(())
    }
}

fn test_settings(save_dir: PathBuf, format: ImageFormat) -> SettingsSource {
    Arc::new(move || {
        let mut config = Config::default();
        config.storage.save_dir = save_dir.to_string_lossy().into_owned();
        config.storage.organize = OrganizeMode::Flat;
        config.storage.format = format;
        config.triggers.store_busy_timeout_ms = 200;
        config
    })
}

fn test_deps(
    dir: &TempDir,
    backend: MockBackend,
    clipboard: MockClipboard,
    notifier: MockNotifier,
) -> ArchiveDeps {
    let store = HistoryStore::open(dir.path().join("history.db")).unwrap();
    ArchiveDeps {
        backend: Arc::new(backend),
        store,
        clipboard: Arc::new(clipboard),
        notifier: Arc::new(notifier),
        settings: test_settings(dir.path().join("shots"), ImageFormat::Png),
    }
}

fn request() -> CaptureRequest {
    CaptureRequest::new(CaptureMode::FullScreen { monitor: None })
}

#[tokio::test]
async fn archive_saves_file_and_indexes_record() {
    let dir = TempDir::new().unwrap();
    let clipboard = MockClipboard::new(false);
    let notifier = MockNotifier::new(false);
    let deps = test_deps(
        &dir,
        MockBackend::new(Duration::ZERO),
        clipboard.clone(),
        notifier.clone(),
    );
    let store = deps.store.clone();
    let coordinator = TriggerCoordinator::new(&tokio::runtime::Handle::current(), deps);

    let outcome = coordinator
        .submit(TriggerSource::Cli, request(), false)
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert!(outcome.copied_to_clipboard);
    assert!(outcome.notified);
    assert_eq!(clipboard.calls.load(Ordering::SeqCst), 1);
    assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);

    let bytes = std::fs::read(&outcome.record.file_path).unwrap();
    assert_eq!(&bytes[0..8], &PNG_SIGNATURE);

    let fetched = store.get(outcome.record.id).await.unwrap();
    assert_eq!(fetched.mode, "fullscreen");
    assert_eq!(fetched.window_title.as_deref(), Some("Test Window"));
    assert_eq!(fetched.file_size, bytes.len() as u64);
}

#[tokio::test]
async fn test_fanout_failures_do_not_fail_the_archive() {
    let dir = TempDir::new().unwrap();
    let clipboard = MockClipboard::new(true);
    let notifier = MockNotifier::new(true);
    let deps = test_deps(
        &dir,
        MockBackend::new(Duration::ZERO),
        clipboard.clone(),
        notifier.clone(),
    );
    let store = deps.store.clone();
    let coordinator = TriggerCoordinator::new(&tokio::runtime::Handle::current(), deps);

    let outcome = coordinator
        .submit(TriggerSource::Cli, request(), false)
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert!(!outcome.copied_to_clipboard);
    assert!(!outcome.notified);
    assert_eq!(clipboard.calls.load(Ordering::SeqCst), 1);
    assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
    // The record committed regardless.
    assert!(store.get(outcome.record.id).await.is_ok());
    assert!(outcome.record.file_path.exists());
}

#[tokio::test]
async fn captures_run_one_at_a_time_with_distinct_names() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new(Duration::from_millis(50));
    let deps = test_deps(
        &dir,
        backend.clone(),
        MockClipboard::new(false),
        MockNotifier::new(false),
    );
    let store = deps.store.clone();
    let coordinator = TriggerCoordinator::new(&tokio::runtime::Handle::current(), deps);

    let mut pending = Vec::new();
    for _ in 0..3 {
        pending.push(
            coordinator
                .submit(TriggerSource::Hotkey, request(), false)
                .unwrap(),
        );
    }
    assert_eq!(coordinator.pending_count(), 3);

    let mut paths = HashSet::new();
    for handle in pending {
        let outcome = handle.wait().await.unwrap();
        assert!(
            paths.insert(outcome.record.file_path.clone()),
            "duplicate path {:?}",
            outcome.record.file_path
        );
        assert!(outcome.record.file_path.exists());
    }

    assert_eq!(backend.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(store.count().await.unwrap(), 3);
    assert_eq!(coordinator.pending_count(), 0);
}

#[tokio::test]
async fn automatic_triggers_coalesce_while_one_is_pending() {
    let dir = TempDir::new().unwrap();
    let deps = test_deps(
        &dir,
        MockBackend::new(Duration::from_millis(80)),
        MockClipboard::new(false),
        MockNotifier::new(false),
    );
    let store = deps.store.clone();
    let coordinator = TriggerCoordinator::new(&tokio::runtime::Handle::current(), deps);

    let first = coordinator
        .submit(TriggerSource::Automatic, request(), true)
        .unwrap();
    let second = coordinator.submit(TriggerSource::Automatic, request(), true);
    let third = coordinator.submit(TriggerSource::Automatic, request(), true);
    assert!(matches!(second.unwrap_err(), ArchiveError::Busy(_)));
    assert!(matches!(third.unwrap_err(), ArchiveError::Busy(_)));

    // Interactive sources still queue during the same window.
    let hotkey = coordinator
        .submit(TriggerSource::Hotkey, request(), true)
        .unwrap();

    first.wait().await.unwrap();
    hotkey.wait().await.unwrap();
    assert_eq!(store.count().await.unwrap(), 2);

    // Queue drained, automatic triggers get through again.
    coordinator
        .submit(TriggerSource::Automatic, request(), true)
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(store.count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_coalescing_off_archives_every_trigger() {
    let dir = TempDir::new().unwrap();
    let deps = test_deps(
        &dir,
        MockBackend::new(Duration::from_millis(20)),
        MockClipboard::new(false),
        MockNotifier::new(false),
    );
    let store = deps.store.clone();
    let coordinator = TriggerCoordinator::new(&tokio::runtime::Handle::current(), deps);

    let mut pending = Vec::new();
    for _ in 0..3 {
        pending.push(
            coordinator
                .submit(TriggerSource::Automatic, request(), false)
                .unwrap(),
        );
    }
    for handle in pending {
        handle.wait().await.unwrap();
    }
    assert_eq!(store.count().await.unwrap(), 3);
}

#[tokio::test]
async fn cancelled_submission_never_reaches_the_backend() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new(Duration::from_millis(80));
    let deps = test_deps(
        &dir,
        backend.clone(),
        MockClipboard::new(false),
        MockNotifier::new(false),
    );
    let store = deps.store.clone();
    let coordinator = TriggerCoordinator::new(&tokio::runtime::Handle::current(), deps);

    let first = coordinator
        .submit(TriggerSource::Cli, request(), false)
        .unwrap();
    let second = coordinator
        .submit(TriggerSource::Cli, request(), false)
        .unwrap();
    second.cancel_token().cancel();

    first.wait().await.unwrap();
    let err = second.wait().await.unwrap_err();
    assert!(matches!(err, ArchiveError::Cancelled));

    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn coordinator_keeps_serving_after_a_failed_capture() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new(Duration::ZERO);
    backend.fail_next(CaptureError::CaptureFailed("compositor hiccup".to_string()));
    let deps = test_deps(
        &dir,
        backend.clone(),
        MockClipboard::new(false),
        MockNotifier::new(false),
    );
    let store = deps.store.clone();
    let coordinator = TriggerCoordinator::new(&tokio::runtime::Handle::current(), deps);

    let err = coordinator
        .submit(TriggerSource::Cli, request(), false)
        .unwrap()
        .wait()
        .await
        .unwrap_err();
    assert!(matches!(err, ArchiveError::Capture(_)));
    assert_eq!(store.count().await.unwrap(), 0);

    coordinator
        .submit(TriggerSource::Cli, request(), false)
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn busy_store_surfaces_as_a_busy_error() {
    let dir = TempDir::new().unwrap();
    let deps = test_deps(
        &dir,
        MockBackend::new(Duration::ZERO),
        MockClipboard::new(false),
        MockNotifier::new(false),
    );
    let store = deps.store.clone();
    let coordinator = TriggerCoordinator::new(&tokio::runtime::Handle::current(), deps);

    let gate = store.hold_write_gate().await;
    let err = coordinator
        .submit(TriggerSource::Cli, request(), false)
        .unwrap()
        .wait()
        .await
        .unwrap_err();
    assert!(err.is_busy(), "unexpected error: {err:?}");
    assert_eq!(store.count().await.unwrap(), 0);

    drop(gate);
    coordinator
        .submit(TriggerSource::Cli, request(), false)
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn jpeg_archive_still_copies_png_to_clipboard() {
    let dir = TempDir::new().unwrap();
    let clipboard = MockClipboard::new(false);
    let store = HistoryStore::open(dir.path().join("history.db")).unwrap();
    let deps = ArchiveDeps {
        backend: Arc::new(MockBackend::new(Duration::ZERO)),
        store: store.clone(),
        clipboard: Arc::new(clipboard.clone()),
        notifier: Arc::new(MockNotifier::new(false)),
        settings: test_settings(dir.path().join("shots"), ImageFormat::Jpeg),
    };
    let coordinator = TriggerCoordinator::new(&tokio::runtime::Handle::current(), deps);

    let outcome = coordinator
        .submit(TriggerSource::Cli, request(), false)
        .unwrap()
        .wait()
        .await
        .unwrap();

    // JPEG on disk, PNG on the clipboard.
    let file_bytes = std::fs::read(&outcome.record.file_path).unwrap();
    assert_eq!(&file_bytes[0..2], &[0xFF, 0xD8]);
    assert!(outcome.record.file_path.to_string_lossy().ends_with(".jpg"));

    let clipboard_bytes = clipboard.last_bytes.lock().unwrap().clone().unwrap();
    assert_eq!(&clipboard_bytes[0..8], &PNG_SIGNATURE);
}

#[test]
fn submit_fails_when_coordinator_is_gone() {
    let coordinator = TriggerCoordinator::with_closed_channel_for_test();
    let err = coordinator
        .submit(TriggerSource::Cli, request(), false)
        .unwrap_err();
    assert!(matches!(err, ArchiveError::Internal(_)));
    assert_eq!(coordinator.pending_count(), 0);
}

#[test]
fn encode_produces_valid_png_and_jpeg() {
    let image = RgbaImage::from_pixel(8, 8, Rgba([200, 100, 50, 255]));

    let png = encode_image(&image, ImageFormat::Png).unwrap();
    assert_eq!(&png[0..8], &PNG_SIGNATURE);

    let jpeg = encode_image(&image, ImageFormat::Jpeg).unwrap();
    assert_eq!(&jpeg[0..2], &[0xFF, 0xD8]);
}
