//! Daemon mode: resident service that archives captures on signal triggers
//! and sweeps retention in the background.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::archive::{ArchiveDeps, ArchiveError, TriggerCoordinator, TriggerSource};
use crate::capture::types::{CaptureMode, CaptureRequest};
use crate::config::{Config, SettingsSource};
use crate::history::{HistoryStore, run_retention_loop};
use crate::hotkey::{HotkeyEvent, HotkeyListener};
use crate::{clipboard, notification};

/// How long shutdown waits for captures already in the queue.
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Daemon {
    runtime: tokio::runtime::Runtime,
}

impl Daemon {
    pub fn new() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to start async runtime")?;
        Ok(Self { runtime })
    }

    /// Runs until SIGTERM or SIGINT arrives.
    pub fn run(&self) -> Result<()> {
        self.runtime.block_on(run_daemon())
    }
}

async fn run_daemon() -> Result<()> {
    info!("Starting snapvault daemon");
    info!("Send SIGUSR1 for a fullscreen capture (e.g., pkill -SIGUSR1 snapvault)");
    info!("Send SIGUSR2 for an active-window capture");
    info!("Hyprland: bind = , Print, exec, pkill -SIGUSR1 snapvault");

    let settings: SettingsSource = Arc::new(Config::load_or_default);
    let startup_config = settings();
    if startup_config.clipboard.copy_on_capture && !clipboard::is_available() {
        warn!("wl-copy not found; clipboard copies will use the library fallback");
    }

    let db_path = Config::history_db_path()?;
    let store = HistoryStore::open(db_path)
        .context("failed to open history database")?;
    info!("History database: {}", store.db_path().display());

    let coordinator = TriggerCoordinator::new(
        &tokio::runtime::Handle::current(),
        ArchiveDeps::new(store.clone(), settings.clone()),
    );

    let shutdown = CancellationToken::new();
    let sweeper = tokio::spawn(run_retention_loop(
        store.clone(),
        settings.clone(),
        shutdown.clone(),
    ));

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let listener = HotkeyListener::start(event_tx).context("failed to start hotkey listener")?;

    info!("Daemon ready - waiting for capture signals");

    while let Some(event) = event_rx.recv().await {
        let Some(mode) = mode_for_event(event) else {
            break;
        };
        submit_hotkey_capture(&coordinator, &settings, mode);
    }

    info!("Daemon shutting down");
    listener.stop();
    shutdown.cancel();
    if sweeper.await.is_err() {
        warn!("Retention sweeper panicked during shutdown");
    }

    // Let captures already in the queue finish before tearing down.
    let drained = tokio::time::timeout(SHUTDOWN_DRAIN_TIMEOUT, async {
        while coordinator.pending_count() > 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    if drained.is_err() {
        warn!("Shutting down with a capture still in flight");
    }

    info!("Daemon stopped");
    Ok(())
}

fn mode_for_event(event: HotkeyEvent) -> Option<CaptureMode> {
    match event {
        HotkeyEvent::CaptureFullscreen => Some(CaptureMode::FullScreen { monitor: None }),
        HotkeyEvent::CaptureWindow => Some(CaptureMode::ActiveWindow),
        HotkeyEvent::Shutdown => None,
    }
}

/// Queues a capture and spawns a task to watch it. Failures reach the user
/// through a notification; the daemon itself keeps running either way.
fn submit_hotkey_capture(
    coordinator: &TriggerCoordinator,
    settings: &SettingsSource,
    mode: CaptureMode,
) {
    let config = settings();
    match coordinator.submit(
        TriggerSource::Hotkey,
        CaptureRequest::new(mode),
        config.triggers.coalesce_automatic,
    ) {
        Ok(pending) => {
            let notify_failures = config.notifications.enabled;
            tokio::spawn(async move {
                match pending.wait().await {
                    Ok(_) | Err(ArchiveError::Cancelled) => {}
                    Err(err) => {
                        if notify_failures
                            && let Err(notify_err) = notification::send(
                                "Capture failed",
                                &err.to_string(),
                                Some("dialog-error"),
                            )
                            .await
                        {
                            debug!("Could not report capture failure: {notify_err:#}");
                        }
                    }
                }
            });
        }
        Err(err) => warn!("Could not queue capture: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_map_to_capture_modes() {
        assert_eq!(
            mode_for_event(HotkeyEvent::CaptureFullscreen),
            Some(CaptureMode::FullScreen { monitor: None })
        );
        assert_eq!(
            mode_for_event(HotkeyEvent::CaptureWindow),
            Some(CaptureMode::ActiveWindow)
        );
        assert_eq!(mode_for_event(HotkeyEvent::Shutdown), None);
    }
}
