//! Hotkey triggers via Unix signals.
//!
//! Wayland has no global keybinding protocol, so capture hotkeys are
//! compositor bindings that signal the daemon: SIGUSR1 captures the full
//! screen, SIGUSR2 the active window. SIGTERM and SIGINT request shutdown.
//!
//! Hyprland example:
//!
//! ```text
//! bind = , Print, exec, pkill -SIGUSR1 snapvault
//! bind = SUPER, Print, exec, pkill -SIGUSR2 snapvault
//! ```

use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use log::{debug, info, warn};
use signal_hook::consts::signal::{SIGINT, SIGTERM, SIGUSR1, SIGUSR2};
use signal_hook::iterator::{Handle, Signals};
use tokio::sync::mpsc;

/// Events the signal listener hands to the daemon loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyEvent {
    CaptureFullscreen,
    CaptureWindow,
    Shutdown,
}

/// Dedicated thread turning process signals into [`HotkeyEvent`]s.
pub struct HotkeyListener {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl HotkeyListener {
    /// Registers the signal set and starts the listener thread. Events go out
    /// over `events` until [`stop`](Self::stop) closes the listener.
    pub fn start(events: mpsc::UnboundedSender<HotkeyEvent>) -> Result<Self> {
        let mut signals = Signals::new([SIGUSR1, SIGUSR2, SIGTERM, SIGINT])
            .context("failed to register signal handlers")?;
        let handle = signals.handle();

        let thread = thread::Builder::new()
            .name("snapvault-signals".to_string())
            .spawn(move || {
                for sig in signals.forever() {
                    let event = match sig {
                        SIGUSR1 => {
                            info!("Received SIGUSR1 - fullscreen capture");
                            HotkeyEvent::CaptureFullscreen
                        }
                        SIGUSR2 => {
                            info!("Received SIGUSR2 - window capture");
                            HotkeyEvent::CaptureWindow
                        }
                        SIGTERM | SIGINT => {
                            info!(
                                "Received {} - shutting down",
                                if sig == SIGTERM { "SIGTERM" } else { "SIGINT" }
                            );
                            HotkeyEvent::Shutdown
                        }
                        other => {
                            warn!("Received unexpected signal: {other}");
                            continue;
                        }
                    };
                    if events.send(event).is_err() {
                        debug!("Hotkey receiver dropped, stopping signal listener");
                        break;
                    }
                }
            })
            .context("failed to spawn signal listener thread")?;

        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    /// Stops the listener thread and waits for it to finish.
    pub fn stop(mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!("Signal listener thread panicked");
        }
    }
}

impl Drop for HotkeyListener {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{Duration, timeout};

    #[tokio::test]
    async fn signals_map_to_capture_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let listener = HotkeyListener::start(tx).unwrap();

        signal_hook::low_level::raise(SIGUSR1).unwrap();
        let event = timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, HotkeyEvent::CaptureFullscreen);

        signal_hook::low_level::raise(SIGUSR2).unwrap();
        let event = timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, HotkeyEvent::CaptureWindow);

        listener.stop();
    }
}
