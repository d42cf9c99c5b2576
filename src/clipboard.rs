//! Clipboard integration for captured screenshots.

use std::process::{Command, Stdio};

use anyhow::{Context, Result, bail};
use wl_clipboard_rs::copy::{MimeType, Options, ServeRequests, Source};

/// Copy PNG bytes onto the Wayland clipboard.
///
/// Prefers the wl-copy command, whose spawned process keeps serving the
/// selection after we move on; falls back to wl-clipboard-rs when the command
/// is unavailable.
pub fn copy_png(png_data: &[u8]) -> Result<()> {
    log::debug!("Copying screenshot to clipboard ({} bytes)", png_data.len());

    match copy_via_command(png_data) {
        Ok(()) => Ok(()),
        Err(cmd_err) => {
            log::warn!("wl-copy failed ({cmd_err:#}), falling back to wl-clipboard-rs");
            copy_via_library(png_data).with_context(|| format!("wl-copy also failed: {cmd_err:#}"))
        }
    }
}

fn copy_via_command(png_data: &[u8]) -> Result<()> {
    use std::io::Write;

    let mut child = Command::new("wl-copy")
        .arg("--type")
        .arg("image/png")
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .context("failed to spawn wl-copy (is wl-clipboard installed?)")?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(png_data)
            .context("failed to write to wl-copy stdin")?;
    }

    let output = child
        .wait_with_output()
        .context("failed to wait for wl-copy")?;
    if !output.status.success() {
        bail!(
            "wl-copy exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

fn copy_via_library(png_data: &[u8]) -> Result<()> {
    let mut opts = Options::new();
    // Serve a single paste, then hand the selection to the compositor.
    opts.serve_requests(ServeRequests::Only(1));
    opts.copy(
        Source::Bytes(png_data.into()),
        MimeType::Specific("image/png".to_string()),
    )
    .context("wl-clipboard-rs copy failed")?;
    Ok(())
}

/// Whether clipboard support looks usable on this system.
pub fn is_available() -> bool {
    Command::new("wl-copy")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_availability_probe_does_not_panic() {
        let _ = is_available();
    }
}
