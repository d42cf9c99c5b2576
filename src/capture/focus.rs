//! Focused-window lookup.
//!
//! Window capture needs to know which window has focus and where it sits in
//! virtual-screen coordinates. That lookup is compositor-specific, so it lives
//! behind the [`FocusProvider`] trait; the concrete provider is chosen once at
//! startup, not per call site.

use std::process::{Command, Stdio};
use std::sync::Arc;

use serde_json::Value;

use super::types::{CaptureError, FocusedWindow, Region};

/// Capability interface for resolving the currently focused window.
///
/// `Ok(None)` means "nothing focused" (the desktop, a lock screen); errors are
/// reserved for lookup machinery failures.
pub trait FocusProvider: Send + Sync {
    fn current_focus(&self) -> Result<Option<FocusedWindow>, CaptureError>;
}

/// Picks the focus provider for the running compositor.
///
/// Hyprland is detected through `HYPRLAND_INSTANCE_SIGNATURE`; anything else
/// gets the null provider, which reports no focused window (window captures
/// then fail with a clear error instead of grabbing the wrong area).
pub fn detect() -> Arc<dyn FocusProvider> {
    if std::env::var("HYPRLAND_INSTANCE_SIGNATURE").is_ok() {
        log::debug!("Using Hyprland focus provider");
        Arc::new(HyprlandFocus)
    } else {
        log::debug!("No supported compositor detected, window focus unavailable");
        Arc::new(NullFocus)
    }
}

/// Focus lookup via `hyprctl activewindow -j`.
pub struct HyprlandFocus;

impl FocusProvider for HyprlandFocus {
    fn current_focus(&self) -> Result<Option<FocusedWindow>, CaptureError> {
        let json = run_hyprctl(&["activewindow", "-j"])?;

        let monitor_id = json.get("monitor").and_then(|v| v.as_i64());
        let scale = match monitor_id {
            Some(id) => hyprland_monitor_scale(id)?.unwrap_or(1.0),
            None => 1.0,
        };

        window_from_json(&json, scale)
    }
}

/// Provider for compositors without a supported focus query.
pub struct NullFocus;

impl FocusProvider for NullFocus {
    fn current_focus(&self) -> Result<Option<FocusedWindow>, CaptureError> {
        Ok(None)
    }
}

fn run_hyprctl(args: &[&str]) -> Result<Value, CaptureError> {
    let output = Command::new("hyprctl")
        .args(args)
        .stdout(Stdio::piped())
        .output()
        .map_err(|e| CaptureError::Focus(format!("failed to run hyprctl {}: {e}", args[0])))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CaptureError::Focus(format!(
            "hyprctl {} failed: {}",
            args[0],
            stderr.trim()
        )));
    }

    serde_json::from_slice(&output.stdout)
        .map_err(|e| CaptureError::Focus(format!("failed to parse hyprctl output: {e}")))
}

/// Extracts the focused window from `hyprctl activewindow -j` output.
///
/// Hyprland reports logical coordinates; `scale` converts them into the pixel
/// space the capture backend works in.
fn window_from_json(json: &Value, scale: f64) -> Result<Option<FocusedWindow>, CaptureError> {
    // An empty object (or one without an address) means nothing has focus.
    if json.get("address").and_then(|v| v.as_str()).is_none() {
        return Ok(None);
    }

    let at = json
        .get("at")
        .and_then(|v| v.as_array())
        .ok_or_else(|| CaptureError::Focus("missing 'at' in hyprctl output".into()))?;
    let size = json
        .get("size")
        .and_then(|v| v.as_array())
        .ok_or_else(|| CaptureError::Focus("missing 'size' in hyprctl output".into()))?;

    let x = at
        .first()
        .and_then(|v| v.as_f64())
        .ok_or_else(|| CaptureError::Focus("invalid 'at[0]' value".into()))?;
    let y = at
        .get(1)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| CaptureError::Focus("invalid 'at[1]' value".into()))?;
    let width = size
        .first()
        .and_then(|v| v.as_f64())
        .ok_or_else(|| CaptureError::Focus("invalid 'size[0]' value".into()))?;
    let height = size
        .get(1)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| CaptureError::Focus("invalid 'size[1]' value".into()))?;

    if width <= 0.0 || height <= 0.0 {
        return Err(CaptureError::Focus(
            "active window has non-positive dimensions".into(),
        ));
    }

    if (scale - 1.0).abs() > f64::EPSILON {
        log::debug!("Applying monitor scale {scale:.2} to focused window bounds");
    }

    let bounds = Region::new(
        (x * scale).round() as i32,
        (y * scale).round() as i32,
        (width * scale).round() as u32,
        (height * scale).round() as u32,
    );

    let title = json
        .get("title")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let application = json
        .get("class")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    Ok(Some(FocusedWindow {
        title,
        application,
        bounds,
    }))
}

/// Looks up the scale factor of the monitor hosting the focused window.
fn hyprland_monitor_scale(monitor_id: i64) -> Result<Option<f64>, CaptureError> {
    let monitors = run_hyprctl(&["monitors", "-j"])?;

    let list = monitors
        .as_array()
        .ok_or_else(|| CaptureError::Focus("hyprctl monitors did not return an array".into()))?;

    for monitor in list {
        let matches = monitor
            .get("id")
            .and_then(|v| v.as_i64())
            .map(|id| id == monitor_id)
            .unwrap_or(false);

        if matches {
            return Ok(Some(
                monitor.get("scale").and_then(|v| v.as_f64()).unwrap_or(1.0),
            ));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_object_means_no_focus() {
        let parsed = window_from_json(&json!({}), 1.0).unwrap();
        assert!(parsed.is_none());
    }

    #[test]
    fn parses_window_fields() {
        let sample = json!({
            "address": "0x55d9f0a0",
            "at": [128, 64],
            "size": [800, 600],
            "title": "zsh - alacritty",
            "class": "Alacritty",
            "monitor": 0,
        });

        let window = window_from_json(&sample, 1.0).unwrap().unwrap();
        assert_eq!(window.title, "zsh - alacritty");
        assert_eq!(window.application, "Alacritty");
        assert_eq!(window.bounds, Region::new(128, 64, 800, 600));
    }

    #[test]
    fn applies_monitor_scale() {
        let sample = json!({
            "address": "0x1",
            "at": [100, 50],
            "size": [200, 100],
        });

        let window = window_from_json(&sample, 1.5).unwrap().unwrap();
        assert_eq!(window.bounds, Region::new(150, 75, 300, 150));
    }

    #[test]
    fn rejects_degenerate_window_size() {
        let sample = json!({
            "address": "0x1",
            "at": [0, 0],
            "size": [0, 100],
        });

        assert!(window_from_json(&sample, 1.0).is_err());
    }
}
