//! Screen grab engine built on `xcap`.
//!
//! The engine performs exactly one buffered grab per monitor per capture and
//! composites afterwards, so a multi-monitor capture is never assembled from
//! screens re-read at different times. All calls here block; async callers
//! wrap the engine in `spawn_blocking`.

use std::sync::Arc;

use chrono::Utc;
use image::{RgbaImage, imageops};
use xcap::Monitor;

use super::focus::{self, FocusProvider};
use super::types::{
    CaptureContext, CaptureError, CaptureMode, CaptureRequest, CapturedFrame, FocusedWindow,
    MonitorInfo, Region,
};

pub struct CaptureEngine {
    focus: Arc<dyn FocusProvider>,
}

impl CaptureEngine {
    /// Engine with the focus provider detected for the running compositor.
    pub fn new() -> Self {
        Self {
            focus: focus::detect(),
        }
    }

    /// Engine with an explicit focus provider.
    pub fn with_focus(focus: Arc<dyn FocusProvider>) -> Self {
        Self { focus }
    }

    /// Performs one capture and returns the image with its context.
    pub fn capture(&self, request: &CaptureRequest) -> Result<CapturedFrame, CaptureError> {
        match request.mode {
            CaptureMode::FullScreen { monitor } => self.capture_fullscreen(monitor),
            CaptureMode::ActiveWindow => self.capture_window(),
            CaptureMode::Region(region) => self.capture_region(region),
        }
    }

    /// Lists attached monitors (for target validation and the CLI).
    pub fn monitors(&self) -> Result<Vec<MonitorInfo>, CaptureError> {
        Ok(attached_monitors()?
            .into_iter()
            .map(|(info, _)| info)
            .collect())
    }

    fn capture_fullscreen(&self, target: Option<usize>) -> Result<CapturedFrame, CaptureError> {
        let monitors = attached_monitors()?;
        let infos: Vec<MonitorInfo> = monitors.iter().map(|(info, _)| info.clone()).collect();

        let area = match target {
            Some(index) => {
                let info = infos.get(index).ok_or(CaptureError::MonitorOutOfRange {
                    index,
                    count: infos.len(),
                })?;
                info.bounds()
            }
            None => virtual_bounds(&infos),
        };

        let image = grab_area(&monitors, &area)?;
        let label = area_label(&infos, &area);
        Ok(frame(image, label, "fullscreen", None))
    }

    fn capture_window(&self) -> Result<CapturedFrame, CaptureError> {
        // Focus is resolved now, not when the trigger fired, so a request that
        // waited in the queue still captures what the user is looking at.
        let window = self
            .focus
            .current_focus()?
            .ok_or(CaptureError::NoActiveWindow)?;

        let monitors = attached_monitors()?;
        let infos: Vec<MonitorInfo> = monitors.iter().map(|(info, _)| info.clone()).collect();

        if !overlaps_any(&infos, &window.bounds) {
            return Err(CaptureError::CaptureFailed(
                "focused window is entirely offscreen".into(),
            ));
        }

        let full = virtual_bounds(&infos);
        let area = window
            .bounds
            .intersection(&full)
            .ok_or_else(|| CaptureError::CaptureFailed("focused window has empty bounds".into()))?;

        let image = grab_area(&monitors, &area)?;
        let label = area_label(&infos, &area);
        Ok(frame(image, label, "window", Some(&window)))
    }

    fn capture_region(&self, region: Region) -> Result<CapturedFrame, CaptureError> {
        if region.is_empty() {
            return Err(CaptureError::InvalidRegion("region has zero area".into()));
        }

        let monitors = attached_monitors()?;
        let infos: Vec<MonitorInfo> = monitors.iter().map(|(info, _)| info.clone()).collect();

        if !overlaps_any(&infos, &region) {
            return Err(CaptureError::InvalidRegion(
                "region lies outside all monitors".into(),
            ));
        }

        // Spans reaching past the edge are clamped to the covered part.
        let full = virtual_bounds(&infos);
        let area = region
            .intersection(&full)
            .ok_or_else(|| CaptureError::InvalidRegion("region lies outside all monitors".into()))?;

        let image = grab_area(&monitors, &area)?;
        let label = area_label(&infos, &area);
        Ok(frame(image, label, "region", None))
    }
}

impl Default for CaptureEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn frame(
    image: RgbaImage,
    monitor_label: String,
    mode_label: &'static str,
    window: Option<&FocusedWindow>,
) -> CapturedFrame {
    let context = CaptureContext {
        timestamp: Utc::now(),
        monitor_label,
        window_title: window.map(|w| w.title.clone()).filter(|t| !t.is_empty()),
        application_name: window
            .map(|w| w.application.clone())
            .filter(|a| !a.is_empty()),
        width: image.width(),
        height: image.height(),
        mode_label,
    };
    CapturedFrame { image, context }
}

fn attached_monitors() -> Result<Vec<(MonitorInfo, Monitor)>, CaptureError> {
    let monitors = Monitor::all()
        .map_err(|e| CaptureError::CaptureFailed(format!("failed to enumerate monitors: {e}")))?;

    if monitors.is_empty() {
        return Err(CaptureError::NoMonitors);
    }

    monitors
        .into_iter()
        .enumerate()
        .map(|(index, monitor)| Ok((monitor_info(index, &monitor)?, monitor)))
        .collect()
}

fn monitor_info(index: usize, monitor: &Monitor) -> Result<MonitorInfo, CaptureError> {
    let query = |e: xcap::XCapError| CaptureError::CaptureFailed(format!("monitor query failed: {e}"));

    Ok(MonitorInfo {
        index,
        name: monitor.name().map_err(query)?,
        x: monitor.x().map_err(query)?,
        y: monitor.y().map_err(query)?,
        width: monitor.width().map_err(query)?,
        height: monitor.height().map_err(query)?,
        primary: monitor.is_primary().unwrap_or(false),
    })
}

/// Bounding box of all monitors. Callers guarantee `infos` is non-empty.
fn virtual_bounds(infos: &[MonitorInfo]) -> Region {
    let mut bounds = infos[0].bounds();
    for info in &infos[1..] {
        bounds = bounds.union(&info.bounds());
    }
    bounds
}

fn overlaps_any(infos: &[MonitorInfo], area: &Region) -> bool {
    infos
        .iter()
        .any(|info| info.bounds().intersection(area).is_some())
}

/// Monitor name when the area touches exactly one monitor, "virtual" otherwise.
fn area_label(infos: &[MonitorInfo], area: &Region) -> String {
    let mut overlapping = infos
        .iter()
        .filter(|info| info.bounds().intersection(area).is_some());

    match (overlapping.next(), overlapping.next()) {
        (Some(only), None) => only.name.clone(),
        _ => "virtual".to_string(),
    }
}

/// Grabs every monitor overlapping `area` once, then composites the pieces.
fn grab_area(
    monitors: &[(MonitorInfo, Monitor)],
    area: &Region,
) -> Result<RgbaImage, CaptureError> {
    // Whole-monitor captures skip the compositing pass.
    if let Some((info, monitor)) = monitors.iter().find(|(info, _)| info.bounds() == *area) {
        return grab_monitor(monitor, &info.name);
    }

    let mut canvas = RgbaImage::new(area.width, area.height);
    let mut covered = false;

    for (info, monitor) in monitors {
        let Some(overlap) = info.bounds().intersection(area) else {
            continue;
        };

        let shot = grab_monitor(monitor, &info.name)?;

        // Captured pixels can outnumber the monitor's logical size under
        // fractional scaling; map the overlap through the measured ratio.
        let sx = shot.width() as f64 / info.width as f64;
        let sy = shot.height() as f64 / info.height as f64;

        let local_x = (((overlap.x - info.x) as f64) * sx).round() as u32;
        let local_y = (((overlap.y - info.y) as f64) * sy).round() as u32;
        let local_w = ((overlap.width as f64) * sx).round() as u32;
        let local_h = ((overlap.height as f64) * sy).round() as u32;

        let local_w = local_w.min(shot.width().saturating_sub(local_x));
        let local_h = local_h.min(shot.height().saturating_sub(local_y));
        if local_w == 0 || local_h == 0 {
            continue;
        }

        let piece = imageops::crop_imm(&shot, local_x, local_y, local_w, local_h).to_image();
        let piece = if (piece.width(), piece.height()) != (overlap.width, overlap.height) {
            imageops::resize(
                &piece,
                overlap.width,
                overlap.height,
                imageops::FilterType::Triangle,
            )
        } else {
            piece
        };

        imageops::replace(
            &mut canvas,
            &piece,
            (overlap.x - area.x) as i64,
            (overlap.y - area.y) as i64,
        );
        covered = true;
    }

    if !covered {
        return Err(CaptureError::CaptureFailed(
            "no monitor covers the requested area".into(),
        ));
    }

    Ok(canvas)
}

/// Single buffered grab of one monitor, retried once on backend failure.
fn grab_monitor(monitor: &Monitor, name: &str) -> Result<RgbaImage, CaptureError> {
    match monitor.capture_image() {
        Ok(image) => Ok(image),
        Err(first) => {
            log::warn!("Capture of monitor {name} failed ({first}), retrying once");
            monitor
                .capture_image()
                .map_err(|e| CaptureError::CaptureFailed(format!("monitor {name}: {e}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::focus::NullFocus;

    fn info(index: usize, x: i32, y: i32, width: u32, height: u32) -> MonitorInfo {
        MonitorInfo {
            index,
            name: format!("DP-{index}"),
            x,
            y,
            width,
            height,
            primary: index == 0,
        }
    }

    #[test]
    fn zero_area_region_is_rejected_before_any_grab() {
        let engine = CaptureEngine::with_focus(Arc::new(NullFocus));
        let request = CaptureRequest::new(CaptureMode::Region(Region::new(10, 10, 0, 5)));

        match engine.capture(&request) {
            Err(CaptureError::InvalidRegion(_)) => {}
            other => panic!("expected InvalidRegion, got {other:?}"),
        }
    }

    #[test]
    fn window_capture_without_focus_reports_no_active_window() {
        let engine = CaptureEngine::with_focus(Arc::new(NullFocus));
        let request = CaptureRequest::new(CaptureMode::ActiveWindow);

        match engine.capture(&request) {
            Err(CaptureError::NoActiveWindow) => {}
            other => panic!("expected NoActiveWindow, got {other:?}"),
        }
    }

    #[test]
    fn virtual_bounds_spans_offset_monitors() {
        let infos = vec![info(0, 0, 0, 1920, 1080), info(1, 1920, -120, 2560, 1440)];
        assert_eq!(virtual_bounds(&infos), Region::new(0, -120, 4480, 1440));
    }

    #[test]
    fn area_label_names_single_monitor_spans() {
        let infos = vec![info(0, 0, 0, 1920, 1080), info(1, 1920, 0, 1920, 1080)];

        assert_eq!(area_label(&infos, &Region::new(100, 100, 300, 200)), "DP-0");
        assert_eq!(
            area_label(&infos, &Region::new(1800, 0, 400, 400)),
            "virtual"
        );
    }

    #[test]
    fn overlap_detection_ignores_gaps_in_the_bounding_box() {
        // L-shaped layout: the bounding box covers (2000, 1200) but nothing
        // actually renders there.
        let infos = vec![info(0, 0, 0, 1000, 2000), info(1, 1000, 0, 1000, 1000)];

        assert!(overlaps_any(&infos, &Region::new(500, 500, 100, 100)));
        assert!(!overlaps_any(&infos, &Region::new(1500, 1500, 100, 100)));
    }
}
