//! Data types for screenshot capture functionality.

use chrono::{DateTime, Utc};
use image::RgbaImage;
use thiserror::Error;

/// A rectangle in virtual-screen coordinates.
///
/// The virtual screen is the bounding box of all monitors in compositor
/// logical coordinates; origins can be negative on multi-monitor setups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Exclusive right edge.
    pub fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    /// Overlapping area of two rectangles, if any.
    pub fn intersection(&self, other: &Region) -> Option<Region> {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());

        if (left as i64) < right && (top as i64) < bottom {
            Some(Region {
                x: left,
                y: top,
                width: (right - left as i64) as u32,
                height: (bottom - top as i64) as u32,
            })
        } else {
            None
        }
    }

    /// Smallest rectangle covering both inputs.
    pub fn union(&self, other: &Region) -> Region {
        let left = self.x.min(other.x);
        let top = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());

        Region {
            x: left,
            y: top,
            width: (right - left as i64) as u32,
            height: (bottom - top as i64) as u32,
        }
    }
}

/// What to capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// The whole virtual screen, or a single monitor by index.
    FullScreen { monitor: Option<usize> },
    /// The currently focused window, resolved at capture time.
    ActiveWindow,
    /// A fixed rectangle in virtual-screen coordinates.
    Region(Region),
}

impl CaptureMode {
    /// Short label persisted with each history record.
    pub fn label(&self) -> &'static str {
        match self {
            CaptureMode::FullScreen { .. } => "fullscreen",
            CaptureMode::ActiveWindow => "window",
            CaptureMode::Region(_) => "region",
        }
    }
}

/// A single capture request, created per trigger and consumed by the engine.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub mode: CaptureMode,
    /// When the trigger fired. The capture timestamp itself is taken at
    /// grab time, since requests may sit in the queue briefly.
    pub requested_at: DateTime<Utc>,
}

impl CaptureRequest {
    pub fn new(mode: CaptureMode) -> Self {
        Self {
            mode,
            requested_at: Utc::now(),
        }
    }
}

/// Metadata describing one completed grab.
#[derive(Debug, Clone)]
pub struct CaptureContext {
    /// When the pixels were read.
    pub timestamp: DateTime<Utc>,
    /// Name of the captured monitor, or "virtual" for multi-monitor spans.
    pub monitor_label: String,
    /// Focused window title, when the mode resolves one.
    pub window_title: Option<String>,
    /// Application (window class) name, when known.
    pub application_name: Option<String>,
    /// Captured image width in pixels.
    pub width: u32,
    /// Captured image height in pixels.
    pub height: u32,
    /// Capture mode label ("fullscreen", "window", "region").
    pub mode_label: &'static str,
}

/// A captured image together with its context.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub image: RgbaImage,
    pub context: CaptureContext,
}

/// Geometry of one attached monitor.
#[derive(Debug, Clone)]
pub struct MonitorInfo {
    pub index: usize,
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub primary: bool,
}

impl MonitorInfo {
    pub fn bounds(&self) -> Region {
        Region::new(self.x, self.y, self.width, self.height)
    }
}

/// The currently focused window as reported by the compositor.
#[derive(Debug, Clone)]
pub struct FocusedWindow {
    pub title: String,
    pub application: String,
    pub bounds: Region,
}

/// Errors that can occur during screenshot capture.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("invalid region: {0}")]
    InvalidRegion(String),

    #[error("monitor index {index} out of range ({count} available)")]
    MonitorOutOfRange { index: usize, count: usize },

    #[error("no focused window to capture")]
    NoActiveWindow,

    #[error("no monitors available")]
    NoMonitors,

    #[error("screen capture failed: {0}")]
    CaptureFailed(String),

    #[error("focused window lookup failed: {0}")]
    Focus(String),

    #[error("image processing error: {0}")]
    Image(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CaptureError {
    /// True for errors the user can correct by changing the request
    /// (as opposed to OS-level capture failures).
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            CaptureError::InvalidRegion(_)
                | CaptureError::MonitorOutOfRange { .. }
                | CaptureError::NoActiveWindow
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersection_of_overlapping_regions() {
        let a = Region::new(0, 0, 100, 100);
        let b = Region::new(50, 50, 100, 100);
        assert_eq!(a.intersection(&b), Some(Region::new(50, 50, 50, 50)));
    }

    #[test]
    fn intersection_of_disjoint_regions_is_none() {
        let a = Region::new(0, 0, 10, 10);
        let b = Region::new(20, 0, 10, 10);
        assert_eq!(a.intersection(&b), None);

        // Touching edges do not overlap
        let c = Region::new(10, 0, 10, 10);
        assert_eq!(a.intersection(&c), None);
    }

    #[test]
    fn union_covers_both_regions() {
        let a = Region::new(-10, -10, 20, 20);
        let b = Region::new(30, 0, 10, 5);
        assert_eq!(a.union(&b), Region::new(-10, -10, 50, 20));
    }

    #[test]
    fn user_errors_are_classified() {
        assert!(CaptureError::NoActiveWindow.is_user_error());
        assert!(CaptureError::InvalidRegion("zero area".into()).is_user_error());
        assert!(!CaptureError::CaptureFailed("backend".into()).is_user_error());
    }

    #[test]
    fn mode_labels() {
        assert_eq!(CaptureMode::FullScreen { monitor: None }.label(), "fullscreen");
        assert_eq!(CaptureMode::ActiveWindow.label(), "window");
        assert_eq!(
            CaptureMode::Region(Region::new(0, 0, 1, 1)).label(),
            "region"
        );
    }
}
