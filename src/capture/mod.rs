//! Screenshot capture functionality for snapvault.
//!
//! This module provides the capture side of the pipeline:
//! - Full screen capture (single monitor or composite of all)
//! - Active window capture via compositor focus lookup
//! - Region capture in virtual-screen coordinates
//!
//! Persistence, naming, and fan-out live elsewhere; the engine only produces
//! pixels plus context.

pub mod engine;
pub mod focus;
pub mod types;

pub use engine::CaptureEngine;
pub use focus::FocusProvider;
pub use types::{
    CaptureContext, CaptureError, CaptureMode, CaptureRequest, CapturedFrame, FocusedWindow,
    MonitorInfo, Region,
};
