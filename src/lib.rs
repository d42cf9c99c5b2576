//! snapvault: screenshot capture and history daemon for Wayland compositors.
//!
//! The library exposes the full capture-to-archive pipeline so integration
//! tests and external frontends can drive it directly: the [`archive`]
//! coordinator serializes triggers into captures, [`capture`] grabs pixels,
//! [`naming`] picks destination paths, and [`history`] keeps the image files
//! and their SQLite index in step, including retention sweeping.

pub mod archive;
pub mod capture;
pub mod clipboard;
pub mod config;
pub mod daemon;
pub mod history;
pub mod hotkey;
pub mod naming;
pub mod notification;
pub mod util;

pub use config::Config;
