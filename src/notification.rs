//! Desktop notifications via freedesktop D-Bus.

use std::collections::HashMap;

use anyhow::{Context as _, Result};
use zbus::{Connection, proxy};

use crate::history::ScreenshotRecord;
use crate::util::human_size;

/// D-Bus interface for freedesktop Notifications.
#[proxy(
    interface = "org.freedesktop.Notifications",
    default_service = "org.freedesktop.Notifications",
    default_path = "/org/freedesktop/Notifications"
)]
trait Notifications {
    fn notify(
        &self,
        app_name: &str,
        replaces_id: u32,
        app_icon: &str,
        summary: &str,
        body: &str,
        actions: Vec<&str>,
        hints: HashMap<&str, zbus::zvariant::Value<'_>>,
        expire_timeout: i32,
    ) -> zbus::Result<u32>;
}

const EXPIRE_TIMEOUT_MS: i32 = 3000;

/// Announce a screenshot that just landed in the archive.
pub async fn notify_screenshot_saved(record: &ScreenshotRecord) -> Result<()> {
    let file_name = record
        .file_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| record.file_path.display().to_string());
    let body = format!(
        "{} ({}x{}, {})",
        file_name,
        record.width,
        record.height,
        human_size(record.file_size)
    );
    send("Screenshot saved", &body, None).await
}

/// Send a plain notification. Icon defaults to "camera-photo".
pub async fn send(summary: &str, body: &str, icon: Option<&str>) -> Result<()> {
    let connection = Connection::session()
        .await
        .context("failed to connect to session bus")?;
    let proxy = NotificationsProxy::new(&connection)
        .await
        .context("failed to create notifications proxy")?;

    proxy
        .notify(
            "snapvault",
            0,
            icon.unwrap_or("camera-photo"),
            summary,
            body,
            vec![],
            HashMap::new(),
            EXPIRE_TIMEOUT_MS,
        )
        .await
        .context("failed to send notification")?;

    Ok(())
}
