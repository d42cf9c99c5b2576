use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

use image::{DynamicImage, RgbaImage};
use tokio::sync::oneshot;
use tokio::task;
use tokio_util::sync::CancellationToken;

use crate::capture::types::{CaptureRequest, CapturedFrame};
use crate::config::ImageFormat;
use crate::history::RecordDraft;
use crate::naming;

use super::dependencies::ArchiveDeps;
use super::types::{ArchiveError, ArchiveOutcome, TriggerSource};

pub(crate) struct Submission {
    pub(crate) source: TriggerSource,
    pub(crate) request: CaptureRequest,
    pub(crate) cancel: CancellationToken,
    pub(crate) reply: oneshot::Sender<Result<ArchiveOutcome, ArchiveError>>,
}

impl fmt::Debug for Submission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Submission")
            .field("source", &self.source)
            .field("mode", &self.request.mode.label())
            .finish()
    }
}

/// Runs one capture end to end: grab pixels, encode, pick a destination,
/// commit to the history store, then fan out to clipboard and notifications.
///
/// Fan-out happens after the record is committed and never fails the
/// operation; the outcome flags report what actually worked.
pub(crate) async fn run_archive(
    request: CaptureRequest,
    deps: Arc<ArchiveDeps>,
) -> Result<ArchiveOutcome, ArchiveError> {
    let config = (deps.settings)();

    log::info!("Starting {} capture", request.mode.label());
    let frame = deps.backend.capture(request).await?;
    let CapturedFrame { image, context } = frame;

    let format = config.storage.format;
    let wants_clipboard = config.clipboard.copy_on_capture;
    let (archive_bytes, clipboard_bytes) =
        task::spawn_blocking(move || -> Result<(Vec<u8>, Option<Vec<u8>>), ArchiveError> {
            let archive_bytes = encode_image(&image, format)?;
            // Wayland clipboards speak PNG regardless of the archive format.
            let clipboard_bytes = if !wants_clipboard {
                None
            } else if format == ImageFormat::Png {
                Some(archive_bytes.clone())
            } else {
                match encode_image(&image, ImageFormat::Png) {
                    Ok(bytes) => Some(bytes),
                    Err(err) => {
                        log::warn!("Skipping clipboard copy, PNG encode failed: {err}");
                        None
                    }
                }
            };
            Ok((archive_bytes, clipboard_bytes))
        })
        .await
        .map_err(|err| ArchiveError::Internal(format!("encode task failed: {err}")))??;

    let root = config.save_root();
    let candidate = naming::resolve(&context, &config.storage, &root);
    let destination = naming::disambiguate(candidate, |path| path.exists());

    let draft = RecordDraft {
        file_path: destination,
        created_at: context.timestamp,
        mode: context.mode_label.to_string(),
        window_title: context.window_title.clone(),
        application_name: context.application_name.clone(),
        width: context.width,
        height: context.height,
        format: format.to_string(),
    };
    let busy_timeout = Some(config.triggers.store_busy_timeout());
    let record = deps.store.insert(draft, archive_bytes, busy_timeout).await?;

    let mut copied_to_clipboard = false;
    if let Some(bytes) = clipboard_bytes {
        let clipboard = deps.clipboard.clone();
        match task::spawn_blocking(move || clipboard.copy_image(&bytes)).await {
            Ok(Ok(())) => {
                log::debug!("Copied screenshot to clipboard");
                copied_to_clipboard = true;
            }
            Ok(Err(err)) => log::warn!("Failed to copy screenshot to clipboard: {err:#}"),
            Err(err) => log::warn!("Clipboard task failed: {err}"),
        }
    }

    let mut notified = false;
    if config.notifications.enabled {
        match deps.notifier.notify_saved(&record).await {
            Ok(()) => notified = true,
            Err(err) => log::warn!("Failed to send notification: {err:#}"),
        }
    }

    log::info!(
        "Archived {} ({}x{}, {}) as record {}",
        record.file_path.display(),
        record.width,
        record.height,
        crate::util::human_size(record.file_size),
        record.id
    );

    Ok(ArchiveOutcome {
        record,
        copied_to_clipboard,
        notified,
    })
}

/// Encodes a captured frame. JPEG cannot carry an alpha channel, so those
/// frames flatten to RGB first.
pub fn encode_image(image: &RgbaImage, format: ImageFormat) -> Result<Vec<u8>, ArchiveError> {
    let mut buffer = Cursor::new(Vec::new());
    match format {
        ImageFormat::Png => image
            .write_to(&mut buffer, image::ImageFormat::Png)
            .map_err(|err| ArchiveError::Encode(err.to_string()))?,
        ImageFormat::Jpeg => DynamicImage::ImageRgba8(image.clone())
            .to_rgb8()
            .write_to(&mut buffer, image::ImageFormat::Jpeg)
            .map_err(|err| ArchiveError::Encode(err.to_string()))?,
    }
    Ok(buffer.into_inner())
}
