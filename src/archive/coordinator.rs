use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::capture::types::CaptureRequest;

use super::dependencies::ArchiveDeps;
use super::pipeline::{Submission, run_archive};
use super::types::{ArchiveError, ArchiveOutcome, TriggerSource};

/// Serializes archive operations: captures run one at a time, in submission
/// order, whichever source they came from.
///
/// The coordinator is a handle around a single worker task; cloning it is
/// cheap and all clones feed the same queue.
#[derive(Clone)]
pub struct TriggerCoordinator {
    submit_tx: mpsc::UnboundedSender<Submission>,
    /// Submissions accepted but not yet finished (queued plus executing).
    pending: Arc<AtomicUsize>,
}

impl TriggerCoordinator {
    pub fn new(runtime_handle: &tokio::runtime::Handle, deps: ArchiveDeps) -> Self {
        let (submit_tx, mut submit_rx) = mpsc::unbounded_channel::<Submission>();
        let pending = Arc::new(AtomicUsize::new(0));
        let deps = Arc::new(deps);

        let pending_clone = pending.clone();
        runtime_handle.spawn(async move {
            while let Some(submission) = submit_rx.recv().await {
                let Submission {
                    source,
                    request,
                    cancel,
                    reply,
                } = submission;
                debug!(
                    "Processing {} capture: {}",
                    source.label(),
                    request.mode.label()
                );

                let result = if cancel.is_cancelled() {
                    debug!("Capture cancelled before it started");
                    Err(ArchiveError::Cancelled)
                } else {
                    run_archive(request, deps.clone()).await
                };

                match &result {
                    Ok(outcome) => {
                        info!("Capture finished: {}", outcome.record.file_path.display())
                    }
                    Err(ArchiveError::Cancelled) => {}
                    Err(err) => warn!("Capture failed: {err}"),
                }

                pending_clone.fetch_sub(1, Ordering::SeqCst);
                if reply.send(result).is_err() {
                    debug!("Capture requester went away before the result");
                }
            }
            debug!("Trigger coordinator stopped");
        });

        Self { submit_tx, pending }
    }

    /// Queues a capture and returns a handle the caller can await or cancel.
    ///
    /// With `coalesce_automatic` set, an automatic trigger arriving while
    /// another capture is pending is dropped here with [`ArchiveError::Busy`].
    /// Interactive sources always queue.
    pub fn submit(
        &self,
        source: TriggerSource,
        request: CaptureRequest,
        coalesce_automatic: bool,
    ) -> Result<PendingArchive, ArchiveError> {
        if source.is_automatic() && coalesce_automatic && self.pending.load(Ordering::SeqCst) > 0 {
            debug!("Coalescing automatic capture, another capture is pending");
            return Err(ArchiveError::Busy("another capture is already pending"));
        }

        let cancel = CancellationToken::new();
        let (reply_tx, reply_rx) = oneshot::channel();
        let submission = Submission {
            source,
            request,
            cancel: cancel.clone(),
            reply: reply_tx,
        };

        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.submit_tx.send(submission).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(ArchiveError::Internal(
                "trigger coordinator is not running".to_string(),
            ));
        }

        Ok(PendingArchive {
            cancel,
            reply: reply_rx,
        })
    }

    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
impl TriggerCoordinator {
    pub(crate) fn with_closed_channel_for_test() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        Self {
            submit_tx: tx,
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// Handle to a queued capture.
#[derive(Debug)]
pub struct PendingArchive {
    cancel: CancellationToken,
    reply: oneshot::Receiver<Result<ArchiveOutcome, ArchiveError>>,
}

impl PendingArchive {
    /// Token that cancels this capture if it has not started yet. A capture
    /// already under way runs to completion.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Waits for the capture to finish.
    pub async fn wait(self) -> Result<ArchiveOutcome, ArchiveError> {
        self.reply.await.map_err(|_| {
            ArchiveError::Internal("capture worker dropped the request".to_string())
        })?
    }
}
