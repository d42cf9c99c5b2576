//! Retention sweeping: ages out old screenshots and caps the archive size.

use chrono::Utc;
use log::{debug, info, warn};
use tokio::time::{self, Duration};
use tokio_util::sync::CancellationToken;

use crate::config::{RetentionConfig, SettingsSource};

use super::record::{RecordId, StoreError};
use super::store::HistoryStore;

/// Delay before the first sweep after the daemon starts.
const STARTUP_SWEEP_DELAY_SECS: u64 = 30;

/// Retention limits derived from configuration. `None` means the
/// corresponding limit is off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub enabled: bool,
    pub max_age: Option<chrono::Duration>,
    pub max_count: Option<u64>,
}

impl From<&RetentionConfig> for RetentionPolicy {
    fn from(config: &RetentionConfig) -> Self {
        let max_age =
            (config.max_age_days > 0).then(|| chrono::Duration::days(config.max_age_days as i64));
        let max_count = (config.max_count > 0).then_some(config.max_count);
        Self {
            enabled: config.enabled,
            max_age,
            max_count,
        }
    }
}

/// What a single sweep did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted: u64,
    pub failed: u64,
    /// Records that vanished between candidate selection and deletion.
    pub skipped_missing: u64,
}

/// Runs one sweep: collects expired and overflow records, oldest first, and
/// deletes them one at a time. A record that fails to delete is counted and
/// skipped, never fatal to the rest of the sweep.
pub async fn sweep_once(
    store: &HistoryStore,
    policy: &RetentionPolicy,
) -> Result<SweepReport, StoreError> {
    let mut report = SweepReport::default();
    if !policy.enabled {
        return Ok(report);
    }

    let mut candidates: Vec<RecordId> = Vec::new();
    if let Some(max_age) = policy.max_age {
        let cutoff = Utc::now() - max_age;
        candidates.extend(store.expired_ids(cutoff).await?);
    }
    if let Some(max_count) = policy.max_count {
        for id in store.overflow_ids(max_count).await? {
            if !candidates.contains(&id) {
                candidates.push(id);
            }
        }
    }

    for id in candidates {
        match store.delete(id, None).await {
            Ok(()) => report.deleted += 1,
            Err(StoreError::NotFound(_)) => {
                debug!("Record {id} vanished before the sweep reached it");
                report.skipped_missing += 1;
            }
            Err(err) => {
                warn!("Failed to delete record {id} during sweep: {err}");
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

/// Periodic sweep loop for the daemon. Re-reads configuration before every
/// sweep, so retention changes apply without a restart. Exits promptly when
/// `cancel` fires.
pub async fn run_retention_loop(
    store: HistoryStore,
    settings: SettingsSource,
    cancel: CancellationToken,
) {
    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = time::sleep(Duration::from_secs(STARTUP_SWEEP_DELAY_SECS)) => {}
    }

    loop {
        let config = settings();
        let policy = RetentionPolicy::from(&config.retention);

        if policy.enabled {
            match sweep_once(&store, &policy).await {
                Ok(report) if report.deleted > 0 || report.failed > 0 => {
                    info!(
                        "Retention sweep removed {} records ({} failed, {} vanished)",
                        report.deleted, report.failed, report.skipped_missing
                    );
                }
                Ok(_) => debug!("Retention sweep found nothing to remove"),
                Err(err) => warn!("Retention sweep aborted: {err}"),
            }
        } else {
            debug!("Retention sweeping is disabled");
        }

        let hours = config.retention.sweep_interval_hours.max(1);
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = time::sleep(Duration::from_secs(hours * 3600)) => {}
        }
    }
}
