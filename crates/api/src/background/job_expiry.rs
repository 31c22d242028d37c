//! Periodic expiry of job results nobody came back for.

use std::sync::Arc;
use std::time::Duration;

use diag_core::jobs::JobRegistry;
use tokio_util::sync::CancellationToken;

const EXPIRY_INTERVAL: Duration = Duration::from_secs(10);

/// Reset terminal job slots older than `ttl` until `cancel` is triggered.
pub async fn run(jobs: Arc<JobRegistry>, ttl: Duration, cancel: CancellationToken) {
    tracing::info!(ttl_secs = ttl.as_secs(), "Job result expiry started");

    let mut interval = tokio::time::interval(EXPIRY_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Job result expiry stopping");
                break;
            }
            _ = interval.tick() => {
                let purged = jobs.purge_expired(ttl);
                if purged > 0 {
                    tracing::info!(purged, "Discarded unclaimed job results");
                }
            }
        }
    }
}
