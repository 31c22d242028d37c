//! Periodic deletion of old report bundles.

use std::time::Duration;

use diag_core::report::ReportStore;
use tokio_util::sync::CancellationToken;

/// How often the report directory is scanned.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Run the report cleanup loop until `cancel` is triggered.
///
/// Bundles whose modification time is at least `retention` ago are removed.
pub async fn run(store: ReportStore, retention: Duration, cancel: CancellationToken) {
    tracing::info!(
        dir = %store.dir().display(),
        retention_secs = retention.as_secs(),
        interval_secs = CLEANUP_INTERVAL.as_secs(),
        "Report cleanup job started"
    );

    let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Report cleanup job stopping");
                break;
            }
            _ = interval.tick() => sweep(&store, retention).await,
        }
    }
}

async fn sweep(store: &ReportStore, retention: Duration) {
    match store.cleanup_older_than(retention).await {
        Ok(0) => tracing::debug!("Report cleanup: nothing to remove"),
        Ok(removed) => tracing::info!(removed, "Report cleanup: removed expired bundles"),
        Err(e) => tracing::error!(error = %e, "Report cleanup failed"),
    }
}
