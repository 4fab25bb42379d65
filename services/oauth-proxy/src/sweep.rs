//! Background expiry sweep
//!
//! Expired codes and tokens are already rejected on use; the sweep keeps
//! them from accumulating in memory and in the snapshot file.

use std::sync::Arc;
use std::time::Duration;

use oauth_store::{CredentialStore, PurgeReport, now_millis};
use tracing::{debug, info};

use crate::metrics;

/// Spawn a task that purges expired entries every `interval`.
pub fn spawn_sweep_task(
    store: Arc<CredentialStore>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Skip the immediate first tick; the store was just loaded
        ticker.tick().await;

        loop {
            ticker.tick().await;
            sweep_cycle(&store, now_millis()).await;
        }
    })
}

/// Run one sweep and refresh the store gauges.
async fn sweep_cycle(store: &CredentialStore, now_ms: u64) -> PurgeReport {
    let report = store.purge_expired(now_ms).await;
    if report == PurgeReport::default() {
        debug!("expiry sweep found nothing to remove");
    } else {
        info!(
            auth_codes = report.auth_codes,
            access_tokens = report.access_tokens,
            "expiry sweep removed entries"
        );
    }
    metrics::set_store_entries(store.counts().await);
    report
}
