//! Pointer expiry sweep.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use shared_types::ChunkRecord;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::repository::{encode, keys};
use super::RegistryService;
use crate::domain::errors::RegistryError;
use crate::domain::pointer::is_sweepable;
use crate::ports::BatchOperation;

/// Result of one sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneReport {
    pub cleared: usize,
    pub processed_at: u64,
}

impl RegistryService {
    /// Clear pointer and expiry on every chunk whose `expiresAt <= now`.
    ///
    /// A pure cleanup: no history entries are written.
    pub fn prune_expired_pointers(&self, now: u64) -> Result<PruneReport, RegistryError> {
        let mut state = self.state.lock();
        let mut ops = Vec::new();
        for (key, mut record) in state.scan_json_keyed::<ChunkRecord>(keys::CHUNK_PREFIX)? {
            if !is_sweepable(&record, now) {
                continue;
            }
            record.pointer = None;
            record.pointer_expires_at = None;
            ops.push(BatchOperation::put(key, encode(&record)?));
        }

        let cleared = ops.len();
        state.write(ops)?;

        Ok(PruneReport {
            cleared,
            processed_at: now,
        })
    }

    /// Sweep against the service clock.
    pub fn prune_expired_pointers_now(&self) -> Result<PruneReport, RegistryError> {
        self.prune_expired_pointers(self.now())
    }
}

/// Run one sweep, logging instead of propagating failures.
pub fn run_sweep_once(service: &RegistryService) -> Option<PruneReport> {
    match service.prune_expired_pointers_now() {
        Ok(report) => {
            if report.cleared > 0 {
                info!(cleared = report.cleared, "[dw-04] 🧹 Expired chunk pointers cleared");
            } else {
                debug!("[dw-04] Pointer sweep found nothing to clear");
            }
            Some(report)
        }
        Err(e) => {
            warn!(error = %e, "[dw-04] Pointer sweep failed");
            None
        }
    }
}

/// Spawn the periodic sweep. The first run happens immediately.
pub fn spawn_pointer_sweep(
    service: Arc<RegistryService>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let service = Arc::clone(&service);
                    // The sweep holds the service lock and may rewrite the store file.
                    if let Err(e) = tokio::task::spawn_blocking(move || run_sweep_once(&service)).await {
                        warn!(error = %e, "[dw-04] Pointer sweep task failed");
                    }
                }
                _ = shutdown.changed() => {
                    debug!("[dw-04] Pointer sweep stopping");
                    break;
                }
            }
        }
    })
}
