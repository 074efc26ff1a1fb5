//! Resolution observers.

use parking_lot::Mutex;
use tracing::debug;

use crate::domain::{AttemptOutcome, ChunkAttempt};
use crate::ports::ResolutionObserver;

/// Logs every attempt at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ResolutionObserver for TracingObserver {
    fn record(&self, attempt: &ChunkAttempt) {
        match &attempt.outcome {
            AttemptOutcome::Served(source) => debug!(
                manifest_id = %attempt.manifest_id,
                chunk_index = attempt.chunk_index,
                tier = ?attempt.tier,
                source = source.label(),
                "[dw-05] Chunk served"
            ),
            AttemptOutcome::Fallback(reason) => debug!(
                manifest_id = %attempt.manifest_id,
                chunk_index = attempt.chunk_index,
                tier = ?attempt.tier,
                reason = %reason,
                "[dw-05] Falling back"
            ),
        }
    }
}

/// Keeps the trail in memory.
#[derive(Debug, Default)]
pub struct MemoryObserver {
    attempts: Mutex<Vec<ChunkAttempt>>,
}

impl MemoryObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> Vec<ChunkAttempt> {
        self.attempts.lock().clone()
    }

    /// Fallback reasons recorded for one chunk, in order.
    pub fn reasons(&self, chunk_index: u32) -> Vec<String> {
        self.attempts
            .lock()
            .iter()
            .filter(|a| a.chunk_index == chunk_index)
            .filter_map(|a| a.reason().map(str::to_string))
            .collect()
    }
}

impl ResolutionObserver for MemoryObserver {
    fn record(&self, attempt: &ChunkAttempt) {
        self.attempts.lock().push(attempt.clone());
    }
}
