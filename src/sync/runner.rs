//! Background thread that runs rounds until cancelled.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::engine::{RoundOutcome, SyncEngine};
use crate::error::TimeSyncError;
use crate::net::PacketTransport;
use crate::types::{SyncStats, SyncStatsSnapshot};

const THREAD_NAME: &str = "timesync";

/// Offset and statistics published by the runner.
///
/// The runner is the only writer; any thread may read.
#[derive(Debug, Default)]
pub struct SharedOffset {
    offset: AtomicI64,
    synchronized: AtomicBool,
    stats: SyncStats,
}

impl SharedOffset {
    /// Create an unsynchronized cell (offset 0).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recently published offset in microseconds.
    #[must_use]
    pub fn offset(&self) -> i64 {
        self.offset.load(Ordering::Acquire)
    }

    /// Whether any round has completed.
    #[must_use]
    pub fn is_synchronized(&self) -> bool {
        self.synchronized.load(Ordering::Acquire)
    }

    /// Round statistics.
    #[must_use]
    pub fn stats(&self) -> SyncStatsSnapshot {
        self.stats.snapshot()
    }

    /// Publish a completed round. Returns `true` for the first one.
    pub fn publish(&self, outcome: &RoundOutcome) -> bool {
        self.offset.store(outcome.offset, Ordering::Release);
        self.stats.record_success(outcome.path_delay);
        !self.synchronized.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn record_timeout(&self) {
        self.stats.record_timeout();
    }

    pub(crate) fn record_failure(&self) {
        self.stats.record_failure();
    }
}

/// A running background round loop.
pub struct SyncRunner<T> {
    handle: JoinHandle<SyncEngine<T>>,
    cancel: CancellationToken,
}

impl<T: PacketTransport + 'static> SyncRunner<T> {
    /// Spawn the round loop on a dedicated thread.
    ///
    /// # Errors
    /// Returns `TimeSyncError::Spawn` if the thread cannot be created.
    pub fn spawn(
        engine: SyncEngine<T>,
        shared: Arc<SharedOffset>,
        retry_backoff: Duration,
    ) -> Result<Self, TimeSyncError> {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = std::thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || run_loop(engine, &shared, &token, retry_backoff))
            .map_err(TimeSyncError::Spawn)?;
        tracing::info!("Time sync runner started");
        Ok(Self { handle, cancel })
    }

    /// Whether the thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Request cancellation and wait for the in-flight round to finish.
    ///
    /// # Errors
    /// Returns `TimeSyncError::EngineLost` if the thread panicked.
    pub fn stop(self) -> Result<SyncEngine<T>, TimeSyncError> {
        self.cancel.cancel();
        let engine = self.handle.join().map_err(|_| TimeSyncError::EngineLost)?;
        tracing::info!("Time sync runner stopped");
        Ok(engine)
    }
}

impl<T> std::fmt::Debug for SyncRunner<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncRunner")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

fn run_loop<T: PacketTransport>(
    mut engine: SyncEngine<T>,
    shared: &SharedOffset,
    cancel: &CancellationToken,
    retry_backoff: Duration,
) -> SyncEngine<T> {
    while !cancel.is_cancelled() {
        match engine.run_round() {
            Ok(outcome) => {
                let first = shared.publish(&outcome);
                tracing::debug!(
                    offset = outcome.offset,
                    path_delay = outcome.path_delay,
                    mode = ?outcome.mode,
                    "Round complete"
                );
                if first {
                    tracing::info!(
                        offset = outcome.offset,
                        leader = %outcome.leader,
                        "Synchronized to leader"
                    );
                }
            }
            Err(e) if e.is_transient() => {
                shared.record_timeout();
                tracing::debug!("Round abandoned: {e}");
            }
            Err(e) => {
                shared.record_failure();
                if e.is_protocol_violation() {
                    tracing::warn!("Round rejected: {e}");
                } else {
                    tracing::error!("Round failed: {e}");
                }
                if !retry_backoff.is_zero() && !cancel.is_cancelled() {
                    std::thread::sleep(retry_backoff);
                }
            }
        }
    }
    engine
}
