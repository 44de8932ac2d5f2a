use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Round counters, written by the background runner and read from anywhere
#[derive(Debug, Default)]
pub struct SyncStats {
    completed: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    last_path_delay: AtomicI64,
}

impl SyncStats {
    /// Record a successful round and its path delay
    pub fn record_success(&self, path_delay_micros: i64) {
        self.last_path_delay.store(path_delay_micros, Ordering::Relaxed);
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a round that timed out
    pub fn record_timeout(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a round aborted by a protocol or I/O fault
    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current values
    #[must_use]
    pub fn snapshot(&self) -> SyncStatsSnapshot {
        SyncStatsSnapshot {
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            last_path_delay_micros: self.last_path_delay.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`SyncStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStatsSnapshot {
    /// Rounds that published an offset
    pub completed: u64,
    /// Rounds aborted by a fault
    pub failed: u64,
    /// Rounds that timed out
    pub timed_out: u64,
    /// Path delay of the last successful round, in microseconds
    pub last_path_delay_micros: i64,
}

impl SyncStatsSnapshot {
    /// Rounds attempted
    #[must_use]
    pub fn attempted(&self) -> u64 {
        self.completed + self.failed + self.timed_out
    }
}
