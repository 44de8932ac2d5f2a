//! Hand-driven clock for deterministic tests.

use std::sync::atomic::{AtomicI64, Ordering};

use crate::clock::ClockSource;

/// Unix time used as the default realtime reading (2024-01-01).
pub const DEFAULT_REALTIME_MICROS: i64 = 1_704_067_200_000_000;

/// A clock that only moves when told to.
///
/// Realtime and monotonic advance together, so the system-to-application
/// translation stays constant.
#[derive(Debug)]
pub struct ManualClock {
    monotonic: AtomicI64,
    realtime: AtomicI64,
}

impl ManualClock {
    /// Start at the given monotonic and realtime readings.
    #[must_use]
    pub fn new(monotonic: i64, realtime: i64) -> Self {
        Self {
            monotonic: AtomicI64::new(monotonic),
            realtime: AtomicI64::new(realtime),
        }
    }

    /// Monotonic and realtime readings equal, so translation is zero.
    #[must_use]
    pub fn aligned(micros: i64) -> Self {
        Self::new(micros, micros)
    }

    /// Move both clocks forward.
    pub fn advance(&self, micros: i64) {
        self.monotonic.fetch_add(micros, Ordering::SeqCst);
        self.realtime.fetch_add(micros, Ordering::SeqCst);
    }

    /// Set the monotonic reading without touching realtime.
    pub fn set_monotonic(&self, micros: i64) {
        self.monotonic.store(micros, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(1_000_000, DEFAULT_REALTIME_MICROS)
    }
}

impl ClockSource for ManualClock {
    fn monotonic_micros(&self) -> i64 {
        self.monotonic.load(Ordering::SeqCst)
    }

    fn realtime_micros(&self) -> i64 {
        self.realtime.load(Ordering::SeqCst)
    }
}
