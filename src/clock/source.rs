//! Application and system clock sources.

use std::time::{SystemTime, UNIX_EPOCH};

/// Access to the follower's own clocks, in microseconds.
///
/// The monotonic clock is the application's time base: every offset the
/// engine publishes is relative to it.
pub trait ClockSource: Send + Sync {
    /// Application monotonic time.
    fn monotonic_micros(&self) -> i64;

    /// System realtime (wall-clock) time since the Unix epoch.
    fn realtime_micros(&self) -> i64;

    /// Offset that maps a realtime reading onto the monotonic clock.
    ///
    /// The realtime read is bracketed by two monotonic reads and assumed to
    /// fall at their midpoint.
    fn system_to_application_micros(&self) -> i64 {
        let before = self.monotonic_micros();
        let realtime = self.realtime_micros();
        let after = self.monotonic_micros();
        before + (after - before) / 2 - realtime
    }
}

/// The host's real clocks.
///
/// On Linux the monotonic base is `CLOCK_MONOTONIC`, the same clock camera
/// drivers stamp frames with.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a system clock handle
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ClockSource for SystemClock {
    #[cfg(target_os = "linux")]
    fn monotonic_micros(&self) -> i64 {
        // CLOCK_MONOTONIC cannot fail with a valid timespec pointer
        clock_micros(libc::CLOCK_MONOTONIC).unwrap_or_default()
    }

    #[cfg(not(target_os = "linux"))]
    #[allow(clippy::cast_possible_truncation, reason = "292k years of uptime")]
    fn monotonic_micros(&self) -> i64 {
        use std::sync::OnceLock;
        use std::time::Instant;

        static EPOCH: OnceLock<Instant> = OnceLock::new();
        EPOCH.get_or_init(Instant::now).elapsed().as_micros() as i64
    }

    #[allow(clippy::cast_possible_truncation, reason = "292k years since 1970")]
    fn realtime_micros(&self) -> i64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_micros() as i64,
            Err(e) => -(e.duration().as_micros() as i64),
        }
    }
}

/// Read a POSIX clock in microseconds.
#[cfg(target_os = "linux")]
#[allow(unsafe_code, clippy::useless_conversion)]
pub(crate) fn clock_micros(clock: libc::clockid_t) -> std::io::Result<i64> {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: ts is a valid, writable timespec
    let ret = unsafe { libc::clock_gettime(clock, &mut ts) };
    if ret != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(i64::from(ts.tv_sec) * 1_000_000 + i64::from(ts.tv_nsec) / 1_000)
}
