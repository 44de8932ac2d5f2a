//! `TimeSyncClient`: the follower facade used by the vision pipelines.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::clock::{
    ClockCapabilities, ClockSource, HardwareClock, OffsetEstimator, SystemClock, TimestampMode,
};
use crate::error::{Result, TimeSyncError};
use crate::net::{PacketTransport, TimestampingSocket};
use crate::sync::{SharedOffset, SyncEngine, SyncRunner};
use crate::types::{SyncStatsSnapshot, TimeSyncConfig};

#[cfg(test)]
mod tests;

enum RunnerState<T> {
    Idle(SyncEngine<T>),
    Running(SyncRunner<T>),
    /// The background thread panicked; the engine is gone.
    Lost,
}

/// Follower-side network time synchronization.
///
/// Owns a background thread that runs protocol rounds against the leader
/// and publishes the follower-minus-leader offset. [`now`](Self::now) and
/// [`current_offset`](Self::current_offset) only read that offset and never
/// block.
///
/// # Example
///
/// ```rust,no_run
/// use vision_timesync::{TimeSyncClient, TimeSyncConfig};
///
/// # fn example() -> Result<(), vision_timesync::TimeSyncError> {
/// let config = TimeSyncConfig::builder().interface("eth0").build();
/// let client = TimeSyncClient::new(config)?;
/// client.start()?;
///
/// // capture time of a frame, in the leader's time base
/// let stamp = client.now();
/// # let _ = stamp;
///
/// client.stop()?;
/// # Ok(())
/// # }
/// ```
pub struct TimeSyncClient<T: PacketTransport + 'static = TimestampingSocket> {
    shared: Arc<SharedOffset>,
    clock: Arc<dyn ClockSource>,
    state: Mutex<RunnerState<T>>,
    retry_backoff: Duration,
    local_addr: Option<SocketAddr>,
}

impl TimeSyncClient<TimestampingSocket> {
    /// Query the interface, bind the timestamping socket and pick an offset
    /// estimation strategy. The background thread is not started.
    ///
    /// # Errors
    ///
    /// Returns a fatal `TimeSyncError` if the config is invalid, the interface
    /// cannot be queried, the socket cannot be set up, or an advertised
    /// hardware clock cannot be opened.
    pub fn new(config: TimeSyncConfig) -> Result<Self> {
        config.validate()?;

        let caps = ClockCapabilities::query(&config.interface)?;
        let mode = caps.preferred_mode(config.prefer_hardware);
        let socket = TimestampingSocket::bind(config.bind_addr, mode, config.io_timeout)?;

        let hardware = match (mode, caps.phc_index) {
            (TimestampMode::Hardware, Some(index)) => Some(open_hardware_clock(index)?),
            _ => None,
        };
        let estimator = OffsetEstimator::select(hardware, config.software_samples);
        tracing::info!(
            interface = %config.interface,
            %mode,
            strategy = %estimator.strategy(),
            leader = ?config.leader_addr,
            "Time sync configured"
        );

        let local_addr = socket.local_addr().ok();
        let clock: Arc<dyn ClockSource> = Arc::new(SystemClock::new());
        let engine = SyncEngine::new(socket, estimator, clock).with_leader(config.leader_addr);

        let mut client = Self::from_engine(engine, config.retry_backoff);
        client.local_addr = local_addr;
        Ok(client)
    }
}

#[cfg(target_os = "linux")]
fn open_hardware_clock(index: u32) -> Result<Box<dyn HardwareClock>> {
    Ok(Box::new(crate::clock::PhcClock::open(index)?))
}

#[cfg(not(target_os = "linux"))]
fn open_hardware_clock(_index: u32) -> Result<Box<dyn HardwareClock>> {
    Err(TimeSyncError::Unsupported {
        feature: "PTP hardware clock".to_string(),
    })
}

impl<T: PacketTransport + 'static> TimeSyncClient<T> {
    /// Wrap an already-built engine. Its clock becomes the facade's time base.
    #[must_use]
    pub fn from_engine(engine: SyncEngine<T>, retry_backoff: Duration) -> Self {
        Self {
            shared: Arc::new(SharedOffset::new()),
            clock: Arc::clone(engine.clock()),
            state: Mutex::new(RunnerState::Idle(engine)),
            retry_backoff,
            local_addr: None,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RunnerState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the background thread. Does nothing if it is already running.
    ///
    /// # Errors
    ///
    /// Returns `TimeSyncError::Spawn` if the thread cannot be created, or
    /// `TimeSyncError::EngineLost` if a previous thread panicked.
    pub fn start(&self) -> Result<()> {
        let mut state = self.lock_state();
        if let RunnerState::Running(runner) = &*state {
            if !runner.is_finished() {
                tracing::debug!("Time sync already running");
                return Ok(());
            }
        }

        let engine = match std::mem::replace(&mut *state, RunnerState::Lost) {
            RunnerState::Idle(engine) => engine,
            // finished without being stopped: the thread panicked
            RunnerState::Running(runner) => runner.stop()?,
            RunnerState::Lost => return Err(TimeSyncError::EngineLost),
        };
        *state = RunnerState::Running(SyncRunner::spawn(
            engine,
            Arc::clone(&self.shared),
            self.retry_backoff,
        )?);
        Ok(())
    }

    /// Stop the background thread and wait for it to exit. Does nothing if
    /// it is not running.
    ///
    /// Blocks for at most one in-flight round.
    ///
    /// # Errors
    ///
    /// Returns `TimeSyncError::EngineLost` if the thread had panicked.
    pub fn stop(&self) -> Result<()> {
        let mut state = self.lock_state();
        match std::mem::replace(&mut *state, RunnerState::Lost) {
            RunnerState::Running(runner) => {
                *state = RunnerState::Idle(runner.stop()?);
            }
            idle => *state = idle,
        }
        Ok(())
    }

    /// Whether the background thread is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(&*self.lock_state(), RunnerState::Running(runner) if !runner.is_finished())
    }

    /// Current time in the leader's time base, in microseconds.
    ///
    /// Before the first successful round this is the local monotonic time.
    #[must_use]
    pub fn now(&self) -> u64 {
        let leader =
            i128::from(self.clock.monotonic_micros()) - i128::from(self.shared.offset());
        u64::try_from(leader.max(0)).unwrap_or(u64::MAX)
    }

    /// Follower-minus-leader offset in microseconds; 0 until synchronized.
    #[must_use]
    pub fn current_offset(&self) -> i64 {
        self.shared.offset()
    }

    /// Whether any round has completed.
    #[must_use]
    pub fn is_synchronized(&self) -> bool {
        self.shared.is_synchronized()
    }

    /// Round statistics.
    #[must_use]
    pub fn stats(&self) -> SyncStatsSnapshot {
        self.shared.stats()
    }

    /// Local address of the timestamping socket, when built with [`new`](TimeSyncClient::new).
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

impl<T: PacketTransport + 'static> Drop for TimeSyncClient<T> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!("Time sync thread did not stop cleanly: {e}");
        }
    }
}

impl<T: PacketTransport + 'static> std::fmt::Debug for TimeSyncClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeSyncClient")
            .field("offset", &self.current_offset())
            .field("synchronized", &self.is_synchronized())
            .field("local_addr", &self.local_addr)
            .finish_non_exhaustive()
    }
}
