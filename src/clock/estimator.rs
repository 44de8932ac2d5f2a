//! Packet-timestamp translation offset estimation.
//!
//! The estimator produces `translation` such that
//! `application_time = os_timestamp + translation`, where `os_timestamp`
//! is a packet stamp from the hardware clock or system realtime.

use super::phc::HardwareClock;
use super::source::ClockSource;

/// Default number of bracketed samples averaged per estimate.
pub const DEFAULT_SAMPLES: usize = 5;

/// How an estimate was (or would be) produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OffsetStrategy {
    /// Simultaneous hardware/system sample from the driver.
    CrossTimestamp,
    /// Average of bracketed hardware reads.
    Averaged,
    /// Packets are stamped in system realtime; only the system step applies.
    SystemOnly,
}

impl std::fmt::Display for OffsetStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CrossTimestamp => write!(f, "cross-timestamp"),
            Self::Averaged => write!(f, "averaged"),
            Self::SystemOnly => write!(f, "system-only"),
        }
    }
}

/// Maps OS packet timestamps into the application time base.
pub enum OffsetEstimator {
    /// Hardware stamps, translated with a precise cross-timestamp.
    HardwareCrossTimestamp {
        /// Hardware clock to sample
        clock: Box<dyn HardwareClock>,
        /// Samples averaged if the cross-timestamp fails
        samples: usize,
    },
    /// Hardware stamps, translated with the mean of bracketed samples.
    HardwareAveraged {
        /// Hardware clock to sample
        clock: Box<dyn HardwareClock>,
        /// Samples per estimate
        samples: usize,
    },
    /// Software stamps in system realtime.
    SystemOnly,
}

impl std::fmt::Debug for OffsetEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HardwareCrossTimestamp { samples, .. } => f
                .debug_struct("HardwareCrossTimestamp")
                .field("samples", samples)
                .finish_non_exhaustive(),
            Self::HardwareAveraged { samples, .. } => f
                .debug_struct("HardwareAveraged")
                .field("samples", samples)
                .finish_non_exhaustive(),
            Self::SystemOnly => write!(f, "{}", self.strategy()),
        }
    }
}

impl OffsetEstimator {
    /// Choose a strategy for an optional hardware clock.
    ///
    /// Cross-timestamping is used when the clock supports it, averaging
    /// otherwise. Without a hardware clock only the system step is needed.
    /// `samples` is clamped to at least one.
    #[must_use]
    pub fn select(hardware: Option<Box<dyn HardwareClock>>, samples: usize) -> Self {
        let samples = samples.max(1);
        match hardware {
            Some(clock) if clock.supports_cross_timestamp() => {
                Self::HardwareCrossTimestamp { clock, samples }
            }
            Some(clock) => Self::HardwareAveraged { clock, samples },
            None => Self::SystemOnly,
        }
    }

    /// The configured strategy.
    #[must_use]
    pub fn strategy(&self) -> OffsetStrategy {
        match self {
            Self::HardwareCrossTimestamp { .. } => OffsetStrategy::CrossTimestamp,
            Self::HardwareAveraged { .. } => OffsetStrategy::Averaged,
            Self::SystemOnly => OffsetStrategy::SystemOnly,
        }
    }

    /// Estimate the translation offset in microseconds.
    ///
    /// A failing cross-timestamp falls back to averaging, and failed
    /// averaging falls back to the system step alone. Each fallback is
    /// logged.
    pub fn estimate(&self, clock: &dyn ClockSource) -> i64 {
        let system_to_app = clock.system_to_application_micros();
        match self {
            Self::SystemOnly => system_to_app,
            Self::HardwareCrossTimestamp { clock: hw, samples } => match hw.cross_timestamp() {
                Ok(sample) => sample.system - sample.hardware + system_to_app,
                Err(e) => {
                    tracing::warn!(error = %e, "Cross-timestamp failed, averaging samples instead");
                    Self::averaged(hw.as_ref(), *samples, system_to_app)
                }
            },
            Self::HardwareAveraged { clock: hw, samples } => {
                Self::averaged(hw.as_ref(), *samples, system_to_app)
            }
        }
    }

    fn averaged(hw: &dyn HardwareClock, samples: usize, system_to_app: i64) -> i64 {
        let mut sum = 0i64;
        let mut count = 0i64;
        for _ in 0..samples {
            match hw.bracketed_sample() {
                Ok(sample) => {
                    sum += sample.offset_micros();
                    count += 1;
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Hardware clock sample failed");
                }
            }
        }
        if count == 0 {
            tracing::warn!("No hardware clock samples, using system offset only");
            return system_to_app;
        }
        sum / count + system_to_app
    }
}
