//! Per-round timestamps and offset arithmetic.
//!
//! Offsets follow the follower-minus-leader convention: a positive offset
//! means the follower's clock is ahead of the leader's.

use crate::error::RoundError;

/// Stage of the four-message round state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoundStage {
    /// Waiting for the leader's broadcast sync.
    WaitSync,
    /// Waiting for the followup carrying t0 (two-stage mode).
    WaitFollowUp,
    /// Sending the delay request and collecting its transmit timestamp.
    SendDelayRequest,
    /// Waiting for the leader's delay response carrying t3.
    WaitDelayResponse,
}

impl std::fmt::Display for RoundStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WaitSync => write!(f, "wait-sync"),
            Self::WaitFollowUp => write!(f, "wait-followup"),
            Self::SendDelayRequest => write!(f, "send-delay-request"),
            Self::WaitDelayResponse => write!(f, "wait-delay-response"),
        }
    }
}

/// How the leader delivered t0 for a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// t0 was carried in the sync packet itself.
    OneStage,
    /// t0 arrived in a separate followup packet.
    TwoStage,
}

/// The four timestamps of a completed round, in microseconds.
///
/// - `t0`: leader send time of sync (leader clock)
/// - `t1`: follower receive time of sync (follower application clock)
/// - `t2`: follower send time of delay request (follower application clock)
/// - `t3`: leader receive time of delay request (leader clock)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundTimestamps {
    /// Leader send time of sync.
    pub t0: i64,
    /// Follower receive time of sync.
    pub t1: i64,
    /// Follower send time of delay request.
    pub t2: i64,
    /// Leader receive time of delay request.
    pub t3: i64,
}

impl RoundTimestamps {
    /// Create from the four timestamps.
    #[must_use]
    pub fn new(t0: i64, t1: i64, t2: i64, t3: i64) -> Self {
        Self { t0, t1, t2, t3 }
    }

    /// Leader/follower offset in microseconds.
    ///
    /// From `offset + delay = t1 - t0` and `-offset + delay = t3 - t2`:
    /// offset = (t1 - t0 - t3 + t2) / 2, truncated toward zero.
    ///
    /// Returns `None` if the result does not fit in an `i64`.
    #[must_use]
    pub fn offset_micros(&self) -> Option<i64> {
        let [t0, t1, t2, t3] = self.widened();
        i64::try_from((t1 - t0 - t3 + t2) / 2).ok()
    }

    /// Estimated one-way path delay in microseconds (symmetric-path assumption).
    ///
    /// Returns `None` if the result does not fit in an `i64`.
    #[must_use]
    pub fn path_delay_micros(&self) -> Option<i64> {
        let [t0, t1, t2, t3] = self.widened();
        i64::try_from(((t1 - t0) + (t3 - t2)) / 2).ok()
    }

    /// Round trip time excluding follower turnaround, in microseconds.
    ///
    /// Returns `None` if the result does not fit in an `i64`.
    #[must_use]
    pub fn round_trip_micros(&self) -> Option<i64> {
        let [t0, t1, t2, t3] = self.widened();
        i64::try_from((t3 - t0) - (t2 - t1)).ok()
    }

    // four i64 terms cannot overflow an i128 sum
    fn widened(&self) -> [i128; 4] {
        [self.t0, self.t1, self.t2, self.t3].map(i128::from)
    }
}

/// Convert a wire timestamp to signed microseconds.
///
/// # Errors
/// Returns `RoundError::TimestampOutOfRange` if the value exceeds `i64::MAX`.
pub fn wire_micros(value: u64, stage: RoundStage) -> Result<i64, RoundError> {
    i64::try_from(value).map_err(|_| RoundError::TimestampOutOfRange { stage, value })
}
