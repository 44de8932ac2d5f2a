use std::io;
use std::net::{IpAddr, SocketAddr};

use thiserror::Error;

use crate::protocol::timesync::{PacketDecodeError, PacketFlags, RoundStage, RoundTimestamps};

/// Outcome of a single timestamping-socket operation that did not succeed.
///
/// A would-block or timeout is non-fatal; everything else is a hard I/O error.
#[derive(Debug, Error)]
pub enum SocketError {
    /// The operation timed out or would have blocked
    #[error("operation would block or timed out")]
    WouldBlock,

    /// Hard I/O error from the operating system
    #[error("socket I/O error: {0}")]
    Io(#[source] io::Error),
}

impl From<io::Error> for SocketError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Self::WouldBlock,
            _ => Self::Io(err),
        }
    }
}

/// Errors that abort a single synchronization round.
///
/// None of these are fatal: the published offset is left untouched and the
/// runner starts a fresh round.
#[derive(Debug, Error)]
pub enum RoundError {
    /// A send or receive timed out
    #[error("{stage}: timed out")]
    Timeout {
        /// Stage in which the timeout occurred
        stage: RoundStage,
    },

    /// Hard socket error
    #[error("{stage}: I/O error: {source}")]
    Io {
        /// Stage in which the error occurred
        stage: RoundStage,
        /// The underlying error
        #[source]
        source: io::Error,
    },

    /// Datagram could not be decoded as a timesync packet
    #[error("{stage}: {source}")]
    Decode {
        /// Stage in which the packet was received
        stage: RoundStage,
        /// The decode failure
        #[source]
        source: PacketDecodeError,
    },

    /// Packet flags did not match the rules for this stage
    #[error("{stage}: unexpected flags {actual} (required {expected}, forbidden {forbidden})")]
    UnexpectedFlags {
        /// Stage in which the packet was received
        stage: RoundStage,
        /// Flags that must be set
        expected: PacketFlags,
        /// Flags that must be clear
        forbidden: PacketFlags,
        /// Flags actually present
        actual: PacketFlags,
    },

    /// Leader flagged the packet with the ERROR bit
    #[error("{stage}: leader reported an error in packet {packet_id}")]
    LeaderError {
        /// Stage in which the packet was received
        stage: RoundStage,
        /// Id of the offending packet
        packet_id: u32,
    },

    /// Packet id did not continue the round's sequence
    #[error("{stage}: sequence mismatch, expected id {expected}, got {actual}")]
    SequenceMismatch {
        /// Stage in which the packet was received
        stage: RoundStage,
        /// Id the follower was waiting for
        expected: u32,
        /// Id actually received
        actual: u32,
    },

    /// Datagram came from somewhere other than the leader
    #[error("{stage}: datagram from {actual}, expected leader {expected}")]
    UnexpectedSource {
        /// Stage in which the datagram was received
        stage: RoundStage,
        /// Leader IP for this round
        expected: IpAddr,
        /// Actual sender
        actual: SocketAddr,
    },

    /// The OS did not attach a packet timestamp
    #[error("{stage}: no packet timestamp available")]
    MissingTimestamp {
        /// Stage that needed the timestamp
        stage: RoundStage,
    },

    /// Timestamp does not fit the signed microsecond range
    #[error("{stage}: timestamp {value} out of range")]
    TimestampOutOfRange {
        /// Stage in which the timestamp was read
        stage: RoundStage,
        /// Raw wire value
        value: u64,
    },

    /// Round timestamps too far apart to yield an offset
    #[error("{stage}: offset of {timestamps:?} out of range")]
    OffsetOverflow {
        /// Stage that completed the timestamps
        stage: RoundStage,
        /// The four timestamps of the round
        timestamps: RoundTimestamps,
    },
}

impl RoundError {
    /// Build a round error from a socket outcome.
    #[must_use]
    pub fn from_socket(stage: RoundStage, err: SocketError) -> Self {
        match err {
            SocketError::WouldBlock => Self::Timeout { stage },
            SocketError::Io(source) => Self::Io { stage, source },
        }
    }

    /// Stage the round was in when it failed.
    #[must_use]
    pub fn stage(&self) -> RoundStage {
        match self {
            Self::Timeout { stage }
            | Self::Io { stage, .. }
            | Self::Decode { stage, .. }
            | Self::UnexpectedFlags { stage, .. }
            | Self::LeaderError { stage, .. }
            | Self::SequenceMismatch { stage, .. }
            | Self::UnexpectedSource { stage, .. }
            | Self::MissingTimestamp { stage }
            | Self::TimestampOutOfRange { stage, .. }
            | Self::OffsetOverflow { stage, .. } => *stage,
        }
    }

    /// Whether this is an ordinary timeout rather than a fault
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether the leader (or something pretending to be it) broke the protocol
    #[must_use]
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::Decode { .. }
                | Self::UnexpectedFlags { .. }
                | Self::LeaderError { .. }
                | Self::SequenceMismatch { .. }
                | Self::UnexpectedSource { .. }
                | Self::OffsetOverflow { .. }
        )
    }
}

/// Errors surfaced by the time synchronization subsystem
#[derive(Debug, Error)]
pub enum TimeSyncError {
    /// Round failure (never fatal)
    #[error("round failed: {0}")]
    Round(#[from] RoundError),

    // ===== Construction Errors =====
    /// Network interface could not be queried for timestamping support
    #[error("failed to query timestamping capabilities of {interface}: {source}")]
    InterfaceQuery {
        /// Interface name
        interface: String,
        /// The underlying error
        #[source]
        source: io::Error,
    },

    /// A required socket option could not be set
    #[error("failed to set socket option {option}: {source}")]
    SocketOption {
        /// Option name
        option: &'static str,
        /// The underlying error
        #[source]
        source: io::Error,
    },

    /// Socket could not be bound
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested local address
        addr: SocketAddr,
        /// The underlying error
        #[source]
        source: io::Error,
    },

    /// Advertised hardware clock could not be opened
    #[error("failed to open hardware clock {path}: {source}")]
    HardwareClock {
        /// Device path
        path: String,
        /// The underlying error
        #[source]
        source: io::Error,
    },

    /// Platform lacks a required feature
    #[error("unsupported: {feature}")]
    Unsupported {
        /// The missing feature
        feature: String,
    },

    /// Invalid or unreadable configuration
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the problem
        message: String,
    },

    // ===== Runner Errors =====
    /// Background thread could not be spawned
    #[error("failed to spawn sync thread: {0}")]
    Spawn(#[source] io::Error),

    /// Background thread panicked and took the engine with it
    #[error("sync engine lost after background thread panic")]
    EngineLost,
}

impl TimeSyncError {
    /// Whether the subsystem is unusable after this error
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Round(_))
    }
}

/// Result type alias for time synchronization operations
pub type Result<T> = std::result::Result<T, TimeSyncError>;
