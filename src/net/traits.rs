//! Datagram transport traits for the sync engine

use std::net::SocketAddr;

use crate::error::SocketError;

/// Which clock produced a packet timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimestampSource {
    /// Network interface hardware clock
    Hardware,
    /// Kernel software stamp in system realtime
    Software,
}

/// An OS-captured packet timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketTimestamp {
    /// Seconds in the stamping clock's epoch
    pub seconds: i64,
    /// Nanoseconds within the second
    pub nanos: u32,
    /// Clock that produced the stamp
    pub source: TimestampSource,
}

impl PacketTimestamp {
    /// Create a timestamp
    #[must_use]
    pub fn new(seconds: i64, nanos: u32, source: TimestampSource) -> Self {
        Self {
            seconds,
            nanos,
            source,
        }
    }

    /// Build from whole microseconds
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "rem_euclid keeps the sub-second part in 0..1_000_000"
    )]
    pub fn from_micros(micros: i64, source: TimestampSource) -> Self {
        Self {
            seconds: micros.div_euclid(1_000_000),
            nanos: (micros.rem_euclid(1_000_000) * 1_000) as u32,
            source,
        }
    }

    /// Total microseconds, truncating sub-microsecond precision
    #[must_use]
    pub fn to_micros(&self) -> i64 {
        self.seconds * 1_000_000 + i64::from(self.nanos / 1_000)
    }
}

/// A received datagram with its optional OS timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Datagram {
    /// Bytes written into the caller's buffer
    pub len: usize,
    /// Sender address
    pub source: SocketAddr,
    /// Receive timestamp, if the OS attached one
    pub timestamp: Option<PacketTimestamp>,
}

/// Blocking datagram transport with bounded timeouts.
///
/// Every operation either succeeds, reports `SocketError::WouldBlock`
/// after its timeout, or fails with a hard I/O error.
pub trait PacketTransport: Send {
    /// Send one datagram
    ///
    /// # Errors
    ///
    /// Returns `SocketError::WouldBlock` on timeout, `SocketError::Io` otherwise.
    fn send_to(&mut self, payload: &[u8], target: SocketAddr) -> Result<usize, SocketError>;

    /// Receive one datagram without timestamp information
    ///
    /// # Errors
    ///
    /// Returns `SocketError::WouldBlock` on timeout, `SocketError::Io` otherwise.
    fn recv_from(&mut self, buf: &mut [u8]) -> Result<(usize, SocketAddr), SocketError>;

    /// Receive one datagram together with its receive timestamp
    ///
    /// # Errors
    ///
    /// Returns `SocketError::WouldBlock` on timeout, `SocketError::Io` otherwise.
    fn recv_timestamped(&mut self, buf: &mut [u8]) -> Result<Datagram, SocketError>;

    /// Collect the transmit timestamp of the most recently sent datagram
    ///
    /// # Errors
    ///
    /// Returns `SocketError::WouldBlock` if no stamp arrives in time,
    /// `SocketError::Io` otherwise.
    fn tx_timestamp(&mut self) -> Result<PacketTimestamp, SocketError>;
}
