//! UDP socket with kernel packet timestamping.
//!
//! Receive stamps arrive as `SCM_TIMESTAMPING` control messages; transmit
//! stamps are looped back through the socket's error queue.

use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use super::traits::{Datagram, PacketTimestamp, PacketTransport};
use crate::clock::TimestampMode;
use crate::error::SocketError;
#[cfg(not(target_os = "linux"))]
use crate::error::TimeSyncError;

/// A bound UDP socket that reports OS send and receive timestamps.
#[derive(Debug)]
pub struct TimestampingSocket {
    socket: UdpSocket,
    mode: TimestampMode,
    io_timeout: Duration,
}

impl TimestampingSocket {
    /// Timestamping mode the socket was configured for.
    #[must_use]
    pub fn mode(&self) -> TimestampMode {
        self.mode
    }

    /// Send/receive timeout.
    #[must_use]
    pub fn io_timeout(&self) -> Duration {
        self.io_timeout
    }

    /// Locally bound address.
    ///
    /// # Errors
    /// Returns the OS error if the address cannot be read.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

#[cfg(target_os = "linux")]
mod imp {
    use std::net::{SocketAddr, UdpSocket};
    use std::os::fd::AsRawFd;
    use std::time::{Duration, Instant};

    use super::TimestampingSocket;
    use crate::clock::TimestampMode;
    use crate::error::{SocketError, TimeSyncError};
    use crate::net::sys::{
        self, RawTimestamps, SOF_TIMESTAMPING_OPT_TSONLY, SOF_TIMESTAMPING_RAW_HARDWARE,
        SOF_TIMESTAMPING_RX_HARDWARE, SOF_TIMESTAMPING_RX_SOFTWARE, SOF_TIMESTAMPING_SOFTWARE,
        SOF_TIMESTAMPING_TX_HARDWARE, SOF_TIMESTAMPING_TX_SOFTWARE,
    };
    use crate::net::traits::{PacketTimestamp, TimestampSource};

    fn timestamping_flags(mode: TimestampMode) -> u32 {
        match mode {
            TimestampMode::Hardware => {
                SOF_TIMESTAMPING_TX_HARDWARE
                    | SOF_TIMESTAMPING_RX_HARDWARE
                    | SOF_TIMESTAMPING_RAW_HARDWARE
                    | SOF_TIMESTAMPING_OPT_TSONLY
            }
            TimestampMode::Software => {
                SOF_TIMESTAMPING_TX_SOFTWARE
                    | SOF_TIMESTAMPING_RX_SOFTWARE
                    | SOF_TIMESTAMPING_SOFTWARE
                    | SOF_TIMESTAMPING_OPT_TSONLY
            }
        }
    }

    impl TimestampingSocket {
        /// Bind a socket and enable broadcast reception, I/O timeouts and
        /// packet timestamping in the given mode.
        ///
        /// # Errors
        /// Returns `TimeSyncError::Bind` if the address is unavailable, or
        /// `TimeSyncError::SocketOption` if any option is rejected.
        pub fn bind(
            addr: SocketAddr,
            mode: TimestampMode,
            io_timeout: Duration,
        ) -> Result<Self, TimeSyncError> {
            let socket =
                UdpSocket::bind(addr).map_err(|source| TimeSyncError::Bind { addr, source })?;
            let option = |option: &'static str| {
                move |source: std::io::Error| TimeSyncError::SocketOption { option, source }
            };

            socket.set_broadcast(true).map_err(option("SO_BROADCAST"))?;
            socket
                .set_read_timeout(Some(io_timeout))
                .map_err(option("SO_RCVTIMEO"))?;
            socket
                .set_write_timeout(Some(io_timeout))
                .map_err(option("SO_SNDTIMEO"))?;
            sys::set_timestamping(socket.as_raw_fd(), timestamping_flags(mode))
                .map_err(option("SO_TIMESTAMPING"))?;

            tracing::info!(
                local = ?socket.local_addr().ok(),
                %mode,
                timeout_ms = io_timeout.as_millis(),
                "Timestamping socket bound"
            );
            Ok(Self {
                socket,
                mode,
                io_timeout,
            })
        }

        pub(super) fn socket(&self) -> &UdpSocket {
            &self.socket
        }

        pub(super) fn pick(&self, stamps: RawTimestamps) -> Option<PacketTimestamp> {
            let (raw, source) = match self.mode {
                TimestampMode::Hardware => (stamps.hardware, TimestampSource::Hardware),
                TimestampMode::Software => (stamps.software, TimestampSource::Software),
            };
            raw.map(|(seconds, nanos)| PacketTimestamp::new(seconds, nanos, source))
        }

        pub(super) fn drain_stale_tx_stamps(&self) {
            if let Err(e) = sys::drain_error_queue(self.socket.as_raw_fd()) {
                tracing::debug!(error = %e, "Failed to drain error queue");
            }
        }

        pub(super) fn recv_with_stamp(
            &self,
            buf: &mut [u8],
        ) -> Result<(usize, SocketAddr, Option<PacketTimestamp>), SocketError> {
            let info = sys::recv_msg(self.socket.as_raw_fd(), buf, 0)?;
            let source = info.source.ok_or_else(|| {
                SocketError::Io(std::io::Error::other("datagram without IP source address"))
            })?;
            let stamp = info.timestamps.and_then(|t| self.pick(t));
            Ok((info.len, source, stamp))
        }

        pub(super) fn wait_tx_stamp(&self) -> Result<PacketTimestamp, SocketError> {
            let fd = self.socket.as_raw_fd();
            let deadline = Instant::now() + self.io_timeout;
            let mut scratch = [0u8; 64];
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() || !sys::poll_error_queue(fd, remaining)? {
                    return Err(SocketError::WouldBlock);
                }
                let info = sys::recv_msg(fd, &mut scratch, libc::MSG_ERRQUEUE | libc::MSG_DONTWAIT)?;
                if let Some(stamp) = info.timestamps.and_then(|t| self.pick(t)) {
                    return Ok(stamp);
                }
                tracing::trace!("Error queue entry without a usable timestamp");
            }
        }
    }
}

#[cfg(not(target_os = "linux"))]
impl TimestampingSocket {
    /// Packet timestamping needs Linux `SO_TIMESTAMPING`.
    ///
    /// # Errors
    /// Always returns `TimeSyncError::Unsupported`.
    pub fn bind(
        _addr: SocketAddr,
        _mode: TimestampMode,
        _io_timeout: Duration,
    ) -> Result<Self, TimeSyncError> {
        Err(TimeSyncError::Unsupported {
            feature: "SO_TIMESTAMPING".to_string(),
        })
    }
}

#[cfg(target_os = "linux")]
impl PacketTransport for TimestampingSocket {
    fn send_to(&mut self, payload: &[u8], target: SocketAddr) -> Result<usize, SocketError> {
        // a stale stamp would be mistaken for this packet's
        self.drain_stale_tx_stamps();
        Ok(self.socket().send_to(payload, target)?)
    }

    fn recv_from(&mut self, buf: &mut [u8]) -> Result<(usize, SocketAddr), SocketError> {
        Ok(self.socket().recv_from(buf)?)
    }

    fn recv_timestamped(&mut self, buf: &mut [u8]) -> Result<Datagram, SocketError> {
        let (len, source, timestamp) = self.recv_with_stamp(buf)?;
        Ok(Datagram {
            len,
            source,
            timestamp,
        })
    }

    fn tx_timestamp(&mut self) -> Result<PacketTimestamp, SocketError> {
        self.wait_tx_stamp()
    }
}

#[cfg(not(target_os = "linux"))]
impl PacketTransport for TimestampingSocket {
    fn send_to(&mut self, payload: &[u8], target: SocketAddr) -> Result<usize, SocketError> {
        Ok(self.socket.send_to(payload, target)?)
    }

    fn recv_from(&mut self, buf: &mut [u8]) -> Result<(usize, SocketAddr), SocketError> {
        Ok(self.socket.recv_from(buf)?)
    }

    fn recv_timestamped(&mut self, buf: &mut [u8]) -> Result<Datagram, SocketError> {
        let (len, source) = self.socket.recv_from(buf)?;
        Ok(Datagram {
            len,
            source,
            timestamp: None,
        })
    }

    fn tx_timestamp(&mut self) -> Result<PacketTimestamp, SocketError> {
        Err(SocketError::Io(std::io::Error::from(
            std::io::ErrorKind::Unsupported,
        )))
    }
}
