//! Network abstraction layer
//!
//! The sync engine talks to a [`PacketTransport`]; production code uses the
//! kernel-timestamping [`TimestampingSocket`], tests substitute scripted or
//! loopback transports.

#[cfg(target_os = "linux")]
pub(crate) mod sys;
mod timestamping;
mod traits;


pub use timestamping::TimestampingSocket;
pub use traits::{Datagram, PacketTimestamp, PacketTransport, TimestampSource};
