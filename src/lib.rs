//! # vision-timesync
//!
//! Follower-side network clock synchronization for an on-robot vision stack.
//!
//! A leader on the robot's network periodically broadcasts sync messages;
//! this crate runs the follower half of a four-message exchange
//! (sync, optional followup, delay request, delay response) using kernel
//! packet timestamps, and publishes the follower-minus-leader clock offset
//! so camera frames can be stamped in the leader's time base.
//!
//! ## Example
//!
//! ```rust,no_run
//! use vision_timesync::{TimeSyncClient, TimeSyncConfig};
//!
//! # fn example() -> Result<(), vision_timesync::TimeSyncError> {
//! let client = TimeSyncClient::new(TimeSyncConfig::default())?;
//! client.start()?;
//!
//! let frame_time = client.now();
//! println!("frame captured at {frame_time}us leader time");
//!
//! client.stop()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **Facade**: [`TimeSyncClient`] - `start`, `stop`, `now`, `current_offset`
//! - **Runner / engine**: [`sync`] - background thread and round state machine
//! - **Clocks**: [`clock`] - capability query, hardware clock, offset estimation
//! - **Transport**: [`net`] - `SO_TIMESTAMPING` UDP socket
//! - **Wire format**: [`protocol::timesync`] - 13-byte packet codec

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
/// Error types
pub mod error;
/// Core types
pub mod types;

/// Testing utilities
pub mod testing;

pub mod clock;
mod client;
pub mod net;
pub mod protocol;
pub mod sync;

// Re-exports
pub use client::TimeSyncClient;
pub use error::{RoundError, SocketError, TimeSyncError};
pub use protocol::timesync::{PacketFlags, TimesyncPacket};
pub use types::{SyncStatsSnapshot, TimeSyncConfig, TimeSyncConfigBuilder};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for common imports
///
/// Convenient re-exports
pub mod prelude {
    pub use crate::{SyncStatsSnapshot, TimeSyncClient, TimeSyncConfig, TimeSyncError};
}
