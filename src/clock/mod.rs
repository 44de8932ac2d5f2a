//! Local clocks and the packet-timestamp translation offset.
//!
//! The OS stamps packets with either the network interface's hardware
//! clock (PHC) or the system realtime clock. The sync engine works in the
//! application's monotonic time base, so once per round it asks the
//! [`OffsetEstimator`] for the constant that maps one onto the other.

pub mod capabilities;
pub mod estimator;
pub mod phc;
pub mod source;


pub use capabilities::{ClockCapabilities, TimestampMode};
pub use estimator::{OffsetEstimator, OffsetStrategy};
#[cfg(target_os = "linux")]
pub use phc::PhcClock;
pub use phc::{BracketedSample, CrossTimestamp, HardwareClock};
pub use source::{ClockSource, SystemClock};
