//! Leader/follower time synchronization protocol.
//!
//! A four-message exchange modeled on IEEE 1588. All messages share one
//! 13-byte packet layout; the message type is implied by its flag bits.
//!
//! ## Flag Combinations
//!
//! - **Sync**: `LEADER | BROADCAST | CRITICAL` (plus `HASTIME` in one-stage mode)
//! - **Followup**: `LEADER | BROADCAST | HASTIME`, never `CRITICAL`
//! - **Delay request**: `CRITICAL` only
//! - **Delay response**: `LEADER | HASTIME`, never `BROADCAST` or `CRITICAL`
//!
//! Any packet carrying `ERROR` fails the round.
//!
//! ## Round Flow
//!
//! ```text
//! Leader                              Follower
//!   |--- Sync (id n, t0?) ------------->|  (follower records t1)
//!   |--- Followup (id n+1, t0) -------->|  (two-stage only)
//!   |                                   |
//!   |<---- Delay request (id n+2) ----- |  (follower records t2)
//!   |---- Delay response (id n+3, t3) ->|
//!   |                                   |
//!   |  offset = (t1 - t0 - t3 + t2) / 2 |
//! ```

pub mod packet;
pub mod round;

#[cfg(test)]
mod tests;

pub use packet::{MessageKind, PacketDecodeError, PacketFlags, TimesyncPacket};
pub use round::{RoundStage, RoundTimestamps, SyncMode};
