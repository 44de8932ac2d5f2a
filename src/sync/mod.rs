//! Follower synchronization: the round state machine and the thread that drives it.

mod engine;
mod runner;


pub use engine::{RoundOutcome, SyncEngine};
pub use runner::{SharedOffset, SyncRunner};
