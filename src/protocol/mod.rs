//! Protocol module

pub mod timesync;
