//! Core types module

mod config;
mod stats;

#[cfg(test)]
mod tests;

pub use config::{DEFAULT_PORT, TimeSyncConfig, TimeSyncConfigBuilder};
pub use stats::{SyncStats, SyncStatsSnapshot};
