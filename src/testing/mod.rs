//! Test doubles: clocks, transports and leaders.

pub mod clock;
pub mod loopback;
pub mod mock_leader;
pub mod network_sim;
pub mod scripted;
#[cfg(test)]
/// Unit tests for the test doubles.
pub mod tests;

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

pub use clock::ManualClock;
pub use loopback::LoopbackLeader;
pub use mock_leader::{MockLeader, MockLeaderConfig};
pub use network_sim::NetworkSimulator;
pub use scripted::{ScriptedRound, ScriptedTransport};

/// Address used for the leader in scripted tests.
#[must_use]
pub fn test_leader_addr() -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(192, 168, 10, 1), 5810))
}
