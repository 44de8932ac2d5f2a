//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use vision_timesync::clock::TimestampMode;
use vision_timesync::net::{PacketTransport, TimestampingSocket};

/// Install a tracing subscriber honouring `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Loopback address with an ephemeral port.
pub fn loopback() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 0))
}

/// Bind a software-timestamping socket on loopback.
pub fn software_socket() -> Option<TimestampingSocket> {
    TimestampingSocket::bind(loopback(), TimestampMode::Software, Duration::from_millis(50)).ok()
}

/// Whether the kernel delivers software RX and TX stamps on loopback.
pub fn loopback_timestamping_available() -> bool {
    let Some(mut socket) = software_socket() else {
        tracing::warn!("SO_TIMESTAMPING rejected on loopback, skipping");
        return false;
    };
    let Ok(addr) = socket.local_addr() else {
        return false;
    };
    let mut buf = [0u8; 16];
    let ok = socket.send_to(b"probe", addr).is_ok()
        && socket.tx_timestamp().is_ok()
        && socket
            .recv_timestamped(&mut buf)
            .is_ok_and(|d| d.timestamp.is_some());
    if !ok {
        tracing::warn!("Loopback packet timestamps unavailable, skipping");
    }
    ok
}

/// Poll `condition` until it holds or `timeout` passes.
pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
