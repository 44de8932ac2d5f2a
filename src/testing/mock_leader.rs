//! Mock timesync leader for testing purposes.
//!
//! Runs the leader side of the protocol over a real tokio UDP socket:
//! periodic sync (one- or two-stage) to a follower, and a delay response for
//! each delay request. The leader's clock is the host monotonic clock shifted
//! by a configurable amount, so loopback tests know the offset to expect.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use super::network_sim::NetworkSimulator;
use crate::clock::{ClockSource, SystemClock};
use crate::protocol::timesync::{MessageKind, RoundStage, TimesyncPacket};

/// Configuration for the mock leader.
#[derive(Debug, Clone)]
pub struct MockLeaderConfig {
    /// Address to bind (port 0 for ephemeral).
    pub bind_addr: SocketAddr,
    /// Interval between sync broadcasts.
    pub sync_interval: Duration,
    /// Send t0 in a separate followup.
    pub two_stage: bool,
    /// How far the follower's clock should read ahead of the leader's, in microseconds.
    pub follower_ahead_micros: i64,
    /// How long to wait for a delay request after each sync.
    pub response_timeout: Duration,
    /// Simulated loss and delay on leader-to-follower packets.
    pub network: NetworkSimulator,
}

impl Default for MockLeaderConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            sync_interval: Duration::from_millis(20),
            two_stage: true,
            follower_ahead_micros: 0,
            response_timeout: Duration::from_millis(100),
            network: NetworkSimulator::perfect(),
        }
    }
}

/// A mock leader.
pub struct MockLeader {
    config: MockLeaderConfig,
    address: Option<SocketAddr>,
    responses: Arc<AtomicU64>,
    shutdown: Option<mpsc::Sender<()>>,
}

impl MockLeader {
    /// Create a new mock leader.
    #[must_use]
    pub fn new(config: MockLeaderConfig) -> Self {
        Self {
            config,
            address: None,
            responses: Arc::new(AtomicU64::new(0)),
            shutdown: None,
        }
    }

    /// Start serving `follower`.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound.
    pub async fn start(&mut self, follower: SocketAddr) -> Result<SocketAddr, std::io::Error> {
        let socket = UdpSocket::bind(self.config.bind_addr).await?;
        let address = socket.local_addr()?;
        self.address = Some(address);

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        self.shutdown = Some(shutdown_tx);

        let config = self.config.clone();
        let responses = Arc::clone(&self.responses);
        tokio::spawn(async move {
            let leader = LeaderLoop {
                socket,
                follower,
                config,
                responses,
                next_id: 1,
            };
            tokio::select! {
                () = leader.run() => {}
                _ = shutdown_rx.recv() => {
                    tracing::debug!("Mock leader shutting down");
                }
            }
        });

        tracing::info!(%address, %follower, "Mock leader started");
        Ok(address)
    }

    /// Stop the leader task.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(()).await;
        }
    }

    /// Bound address, once started.
    #[must_use]
    pub fn address(&self) -> Option<SocketAddr> {
        self.address
    }

    /// Delay responses issued so far.
    #[must_use]
    pub fn responses_sent(&self) -> u64 {
        self.responses.load(Ordering::Relaxed)
    }
}

struct LeaderLoop {
    socket: UdpSocket,
    follower: SocketAddr,
    config: MockLeaderConfig,
    responses: Arc<AtomicU64>,
    next_id: u32,
}

impl LeaderLoop {
    fn now(&self) -> u64 {
        let micros = SystemClock::new().monotonic_micros() - self.config.follower_ahead_micros;
        u64::try_from(micros).unwrap_or(0)
    }

    fn take_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    async fn send(&self, packet: TimesyncPacket) {
        if let Err(e) = self.socket.send_to(&packet.encode(), self.follower).await {
            tracing::warn!(error = %e, "Mock leader send failed");
        }
    }

    async fn run(mut self) {
        let mut interval = tokio::time::interval(self.config.sync_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.round().await;
        }
    }

    async fn round(&mut self) {
        let sync_id = self.take_id();
        if self.config.network.should_drop() {
            tracing::trace!(sync_id, "Mock leader dropped sync");
            return;
        }

        if self.config.two_stage {
            let t0 = self.now();
            self.send(TimesyncPacket::sync(sync_id, None)).await;
            let follow_up_id = self.take_id();
            self.send(TimesyncPacket::follow_up(follow_up_id, t0)).await;
        } else {
            let t0 = self.now();
            self.send(TimesyncPacket::sync(sync_id, Some(t0))).await;
        }

        let mut buf = [0u8; 64];
        let received =
            tokio::time::timeout(self.config.response_timeout, self.socket.recv_from(&mut buf))
                .await;
        let t3 = self.now();
        let Ok(Ok((len, from))) = received else {
            return;
        };
        let Ok(request) = TimesyncPacket::decode(&buf[..len]) else {
            return;
        };
        if MessageKind::DelayRequest
            .validate(&request, RoundStage::SendDelayRequest)
            .is_err()
        {
            tracing::warn!(%request, "Mock leader ignoring bad delay request");
            return;
        }

        self.next_id = request.packet_id.wrapping_add(1);
        let response_id = self.take_id();
        let delay = self.config.network.get_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.responses.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = self
            .socket
            .send_to(&TimesyncPacket::delay_response(response_id, t3).encode(), from)
            .await
        {
            tracing::warn!(error = %e, "Mock leader response failed");
        }
    }
}
