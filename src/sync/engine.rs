//! Four-message follower round.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::clock::{ClockSource, OffsetEstimator, OffsetStrategy};
use crate::error::RoundError;
use crate::net::{PacketTimestamp, PacketTransport};
use crate::protocol::timesync::round::wire_micros;
use crate::protocol::timesync::{MessageKind, RoundStage, RoundTimestamps, SyncMode, TimesyncPacket};

const RECV_BUF_SIZE: usize = 64;

/// Result of a completed round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundOutcome {
    /// The four captured timestamps.
    pub timestamps: RoundTimestamps,
    /// Follower-minus-leader offset in microseconds.
    pub offset: i64,
    /// One-way path delay in microseconds.
    pub path_delay: i64,
    /// Whether t0 arrived in the sync or in a followup.
    pub mode: SyncMode,
    /// Leader endpoint the round was run against.
    pub leader: SocketAddr,
}

/// Drives one synchronization round at a time over a [`PacketTransport`].
///
/// The engine owns the transport and the offset estimator exclusively. It
/// keeps no state between rounds; a failed round leaves nothing behind.
pub struct SyncEngine<T> {
    transport: T,
    estimator: OffsetEstimator,
    clock: Arc<dyn ClockSource>,
    leader: Option<SocketAddr>,
}

impl<T: PacketTransport> SyncEngine<T> {
    /// Create an engine that follows whichever host sends the sync.
    pub fn new(transport: T, estimator: OffsetEstimator, clock: Arc<dyn ClockSource>) -> Self {
        Self {
            transport,
            estimator,
            clock,
            leader: None,
        }
    }

    /// Only accept packets from this leader and send delay requests to it.
    #[must_use]
    pub fn with_leader(mut self, leader: Option<SocketAddr>) -> Self {
        self.leader = leader;
        self
    }

    /// Configured leader, if pinned.
    pub fn leader(&self) -> Option<SocketAddr> {
        self.leader
    }

    /// Offset estimation strategy in use.
    pub fn strategy(&self) -> OffsetStrategy {
        self.estimator.strategy()
    }

    /// Application clock shared with the facade.
    pub fn clock(&self) -> &Arc<dyn ClockSource> {
        &self.clock
    }

    /// Underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run one full round: sync, optional followup, delay request, delay response.
    ///
    /// # Errors
    /// Returns the first failure encountered. Nothing is published on error.
    pub fn run_round(&mut self) -> Result<RoundOutcome, RoundError> {
        let mut buf = [0u8; RECV_BUF_SIZE];

        // WaitSync
        let stage = RoundStage::WaitSync;
        let datagram = self
            .transport
            .recv_timestamped(&mut buf)
            .map_err(|e| RoundError::from_socket(stage, e))?;
        if let Some(leader) = self.leader {
            check_source(stage, leader.ip(), datagram.source)?;
        }
        let sync = decode(stage, &buf[..datagram.len])?;
        MessageKind::Sync.validate(&sync, stage)?;

        let leader = self.leader.unwrap_or(datagram.source);
        let mut cursor = sync.packet_id;
        let translation = self.estimator.estimate(self.clock.as_ref());
        let t1 = translate(stage, datagram.timestamp, translation)?;
        tracing::trace!(%sync, %leader, translation, "Sync received");

        // WaitFollowUp (two-stage only)
        let (t0, mode) = if sync.has_time() {
            (wire_micros(sync.timestamp, stage)?, SyncMode::OneStage)
        } else {
            let stage = RoundStage::WaitFollowUp;
            let follow_up =
                self.recv_expected(stage, MessageKind::FollowUp, leader.ip(), cursor, &mut buf)?;
            cursor = follow_up.packet_id;
            (wire_micros(follow_up.timestamp, stage)?, SyncMode::TwoStage)
        };

        // SendDelayRequest
        let stage = RoundStage::SendDelayRequest;
        cursor = cursor.wrapping_add(1);
        let request = TimesyncPacket::delay_request(cursor);
        self.transport
            .send_to(&request.encode(), leader)
            .map_err(|e| RoundError::from_socket(stage, e))?;
        let tx = self
            .transport
            .tx_timestamp()
            .map_err(|e| RoundError::from_socket(stage, e))?;
        let t2 = translate(stage, Some(tx), translation)?;

        // WaitDelayResponse
        let stage = RoundStage::WaitDelayResponse;
        let response =
            self.recv_expected(stage, MessageKind::DelayResponse, leader.ip(), cursor, &mut buf)?;
        let t3 = wire_micros(response.timestamp, stage)?;

        let timestamps = RoundTimestamps::new(t0, t1, t2, t3);
        let (Some(offset), Some(path_delay)) =
            (timestamps.offset_micros(), timestamps.path_delay_micros())
        else {
            return Err(RoundError::OffsetOverflow { stage, timestamps });
        };
        Ok(RoundOutcome {
            timestamps,
            offset,
            path_delay,
            mode,
            leader,
        })
    }

    /// Receive the packet that must follow `cursor`, from the round's leader.
    fn recv_expected(
        &mut self,
        stage: RoundStage,
        kind: MessageKind,
        leader: IpAddr,
        cursor: u32,
        buf: &mut [u8],
    ) -> Result<TimesyncPacket, RoundError> {
        let (len, source) = self
            .transport
            .recv_from(buf)
            .map_err(|e| RoundError::from_socket(stage, e))?;
        check_source(stage, leader, source)?;
        let packet = decode(stage, &buf[..len])?;
        kind.validate(&packet, stage)?;

        let expected = cursor.wrapping_add(1);
        if packet.packet_id != expected {
            return Err(RoundError::SequenceMismatch {
                stage,
                expected,
                actual: packet.packet_id,
            });
        }
        tracing::trace!(%packet, "{kind} received");
        Ok(packet)
    }

    /// Take the engine apart.
    pub fn into_parts(self) -> (T, OffsetEstimator, Arc<dyn ClockSource>) {
        (self.transport, self.estimator, self.clock)
    }
}

impl<T> std::fmt::Debug for SyncEngine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("estimator", &self.estimator)
            .field("leader", &self.leader)
            .finish_non_exhaustive()
    }
}

fn decode(stage: RoundStage, data: &[u8]) -> Result<TimesyncPacket, RoundError> {
    TimesyncPacket::decode(data).map_err(|source| RoundError::Decode { stage, source })
}

fn check_source(stage: RoundStage, expected: IpAddr, actual: SocketAddr) -> Result<(), RoundError> {
    if actual.ip() == expected {
        Ok(())
    } else {
        Err(RoundError::UnexpectedSource {
            stage,
            expected,
            actual,
        })
    }
}

fn translate(
    stage: RoundStage,
    stamp: Option<PacketTimestamp>,
    translation: i64,
) -> Result<i64, RoundError> {
    stamp
        .map(|ts| ts.to_micros() + translation)
        .ok_or(RoundError::MissingTimestamp { stage })
}
