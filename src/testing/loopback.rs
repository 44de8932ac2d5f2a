//! In-process leader sharing a [`ManualClock`] with the follower.
//!
//! Every packet is delivered with zero delay: the leader's receive time is
//! the follower's send time and vice versa. The only difference between the
//! two sides is a fixed clock offset, so a correct engine recovers exactly
//! that offset.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use crate::clock::ClockSource;
use crate::error::SocketError;
use crate::net::{Datagram, PacketTimestamp, PacketTransport, TimestampSource};
use crate::protocol::timesync::{MessageKind, RoundStage, SyncMode, TimesyncPacket};

use super::clock::ManualClock;

const STEP_MICROS: i64 = 250;

#[derive(Debug, Clone, Copy)]
enum Pending {
    Idle,
    FollowUp(TimesyncPacket),
    Response(TimesyncPacket),
}

/// A leader implemented as a [`PacketTransport`].
#[derive(Debug)]
pub struct LoopbackLeader {
    clock: Arc<ManualClock>,
    mode: SyncMode,
    follower_ahead: i64,
    next_id: u32,
    pending: Pending,
    tx_stamp: Option<PacketTimestamp>,
    address: SocketAddr,
}

impl LoopbackLeader {
    /// Leader whose clock reads `follower_ahead` microseconds behind the follower.
    #[must_use]
    pub fn new(clock: Arc<ManualClock>, mode: SyncMode, follower_ahead: i64) -> Self {
        Self {
            clock,
            mode,
            follower_ahead,
            next_id: 1,
            pending: Pending::Idle,
            tx_stamp: None,
            address: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 5810)),
        }
    }

    /// Address the leader's packets appear to come from.
    #[must_use]
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    fn leader_now(&self) -> u64 {
        let micros = self.clock.monotonic_micros() - self.follower_ahead;
        u64::try_from(micros).unwrap_or(0)
    }

    fn os_stamp(&self) -> PacketTimestamp {
        PacketTimestamp::from_micros(self.clock.realtime_micros(), TimestampSource::Software)
    }

    fn take_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    fn write(buf: &mut [u8], packet: &TimesyncPacket) -> usize {
        let bytes = packet.encode();
        let len = bytes.len().min(buf.len());
        buf[..len].copy_from_slice(&bytes[..len]);
        len
    }
}

impl PacketTransport for LoopbackLeader {
    fn send_to(&mut self, payload: &[u8], _target: SocketAddr) -> Result<usize, SocketError> {
        self.clock.advance(STEP_MICROS);
        let request = TimesyncPacket::decode(payload)
            .map_err(|e| SocketError::Io(std::io::Error::other(e)))?;
        if MessageKind::DelayRequest
            .validate(&request, RoundStage::SendDelayRequest)
            .is_err()
        {
            return Ok(payload.len());
        }
        self.tx_stamp = Some(self.os_stamp());
        self.next_id = request.packet_id.wrapping_add(1);
        let id = self.take_id();
        self.pending = Pending::Response(TimesyncPacket::delay_response(id, self.leader_now()));
        Ok(payload.len())
    }

    fn recv_from(&mut self, buf: &mut [u8]) -> Result<(usize, SocketAddr), SocketError> {
        let packet = match std::mem::replace(&mut self.pending, Pending::Idle) {
            Pending::FollowUp(packet) | Pending::Response(packet) => packet,
            Pending::Idle => return Err(SocketError::WouldBlock),
        };
        self.clock.advance(STEP_MICROS);
        Ok((Self::write(buf, &packet), self.address))
    }

    fn recv_timestamped(&mut self, buf: &mut [u8]) -> Result<Datagram, SocketError> {
        self.clock.advance(STEP_MICROS);
        let id = self.take_id();
        let t0 = self.leader_now();
        let sync = match self.mode {
            SyncMode::OneStage => TimesyncPacket::sync(id, Some(t0)),
            SyncMode::TwoStage => {
                let follow_up = TimesyncPacket::follow_up(self.take_id(), t0);
                self.pending = Pending::FollowUp(follow_up);
                TimesyncPacket::sync(id, None)
            }
        };
        Ok(Datagram {
            len: Self::write(buf, &sync),
            source: self.address,
            timestamp: Some(self.os_stamp()),
        })
    }

    fn tx_timestamp(&mut self) -> Result<PacketTimestamp, SocketError> {
        self.tx_stamp.take().ok_or(SocketError::WouldBlock)
    }
}
