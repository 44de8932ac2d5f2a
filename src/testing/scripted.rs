//! Transport that replays a queued script of datagrams and timeouts.

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::error::SocketError;
use crate::net::{Datagram, PacketTimestamp, PacketTransport, TimestampSource};
use crate::protocol::timesync::{SyncMode, TimesyncPacket};

/// Pause before reporting an empty script as a timeout.
const IDLE_WAIT: Duration = Duration::from_millis(1);

enum Inbound {
    Datagram {
        bytes: Vec<u8>,
        source: SocketAddr,
        timestamp: Option<PacketTimestamp>,
    },
    Timeout,
    Error(io::ErrorKind),
}

#[derive(Default)]
struct Script {
    inbound: VecDeque<Inbound>,
    tx_stamps: VecDeque<Option<PacketTimestamp>>,
    sent: Vec<(Vec<u8>, SocketAddr)>,
}

/// One leader round to replay, timestamps in microseconds.
#[derive(Debug, Clone, Copy)]
pub struct ScriptedRound {
    /// Id of the sync packet.
    pub sync_id: u32,
    /// Leader send time of sync.
    pub t0: u64,
    /// OS receive stamp of sync.
    pub t1: i64,
    /// OS transmit stamp of the delay request.
    pub t2: i64,
    /// Leader receive time of the delay request.
    pub t3: u64,
    /// Whether t0 travels in the sync or a followup.
    pub mode: SyncMode,
}

impl ScriptedRound {
    /// Id the follower will give its delay request.
    #[must_use]
    pub fn request_id(&self) -> u32 {
        match self.mode {
            SyncMode::OneStage => self.sync_id.wrapping_add(1),
            SyncMode::TwoStage => self.sync_id.wrapping_add(2),
        }
    }
}

/// A [`PacketTransport`] fed from a script.
///
/// Clones share the same script, so a test can keep a handle while the
/// engine owns another. `recv_from` and `recv_timestamped` pop from one
/// queue; an empty queue behaves like a timeout.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    /// Create an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a packet with an optional OS receive stamp (software, µs).
    pub fn push_packet(&self, packet: TimesyncPacket, source: SocketAddr, stamp: Option<i64>) {
        self.push_raw(packet.encode().to_vec(), source, stamp);
    }

    /// Queue arbitrary bytes.
    pub fn push_raw(&self, bytes: Vec<u8>, source: SocketAddr, stamp: Option<i64>) {
        let timestamp = stamp.map(|us| PacketTimestamp::from_micros(us, TimestampSource::Software));
        self.lock().inbound.push_back(Inbound::Datagram {
            bytes,
            source,
            timestamp,
        });
    }

    /// Queue a receive timeout.
    pub fn push_timeout(&self) {
        self.lock().inbound.push_back(Inbound::Timeout);
    }

    /// Queue a hard receive error.
    pub fn push_error(&self, kind: io::ErrorKind) {
        self.lock().inbound.push_back(Inbound::Error(kind));
    }

    /// Queue the transmit stamp for the next send; `None` times out.
    pub fn push_tx_stamp(&self, stamp: Option<i64>) {
        self.lock()
            .tx_stamps
            .push_back(stamp.map(|us| PacketTimestamp::from_micros(us, TimestampSource::Software)));
    }

    /// Queue every packet and stamp of a complete round.
    pub fn push_round(&self, leader: SocketAddr, round: ScriptedRound) {
        match round.mode {
            SyncMode::OneStage => {
                self.push_packet(
                    TimesyncPacket::sync(round.sync_id, Some(round.t0)),
                    leader,
                    Some(round.t1),
                );
            }
            SyncMode::TwoStage => {
                self.push_packet(TimesyncPacket::sync(round.sync_id, None), leader, Some(round.t1));
                self.push_packet(
                    TimesyncPacket::follow_up(round.sync_id.wrapping_add(1), round.t0),
                    leader,
                    None,
                );
            }
        }
        self.push_tx_stamp(Some(round.t2));
        self.push_packet(
            TimesyncPacket::delay_response(round.request_id().wrapping_add(1), round.t3),
            leader,
            None,
        );
    }

    /// Inbound entries not yet consumed.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.lock().inbound.len()
    }

    /// Every datagram sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<(Vec<u8>, SocketAddr)> {
        self.lock().sent.clone()
    }

    /// Sent datagrams decoded as timesync packets.
    #[must_use]
    pub fn sent_packets(&self) -> Vec<TimesyncPacket> {
        self.lock()
            .sent
            .iter()
            .filter_map(|(bytes, _)| TimesyncPacket::decode(bytes).ok())
            .collect()
    }

    fn next_inbound(&self) -> Option<Inbound> {
        let next = self.lock().inbound.pop_front();
        if next.is_none() {
            std::thread::sleep(IDLE_WAIT);
        }
        next
    }
}

impl PacketTransport for ScriptedTransport {
    fn send_to(&mut self, payload: &[u8], target: SocketAddr) -> Result<usize, SocketError> {
        self.lock().sent.push((payload.to_vec(), target));
        Ok(payload.len())
    }

    fn recv_from(&mut self, buf: &mut [u8]) -> Result<(usize, SocketAddr), SocketError> {
        let datagram = self.recv_timestamped(buf)?;
        Ok((datagram.len, datagram.source))
    }

    fn recv_timestamped(&mut self, buf: &mut [u8]) -> Result<Datagram, SocketError> {
        match self.next_inbound() {
            Some(Inbound::Datagram {
                bytes,
                source,
                timestamp,
            }) => {
                let len = bytes.len().min(buf.len());
                buf[..len].copy_from_slice(&bytes[..len]);
                Ok(Datagram {
                    len,
                    source,
                    timestamp,
                })
            }
            Some(Inbound::Error(kind)) => Err(SocketError::from(io::Error::from(kind))),
            Some(Inbound::Timeout) | None => Err(SocketError::WouldBlock),
        }
    }

    fn tx_timestamp(&mut self) -> Result<PacketTimestamp, SocketError> {
        self.lock()
            .tx_stamps
            .pop_front()
            .flatten()
            .ok_or(SocketError::WouldBlock)
    }
}

impl std::fmt::Debug for ScriptedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let script = self.lock();
        f.debug_struct("ScriptedTransport")
            .field("pending", &script.inbound.len())
            .field("sent", &script.sent.len())
            .finish()
    }
}
