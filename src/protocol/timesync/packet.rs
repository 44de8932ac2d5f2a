//! Timesync packet type, flag bits, parsing, and encoding.
//!
//! The wire layout is a packed 13-byte struct in the host's native byte
//! order: `packet_id: u32`, `flags: u8`, `timestamp: u64` (microseconds).

use byteorder::{ByteOrder, NativeEndian};

use super::round::RoundStage;
use crate::error::RoundError;

/// Flag bitset carried in byte 4 of every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PacketFlags(u8);

impl PacketFlags {
    /// Sent by the leader.
    pub const LEADER: Self = Self(1 << 0);
    /// Broadcast to every follower.
    pub const BROADCAST: Self = Self(1 << 1);
    /// Timestamp-critical: the send/receive instant is captured.
    pub const CRITICAL: Self = Self(1 << 2);
    /// The timestamp field is meaningful.
    pub const HAS_TIME: Self = Self(1 << 3);
    /// Sender hit an error; the round is void.
    pub const ERROR: Self = Self(1 << 7);

    const NAMED: [(Self, &'static str); 5] = [
        (Self::LEADER, "LEADER"),
        (Self::BROADCAST, "BROADCAST"),
        (Self::CRITICAL, "CRITICAL"),
        (Self::HAS_TIME, "HASTIME"),
        (Self::ERROR, "ERROR"),
    ];

    /// No flags set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Wrap raw bits. Unknown bits are preserved.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether any bit of `other` is set.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Whether no bits are set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for PacketFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for PacketFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl std::fmt::Display for PacketFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let mut remaining = self.0;
        let mut first = true;
        for (flag, name) in Self::NAMED {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                remaining &= !flag.0;
                first = false;
            }
        }
        if remaining != 0 {
            if !first {
                write!(f, "|")?;
            }
            write!(f, "0x{remaining:02X}")?;
        }
        Ok(())
    }
}

/// The four message types of a synchronization round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Leader broadcast that starts a round.
    Sync,
    /// Leader follow-up carrying the precise sync send time.
    FollowUp,
    /// Follower request whose send time is captured.
    DelayRequest,
    /// Leader reply carrying the delay request's receive time.
    DelayResponse,
}

impl MessageKind {
    /// Flags that must be set.
    #[must_use]
    pub fn required(self) -> PacketFlags {
        match self {
            Self::Sync => PacketFlags::LEADER | PacketFlags::BROADCAST | PacketFlags::CRITICAL,
            Self::FollowUp => PacketFlags::LEADER | PacketFlags::BROADCAST | PacketFlags::HAS_TIME,
            Self::DelayRequest => PacketFlags::CRITICAL,
            Self::DelayResponse => PacketFlags::LEADER | PacketFlags::HAS_TIME,
        }
    }

    /// Flags that must be clear (`ERROR` is always checked separately).
    #[must_use]
    pub fn forbidden(self) -> PacketFlags {
        match self {
            Self::Sync => PacketFlags::empty(),
            Self::FollowUp => PacketFlags::CRITICAL,
            Self::DelayRequest => PacketFlags::LEADER | PacketFlags::BROADCAST | PacketFlags::HAS_TIME,
            Self::DelayResponse => PacketFlags::BROADCAST | PacketFlags::CRITICAL,
        }
    }

    /// Check a packet's flags against this kind's rules.
    ///
    /// # Errors
    /// Returns `RoundError::LeaderError` if the `ERROR` bit is set, or
    /// `RoundError::UnexpectedFlags` if a required flag is missing or a
    /// forbidden one is present.
    pub fn validate(self, packet: &TimesyncPacket, stage: RoundStage) -> Result<(), RoundError> {
        if packet.flags.contains(PacketFlags::ERROR) {
            return Err(RoundError::LeaderError {
                stage,
                packet_id: packet.packet_id,
            });
        }
        let required = self.required();
        let forbidden = self.forbidden();
        if !packet.flags.contains(required) || packet.flags.intersects(forbidden) {
            return Err(RoundError::UnexpectedFlags {
                stage,
                expected: required,
                forbidden,
                actual: packet.flags,
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sync => write!(f, "Sync"),
            Self::FollowUp => write!(f, "Followup"),
            Self::DelayRequest => write!(f, "Delay_Req"),
            Self::DelayResponse => write!(f, "Delay_Resp"),
        }
    }
}

/// A single timesync message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimesyncPacket {
    /// Session-wide sequence number, shared by all message types.
    pub packet_id: u32,
    /// Flag bits.
    pub flags: PacketFlags,
    /// Microseconds; meaningful only when `HAS_TIME` is set.
    pub timestamp: u64,
}

impl TimesyncPacket {
    /// Wire size in bytes.
    pub const SIZE: usize = 13;

    /// Create a packet.
    #[must_use]
    pub fn new(packet_id: u32, flags: PacketFlags, timestamp: u64) -> Self {
        Self {
            packet_id,
            flags,
            timestamp,
        }
    }

    /// Create a sync packet. A timestamp makes it one-stage (no followup).
    #[must_use]
    pub fn sync(packet_id: u32, timestamp: Option<u64>) -> Self {
        let mut flags = MessageKind::Sync.required();
        if timestamp.is_some() {
            flags |= PacketFlags::HAS_TIME;
        }
        Self::new(packet_id, flags, timestamp.unwrap_or(0))
    }

    /// Create a followup packet carrying the sync send time.
    #[must_use]
    pub fn follow_up(packet_id: u32, timestamp: u64) -> Self {
        Self::new(packet_id, MessageKind::FollowUp.required(), timestamp)
    }

    /// Create a delay request packet.
    #[must_use]
    pub fn delay_request(packet_id: u32) -> Self {
        Self::new(packet_id, MessageKind::DelayRequest.required(), 0)
    }

    /// Create a delay response packet carrying the request's receive time.
    #[must_use]
    pub fn delay_response(packet_id: u32, timestamp: u64) -> Self {
        Self::new(packet_id, MessageKind::DelayResponse.required(), timestamp)
    }

    /// Whether the timestamp field is meaningful.
    #[must_use]
    pub fn has_time(&self) -> bool {
        self.flags.contains(PacketFlags::HAS_TIME)
    }

    /// Encode to 13 bytes.
    #[must_use]
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        NativeEndian::write_u32(&mut buf[0..4], self.packet_id);
        buf[4] = self.flags.bits();
        NativeEndian::write_u64(&mut buf[5..13], self.timestamp);
        buf
    }

    /// Decode from bytes. Trailing bytes beyond the 13-byte packet are ignored.
    ///
    /// # Errors
    /// Returns `PacketDecodeError::TooShort` if fewer than 13 bytes are given.
    pub fn decode(data: &[u8]) -> Result<Self, PacketDecodeError> {
        if data.len() < Self::SIZE {
            return Err(PacketDecodeError::TooShort {
                needed: Self::SIZE,
                have: data.len(),
            });
        }
        Ok(Self {
            packet_id: NativeEndian::read_u32(&data[0..4]),
            flags: PacketFlags::from_bits(data[4]),
            timestamp: NativeEndian::read_u64(&data[5..13]),
        })
    }
}

impl std::fmt::Display for TimesyncPacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "id={} flags={}", self.packet_id, self.flags)?;
        if self.has_time() {
            write!(f, " ts={}us", self.timestamp)?;
        }
        Ok(())
    }
}

/// Errors from timesync packet parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketDecodeError {
    /// Packet too short.
    #[error("packet too short: need {needed} bytes, have {have}")]
    TooShort {
        /// Minimum bytes needed.
        needed: usize,
        /// Bytes actually available.
        have: usize,
    },
}
