//! Network condition simulation for testing

use rand::Rng;
use std::time::Duration;

/// Network condition simulator
#[derive(Clone, Debug)]
pub struct NetworkSimulator {
    /// Packet loss probability (0.0 to 1.0)
    pub loss_rate: f64,
    /// Jitter range (max delay added)
    pub jitter_ms: u32,
    /// Base delay added to all packets
    pub delay_ms: u32,
}

impl NetworkSimulator {
    /// Perfect network (no issues)
    #[must_use]
    pub fn perfect() -> Self {
        Self {
            loss_rate: 0.0,
            jitter_ms: 0,
            delay_ms: 0,
        }
    }

    /// Switched wired LAN on the robot
    #[must_use]
    pub fn wired_lan() -> Self {
        Self {
            loss_rate: 0.0005,
            jitter_ms: 1,
            delay_ms: 0,
        }
    }

    /// Congested link
    #[must_use]
    pub fn congested() -> Self {
        Self {
            loss_rate: 0.02,
            jitter_ms: 10,
            delay_ms: 2,
        }
    }

    /// Drop the given fraction of packets, no added delay
    #[must_use]
    pub fn lossy(loss_rate: f64) -> Self {
        Self {
            loss_rate: loss_rate.clamp(0.0, 1.0),
            ..Self::perfect()
        }
    }

    /// Should this packet be dropped?
    #[must_use]
    pub fn should_drop(&self) -> bool {
        if self.loss_rate <= 0.0 {
            return false;
        }
        rand::thread_rng().gen_bool(self.loss_rate.min(1.0))
    }

    /// Get delay for this packet
    #[must_use]
    pub fn get_delay(&self) -> Duration {
        let jitter: u32 = if self.jitter_ms > 0 {
            rand::thread_rng().gen_range(0..self.jitter_ms)
        } else {
            0
        };

        Duration::from_millis(u64::from(self.delay_ms + jitter))
    }
}

impl Default for NetworkSimulator {
    fn default() -> Self {
        Self::perfect()
    }
}
