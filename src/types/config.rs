use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::estimator::DEFAULT_SAMPLES;
use crate::error::TimeSyncError;

/// Well-known UDP port for both broadcast and unicast timesync traffic
pub const DEFAULT_PORT: u16 = 5810;

/// Configuration for the time synchronization follower
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSyncConfig {
    /// Network interface queried for timestamping support (default: "eth0")
    pub interface: String,

    /// Local bind address (default: `0.0.0.0:5810`)
    pub bind_addr: SocketAddr,

    /// Known leader endpoint; `None` follows whoever sends the sync
    pub leader_addr: Option<SocketAddr>,

    /// Socket send/receive timeout (default: 50ms)
    #[serde(with = "millis", rename = "io_timeout_ms")]
    pub io_timeout: Duration,

    /// Samples per estimate for the averaging strategy (default: 5)
    pub software_samples: usize,

    /// Use hardware timestamps when the interface advertises them
    pub prefer_hardware: bool,

    /// Pause after a failed round that was not a plain timeout (default: 10ms)
    #[serde(with = "millis", rename = "retry_backoff_ms")]
    pub retry_backoff: Duration,
}

impl Default for TimeSyncConfig {
    fn default() -> Self {
        Self {
            interface: "eth0".to_string(),
            bind_addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            leader_addr: None,
            io_timeout: Duration::from_millis(50),
            software_samples: DEFAULT_SAMPLES,
            prefer_hardware: true,
            retry_backoff: Duration::from_millis(10),
        }
    }
}

impl TimeSyncConfig {
    /// Create a new config builder
    #[must_use]
    pub fn builder() -> TimeSyncConfigBuilder {
        TimeSyncConfigBuilder::default()
    }

    /// Parse a JSON document. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `TimeSyncError::Config` if the JSON is malformed or fails validation.
    pub fn from_json(json: &str) -> Result<Self, TimeSyncError> {
        let config: Self = serde_json::from_str(json).map_err(|e| TimeSyncError::Config {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns `TimeSyncError::Config` if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TimeSyncError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| TimeSyncError::Config {
            message: format!("{}: {e}", path.display()),
        })?;
        Self::from_json(&json)
    }

    /// Serialize to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns `TimeSyncError::Config` if serialization fails.
    pub fn to_json(&self) -> Result<String, TimeSyncError> {
        serde_json::to_string_pretty(self).map_err(|e| TimeSyncError::Config {
            message: e.to_string(),
        })
    }

    /// Check the values are usable.
    ///
    /// # Errors
    ///
    /// Returns `TimeSyncError::Config` for an empty interface name, a zero
    /// timeout, or a zero sample count.
    pub fn validate(&self) -> Result<(), TimeSyncError> {
        let fail = |message: &str| {
            Err(TimeSyncError::Config {
                message: message.to_string(),
            })
        };
        if self.interface.is_empty() {
            return fail("interface must not be empty");
        }
        if self.io_timeout.is_zero() {
            return fail("io_timeout must be greater than zero");
        }
        if self.software_samples == 0 {
            return fail("software_samples must be at least 1");
        }
        Ok(())
    }
}

/// Builder for `TimeSyncConfig`
#[derive(Debug, Clone, Default)]
pub struct TimeSyncConfigBuilder {
    config: TimeSyncConfig,
}

impl TimeSyncConfigBuilder {
    /// Set the interface to query
    #[must_use]
    pub fn interface(mut self, interface: impl Into<String>) -> Self {
        self.config.interface = interface.into();
        self
    }

    /// Set the local bind address
    #[must_use]
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    /// Pin the leader endpoint
    #[must_use]
    pub fn leader_addr(mut self, addr: SocketAddr) -> Self {
        self.config.leader_addr = Some(addr);
        self
    }

    /// Set the socket send/receive timeout
    #[must_use]
    pub fn io_timeout(mut self, timeout: Duration) -> Self {
        self.config.io_timeout = timeout;
        self
    }

    /// Set the averaging sample count
    #[must_use]
    pub fn software_samples(mut self, samples: usize) -> Self {
        self.config.software_samples = samples;
        self
    }

    /// Request hardware timestamps when available
    #[must_use]
    pub fn prefer_hardware(mut self, enable: bool) -> Self {
        self.config.prefer_hardware = enable;
        self
    }

    /// Set the pause after a failed round
    #[must_use]
    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.config.retry_backoff = backoff;
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> TimeSyncConfig {
        self.config
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::cast_possible_truncation)]
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
