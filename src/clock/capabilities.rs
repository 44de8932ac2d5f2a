//! Interface timestamping capability discovery.

use crate::error::TimeSyncError;

/// Which clock the OS stamps packets with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimestampMode {
    /// Network interface hardware clock (PHC).
    Hardware,
    /// Kernel software stamps in system realtime.
    Software,
}

impl std::fmt::Display for TimestampMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hardware => write!(f, "hardware"),
            Self::Software => write!(f, "software"),
        }
    }
}

/// Timestamping support advertised by a network interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockCapabilities {
    /// Interface name.
    pub interface: String,
    /// Hardware transmit timestamps.
    pub tx_hardware: bool,
    /// Hardware receive timestamps.
    pub rx_hardware: bool,
    /// Software transmit timestamps.
    pub tx_software: bool,
    /// Software receive timestamps.
    pub rx_software: bool,
    /// Index of the interface's PHC (`/dev/ptpN`), if any.
    pub phc_index: Option<u32>,
}

// SOF_TIMESTAMPING_* capability bits
const TX_HARDWARE: u32 = 1 << 0;
const TX_SOFTWARE: u32 = 1 << 1;
const RX_HARDWARE: u32 = 1 << 2;
const RX_SOFTWARE: u32 = 1 << 3;
const RAW_HARDWARE: u32 = 1 << 6;

impl ClockCapabilities {
    /// Decode the `so_timestamping` mask and PHC index reported by ethtool.
    ///
    /// Hardware stamps are only usable when the raw hardware clock is reported.
    #[must_use]
    pub fn from_so_timestamping(interface: impl Into<String>, mask: u32, phc_index: i32) -> Self {
        let raw = mask & RAW_HARDWARE != 0;
        Self {
            interface: interface.into(),
            tx_hardware: raw && mask & TX_HARDWARE != 0,
            rx_hardware: raw && mask & RX_HARDWARE != 0,
            tx_software: mask & TX_SOFTWARE != 0,
            rx_software: mask & RX_SOFTWARE != 0,
            phc_index: u32::try_from(phc_index).ok(),
        }
    }

    /// Capabilities of an interface with only kernel software stamps.
    #[must_use]
    pub fn software_only(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            tx_hardware: false,
            rx_hardware: false,
            tx_software: true,
            rx_software: true,
            phc_index: None,
        }
    }

    /// Whether full hardware timestamping (both directions, with a PHC) is available.
    #[must_use]
    pub fn hardware_timestamping(&self) -> bool {
        self.tx_hardware && self.rx_hardware && self.phc_index.is_some()
    }

    /// Pick the timestamping mode to run in.
    #[must_use]
    pub fn preferred_mode(&self, prefer_hardware: bool) -> TimestampMode {
        if prefer_hardware && self.hardware_timestamping() {
            TimestampMode::Hardware
        } else {
            TimestampMode::Software
        }
    }

    /// Query an interface through `SIOCETHTOOL`.
    ///
    /// # Errors
    /// Returns `TimeSyncError::InterfaceQuery` if the interface does not exist
    /// or the query fails.
    #[cfg(target_os = "linux")]
    pub fn query(interface: &str) -> Result<Self, TimeSyncError> {
        use std::os::fd::AsRawFd;

        let to_error = |source: std::io::Error| TimeSyncError::InterfaceQuery {
            interface: interface.to_string(),
            source,
        };
        let probe = std::net::UdpSocket::bind("0.0.0.0:0").map_err(to_error)?;
        let info = crate::net::sys::ethtool_ts_info(probe.as_raw_fd(), interface).map_err(to_error)?;
        let caps = Self::from_so_timestamping(interface, info.so_timestamping, info.phc_index);

        tracing::info!(
            interface,
            tx_hardware = caps.tx_hardware,
            rx_hardware = caps.rx_hardware,
            tx_software = caps.tx_software,
            rx_software = caps.rx_software,
            phc = ?caps.phc_index,
            "Queried timestamping capabilities"
        );
        Ok(caps)
    }

    /// Query an interface. Only Linux exposes packet timestamping.
    ///
    /// # Errors
    /// Always returns `TimeSyncError::Unsupported`.
    #[cfg(not(target_os = "linux"))]
    pub fn query(_interface: &str) -> Result<Self, TimeSyncError> {
        Err(TimeSyncError::Unsupported {
            feature: "SO_TIMESTAMPING".to_string(),
        })
    }
}
