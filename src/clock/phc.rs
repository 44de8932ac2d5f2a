//! PTP hardware clock (PHC) access.
//!
//! A PHC is exposed by Linux as `/dev/ptpN`. It can be read like any POSIX
//! clock through a dynamic clock id, and drivers that support it can sample
//! the hardware and system clocks simultaneously (`PTP_SYS_OFFSET_PRECISE`).

use std::io;

/// One simultaneous (hardware, system realtime) sample, in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossTimestamp {
    /// Hardware clock reading.
    pub hardware: i64,
    /// System realtime reading taken at the same instant.
    pub system: i64,
}

/// A hardware clock read bracketed by two system realtime reads, in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BracketedSample {
    /// System realtime before the hardware read.
    pub system_before: i64,
    /// Hardware clock reading.
    pub hardware: i64,
    /// System realtime after the hardware read.
    pub system_after: i64,
}

impl BracketedSample {
    /// System-minus-hardware offset, assuming the hardware read happened at
    /// the midpoint of the bracket.
    #[must_use]
    pub fn offset_micros(&self) -> i64 {
        self.system_before - self.hardware + (self.system_after - self.system_before) / 2
    }
}

/// A network interface hardware clock.
pub trait HardwareClock: Send {
    /// Whether [`cross_timestamp`](Self::cross_timestamp) is expected to work.
    fn supports_cross_timestamp(&self) -> bool;

    /// Sample hardware and system time simultaneously.
    ///
    /// # Errors
    /// Returns an error if the device rejects the request.
    fn cross_timestamp(&self) -> io::Result<CrossTimestamp>;

    /// Read the hardware clock between two system clock reads.
    ///
    /// # Errors
    /// Returns an error if any of the three reads fails.
    fn bracketed_sample(&self) -> io::Result<BracketedSample>;
}

#[cfg(target_os = "linux")]
pub use linux::PhcClock;

#[cfg(target_os = "linux")]
#[allow(unsafe_code)]
mod linux {
    use std::fs::{File, OpenOptions};
    use std::io;
    use std::os::fd::AsRawFd;
    use std::path::{Path, PathBuf};

    use super::{BracketedSample, CrossTimestamp, HardwareClock};
    use crate::clock::source::clock_micros;
    use crate::error::TimeSyncError;

    // <linux/ptp_clock.h>
    #[repr(C)]
    #[derive(Debug, Clone, Copy, Default)]
    struct PtpClockTime {
        sec: i64,
        nsec: u32,
        reserved: u32,
    }

    impl PtpClockTime {
        fn micros(self) -> i64 {
            self.sec * 1_000_000 + i64::from(self.nsec / 1_000)
        }
    }

    #[repr(C)]
    #[derive(Debug, Default)]
    struct PtpSysOffsetPrecise {
        device: PtpClockTime,
        sys_realtime: PtpClockTime,
        sys_monoraw: PtpClockTime,
        rsv: [u32; 4],
    }

    const fn iowr(kind: u8, nr: u8, size: usize) -> u32 {
        (3 << 30) | ((size as u32) << 16) | ((kind as u32) << 8) | nr as u32
    }

    const PTP_SYS_OFFSET_PRECISE: u32 =
        iowr(b'=', 8, std::mem::size_of::<PtpSysOffsetPrecise>());

    const CLOCKFD: libc::clockid_t = 3;

    /// Handle to a `/dev/ptpN` hardware clock.
    #[derive(Debug)]
    pub struct PhcClock {
        file: File,
        clock_id: libc::clockid_t,
        path: PathBuf,
        precise: bool,
    }

    impl PhcClock {
        /// Open `/dev/ptp{index}`.
        ///
        /// # Errors
        /// Returns `TimeSyncError::HardwareClock` if the device cannot be opened.
        pub fn open(index: u32) -> Result<Self, TimeSyncError> {
            Self::open_path(format!("/dev/ptp{index}"))
        }

        /// Open a PHC device by path and probe for precise cross-timestamping.
        ///
        /// # Errors
        /// Returns `TimeSyncError::HardwareClock` if the device cannot be opened
        /// or read.
        pub fn open_path(path: impl AsRef<Path>) -> Result<Self, TimeSyncError> {
            let path = path.as_ref().to_path_buf();
            let to_error = |source: io::Error| TimeSyncError::HardwareClock {
                path: path.display().to_string(),
                source,
            };

            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(&path)
                .map_err(to_error)?;
            // FD_TO_CLOCKID
            let clock_id = ((!file.as_raw_fd()) << 3) | CLOCKFD;
            let mut clock = Self {
                file,
                clock_id,
                path: path.clone(),
                precise: false,
            };

            clock.now_micros().map_err(to_error)?;
            clock.precise = clock.read_precise().is_ok();
            tracing::info!(
                path = %clock.path.display(),
                precise = clock.precise,
                "Opened hardware clock"
            );
            Ok(clock)
        }

        /// Device path.
        #[must_use]
        pub fn path(&self) -> &Path {
            &self.path
        }

        /// Current hardware clock time in microseconds.
        ///
        /// # Errors
        /// Returns the OS error if the clock cannot be read.
        pub fn now_micros(&self) -> io::Result<i64> {
            clock_micros(self.clock_id)
        }

        fn read_precise(&self) -> io::Result<CrossTimestamp> {
            let mut req = PtpSysOffsetPrecise::default();
            // SAFETY: req is a live ptp_sys_offset_precise matching the request size
            let ret = unsafe {
                libc::ioctl(
                    self.file.as_raw_fd(),
                    PTP_SYS_OFFSET_PRECISE as _,
                    std::ptr::addr_of_mut!(req),
                )
            };
            if ret < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(CrossTimestamp {
                hardware: req.device.micros(),
                system: req.sys_realtime.micros(),
            })
        }
    }

    impl HardwareClock for PhcClock {
        fn supports_cross_timestamp(&self) -> bool {
            self.precise
        }

        fn cross_timestamp(&self) -> io::Result<CrossTimestamp> {
            self.read_precise()
        }

        fn bracketed_sample(&self) -> io::Result<BracketedSample> {
            let system_before = clock_micros(libc::CLOCK_REALTIME)?;
            let hardware = self.now_micros()?;
            let system_after = clock_micros(libc::CLOCK_REALTIME)?;
            Ok(BracketedSample {
                system_before,
                hardware,
                system_after,
            })
        }
    }

}
