// Raw Linux socket plumbing for packet timestamping.
//
// Wraps setsockopt(SO_TIMESTAMPING), recvmsg() control-message parsing,
// error-queue polling, and the SIOCETHTOOL capability query.
#![allow(unsafe_code)]

use std::io;
use std::mem;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::os::fd::RawFd;
use std::ptr;
use std::time::Duration;

// Linux SO_TIMESTAMPING flags (from <linux/net_tstamp.h>)
pub(crate) const SOF_TIMESTAMPING_TX_HARDWARE: u32 = 1 << 0;
pub(crate) const SOF_TIMESTAMPING_TX_SOFTWARE: u32 = 1 << 1;
pub(crate) const SOF_TIMESTAMPING_RX_HARDWARE: u32 = 1 << 2;
pub(crate) const SOF_TIMESTAMPING_RX_SOFTWARE: u32 = 1 << 3;
pub(crate) const SOF_TIMESTAMPING_SOFTWARE: u32 = 1 << 4;
pub(crate) const SOF_TIMESTAMPING_RAW_HARDWARE: u32 = 1 << 6;
pub(crate) const SOF_TIMESTAMPING_OPT_TSONLY: u32 = 1 << 11;

// <linux/sockios.h>, <linux/ethtool.h>
const SIOCETHTOOL: u32 = 0x8946;
const ETHTOOL_GET_TS_INFO: u32 = 0x41;

/// Timestamps attached to one packet: software stamp and raw hardware stamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RawTimestamps {
    pub software: Option<(i64, u32)>,
    pub hardware: Option<(i64, u32)>,
}

/// Result of a single recvmsg call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RecvInfo {
    pub len: usize,
    pub source: Option<SocketAddr>,
    pub timestamps: Option<RawTimestamps>,
}

/// Capability record from `ETHTOOL_GET_TS_INFO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EthtoolTsInfo {
    pub so_timestamping: u32,
    pub phc_index: i32,
}

#[repr(C)]
#[derive(Default)]
struct EthtoolTsInfoRaw {
    cmd: u32,
    so_timestamping: u32,
    phc_index: i32,
    tx_types: u32,
    tx_reserved: [u32; 3],
    rx_filters: u32,
    rx_reserved: [u32; 3],
}

// struct ifreq with the ifr_data member of the union, padded past the
// largest union member.
#[repr(C)]
struct IfReqData {
    ifr_name: [libc::c_char; libc::IFNAMSIZ],
    ifr_data: *mut libc::c_void,
    _pad: [u8; 16],
}

/// Enable `SO_TIMESTAMPING` with the given flags.
pub(crate) fn set_timestamping(fd: RawFd, flags: u32) -> io::Result<()> {
    let ret = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_TIMESTAMPING,
            ptr::from_ref(&flags).cast::<libc::c_void>(),
            mem::size_of::<u32>() as libc::socklen_t,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Receive one message, collecting the sender and any timestamp control message.
pub(crate) fn recv_msg(fd: RawFd, buf: &mut [u8], flags: libc::c_int) -> io::Result<RecvInfo> {
    let mut iov = libc::iovec {
        iov_base: buf.as_mut_ptr().cast::<libc::c_void>(),
        iov_len: buf.len(),
    };
    // u64 elements keep the control buffer aligned for cmsghdr
    let mut control = [0u64; 32];
    // SAFETY: all-zero is a valid sockaddr_storage and msghdr
    let mut name: libc::sockaddr_storage = unsafe { mem::zeroed() };
    let mut hdr: libc::msghdr = unsafe { mem::zeroed() };
    hdr.msg_name = ptr::addr_of_mut!(name).cast::<libc::c_void>();
    hdr.msg_namelen = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
    hdr.msg_iov = ptr::addr_of_mut!(iov);
    hdr.msg_iovlen = 1;
    hdr.msg_control = control.as_mut_ptr().cast::<libc::c_void>();
    hdr.msg_controllen = mem::size_of_val(&control) as _;

    let n = loop {
        let n = unsafe { libc::recvmsg(fd, &mut hdr, flags) };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        break n;
    };

    let mut timestamps = None;
    // SAFETY: hdr was filled by a successful recvmsg and control outlives the walk
    let mut cmsg = unsafe { libc::CMSG_FIRSTHDR(&hdr) };
    while !cmsg.is_null() {
        let (level, kind) = unsafe { ((*cmsg).cmsg_level, (*cmsg).cmsg_type) };
        if level == libc::SOL_SOCKET && kind == libc::SO_TIMESTAMPING {
            // SCM_TIMESTAMPING carries three timespecs: software, legacy, raw hardware
            let stamps: [libc::timespec; 3] =
                unsafe { ptr::read_unaligned(libc::CMSG_DATA(cmsg).cast::<[libc::timespec; 3]>()) };
            timestamps = Some(RawTimestamps {
                software: non_zero(&stamps[0]),
                hardware: non_zero(&stamps[2]),
            });
        }
        cmsg = unsafe { libc::CMSG_NXTHDR(&hdr, cmsg) };
    }

    Ok(RecvInfo {
        len: usize::try_from(n).unwrap_or(0),
        source: sockaddr_to_std(&name, hdr.msg_namelen),
        timestamps,
    })
}

/// Wait until the socket's error queue has an entry.
///
/// Returns `false` on timeout.
pub(crate) fn poll_error_queue(fd: RawFd, timeout: Duration) -> io::Result<bool> {
    // POLLERR is always reported, no events need requesting
    let mut pfd = libc::pollfd {
        fd,
        events: 0,
        revents: 0,
    };
    let millis = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);
    loop {
        let ret = unsafe { libc::poll(&mut pfd, 1, millis) };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        return Ok(ret > 0 && pfd.revents & libc::POLLERR != 0);
    }
}

/// Discard every pending error-queue entry.
pub(crate) fn drain_error_queue(fd: RawFd) -> io::Result<()> {
    let mut scratch = [0u8; 64];
    loop {
        match recv_msg(fd, &mut scratch, libc::MSG_ERRQUEUE | libc::MSG_DONTWAIT) {
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(()),
            Err(err) => return Err(err),
        }
    }
}

/// Query an interface's timestamping capabilities via `SIOCETHTOOL`.
pub(crate) fn ethtool_ts_info(fd: RawFd, interface: &str) -> io::Result<EthtoolTsInfo> {
    let name = interface.as_bytes();
    if name.is_empty() || name.len() >= libc::IFNAMSIZ || name.contains(&0) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid interface name {interface:?}"),
        ));
    }

    let mut info = EthtoolTsInfoRaw {
        cmd: ETHTOOL_GET_TS_INFO,
        ..EthtoolTsInfoRaw::default()
    };
    let mut req = IfReqData {
        ifr_name: [0; libc::IFNAMSIZ],
        ifr_data: ptr::addr_of_mut!(info).cast::<libc::c_void>(),
        _pad: [0; 16],
    };
    for (dst, src) in req.ifr_name.iter_mut().zip(name) {
        *dst = *src as libc::c_char;
    }

    // SAFETY: req points at a live ethtool_ts_info for the duration of the call
    let ret = unsafe { libc::ioctl(fd, SIOCETHTOOL as _, ptr::addr_of_mut!(req)) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(EthtoolTsInfo {
        so_timestamping: info.so_timestamping,
        phc_index: info.phc_index,
    })
}

#[allow(
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation,
    clippy::useless_conversion,
    reason = "tv_nsec is always within 0..1_000_000_000"
)]
fn non_zero(ts: &libc::timespec) -> Option<(i64, u32)> {
    if ts.tv_sec == 0 && ts.tv_nsec == 0 {
        None
    } else {
        Some((i64::from(ts.tv_sec), ts.tv_nsec as u32))
    }
}

fn sockaddr_to_std(storage: &libc::sockaddr_storage, len: libc::socklen_t) -> Option<SocketAddr> {
    let len = len as usize;
    match libc::c_int::from(storage.ss_family) {
        libc::AF_INET if len >= mem::size_of::<libc::sockaddr_in>() => {
            // SAFETY: family and length say this is a sockaddr_in
            let addr = unsafe {
                ptr::read_unaligned(ptr::from_ref(storage).cast::<libc::sockaddr_in>())
            };
            Some(SocketAddr::V4(SocketAddrV4::new(
                Ipv4Addr::from(u32::from_be(addr.sin_addr.s_addr)),
                u16::from_be(addr.sin_port),
            )))
        }
        libc::AF_INET6 if len >= mem::size_of::<libc::sockaddr_in6>() => {
            // SAFETY: family and length say this is a sockaddr_in6
            let addr = unsafe {
                ptr::read_unaligned(ptr::from_ref(storage).cast::<libc::sockaddr_in6>())
            };
            Some(SocketAddr::V6(SocketAddrV6::new(
                Ipv6Addr::from(addr.sin6_addr.s6_addr),
                u16::from_be(addr.sin6_port),
                addr.sin6_flowinfo,
                addr.sin6_scope_id,
            )))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_zero_timespec() {
        let zero = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        assert_eq!(non_zero(&zero), None);

        let ts = libc::timespec {
            tv_sec: 12,
            tv_nsec: 345,
        };
        assert_eq!(non_zero(&ts), Some((12, 345)));
    }

    #[test]
    fn test_ethtool_rejects_bad_interface_names() {
        let sock = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let fd = std::os::fd::AsRawFd::as_raw_fd(&sock);
        let err = ethtool_ts_info(fd, "").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        let err = ethtool_ts_info(fd, "an-interface-name-that-is-too-long").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_poll_empty_error_queue_times_out() {
        let sock = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let fd = std::os::fd::AsRawFd::as_raw_fd(&sock);
        assert!(!poll_error_queue(fd, Duration::from_millis(5)).unwrap());
        drain_error_queue(fd).unwrap();
    }
}
