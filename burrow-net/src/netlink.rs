//! rtnetlink backend
//!
//! Speaks the route netlink protocol over a raw `AF_NETLINK` socket. Only the
//! handful of requests a veth setup needs are implemented: create a veth
//! pair, set a link up, add an address, and move a link to another network
//! namespace.
//!
//! The socket is bound to the network namespace of the thread that created
//! it. Create a new [`NetlinkBackend`] after every `setns`.

#![allow(unsafe_code)]

use burrow_core::{Error, Result};
use ipnetwork::IpNetwork;
use std::ffi::CString;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd};
use tracing::{debug, trace};

use crate::backend::LinkBackend;

// Message types
const NLMSG_ERROR: u16 = 2;
const NLMSG_DONE: u16 = 3;
const RTM_NEWLINK: u16 = 16;
const RTM_NEWADDR: u16 = 20;

// Message flags
const NLM_F_REQUEST: u16 = 0x0001;
const NLM_F_ACK: u16 = 0x0004;
const NLM_F_EXCL: u16 = 0x0200;
const NLM_F_CREATE: u16 = 0x0400;

// Link attributes
const IFLA_IFNAME: u16 = 3;
const IFLA_LINKINFO: u16 = 18;
const IFLA_NET_NS_FD: u16 = 28;
const IFLA_INFO_KIND: u16 = 1;
const IFLA_INFO_DATA: u16 = 2;
const VETH_INFO_PEER: u16 = 1;

// Address attributes
const IFA_ADDRESS: u16 = 1;
const IFA_LOCAL: u16 = 2;

const NLA_F_NESTED: u16 = 1 << 15;
const IFF_UP: u32 = 0x1;

const NLMSG_HDRLEN: usize = 16;
const NLA_HDRLEN: usize = 4;

const fn align4(len: usize) -> usize {
    (len + 3) & !3
}

/// `struct ifinfomsg`
#[derive(Debug, Clone, Copy, Default)]
struct IfInfoMsg {
    family: u8,
    kind: u16,
    index: i32,
    flags: u32,
    change: u32,
}

impl IfInfoMsg {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.family);
        buf.push(0);
        buf.extend_from_slice(&self.kind.to_ne_bytes());
        buf.extend_from_slice(&self.index.to_ne_bytes());
        buf.extend_from_slice(&self.flags.to_ne_bytes());
        buf.extend_from_slice(&self.change.to_ne_bytes());
    }
}

/// `struct ifaddrmsg`
#[derive(Debug, Clone, Copy)]
struct IfAddrMsg {
    family: u8,
    prefix_len: u8,
    index: u32,
}

impl IfAddrMsg {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.family);
        buf.push(self.prefix_len);
        buf.push(0); // flags
        buf.push(0); // scope: universe
        buf.extend_from_slice(&self.index.to_ne_bytes());
    }
}

/// A netlink request under construction
///
/// The header is written last by [`NlRequest::finish`], once the total
/// length is known.
#[derive(Debug)]
pub(crate) struct NlRequest {
    msg_type: u16,
    flags: u16,
    buf: Vec<u8>,
}

impl NlRequest {
    fn new(msg_type: u16, flags: u16) -> Self {
        let mut buf = Vec::with_capacity(128);
        buf.resize(NLMSG_HDRLEN, 0);
        Self {
            msg_type,
            flags: flags | NLM_F_REQUEST | NLM_F_ACK,
            buf,
        }
    }

    fn attr(&mut self, kind: u16, payload: &[u8]) -> &mut Self {
        let len = NLA_HDRLEN + payload.len();
        self.buf.extend_from_slice(&(len as u16).to_ne_bytes());
        self.buf.extend_from_slice(&kind.to_ne_bytes());
        self.buf.extend_from_slice(payload);
        self.buf.resize(align4(self.buf.len()), 0);
        self
    }

    fn attr_str(&mut self, kind: u16, value: &str) -> &mut Self {
        let mut payload = Vec::with_capacity(value.len() + 1);
        payload.extend_from_slice(value.as_bytes());
        payload.push(0);
        self.attr(kind, &payload)
    }

    fn attr_u32(&mut self, kind: u16, value: u32) -> &mut Self {
        self.attr(kind, &value.to_ne_bytes())
    }

    /// Open a nested attribute; returns its offset for [`NlRequest::end_nested`]
    fn begin_nested(&mut self, kind: u16) -> usize {
        let start = self.buf.len();
        self.buf.extend_from_slice(&0u16.to_ne_bytes());
        self.buf
            .extend_from_slice(&(kind | NLA_F_NESTED).to_ne_bytes());
        start
    }

    fn end_nested(&mut self, start: usize) {
        let len = (self.buf.len() - start) as u16;
        self.buf[start..start + 2].copy_from_slice(&len.to_ne_bytes());
    }

    fn finish(mut self, seq: u32) -> Vec<u8> {
        let len = self.buf.len() as u32;
        self.buf[0..4].copy_from_slice(&len.to_ne_bytes());
        self.buf[4..6].copy_from_slice(&self.msg_type.to_ne_bytes());
        self.buf[6..8].copy_from_slice(&self.flags.to_ne_bytes());
        self.buf[8..12].copy_from_slice(&seq.to_ne_bytes());
        // nlmsg_pid stays 0: addressed to the kernel
        self.buf
    }
}

/// `RTM_NEWLINK` creating a veth pair `host` <-> `peer`
pub(crate) fn veth_request(host: &str, peer: &str) -> NlRequest {
    let mut req = NlRequest::new(RTM_NEWLINK, NLM_F_CREATE | NLM_F_EXCL);
    IfInfoMsg::default().encode(&mut req.buf);
    req.attr_str(IFLA_IFNAME, host);

    let linkinfo = req.begin_nested(IFLA_LINKINFO);
    req.attr_str(IFLA_INFO_KIND, "veth");
    let data = req.begin_nested(IFLA_INFO_DATA);
    let peer_info = req.begin_nested(VETH_INFO_PEER);
    IfInfoMsg::default().encode(&mut req.buf);
    req.attr_str(IFLA_IFNAME, peer);
    req.end_nested(peer_info);
    req.end_nested(data);
    req.end_nested(linkinfo);

    req
}

/// `RTM_NEWLINK` setting `IFF_UP` on a link
pub(crate) fn link_up_request(index: u32) -> NlRequest {
    let mut req = NlRequest::new(RTM_NEWLINK, 0);
    IfInfoMsg {
        index: index as i32,
        flags: IFF_UP,
        change: IFF_UP,
        ..IfInfoMsg::default()
    }
    .encode(&mut req.buf);
    req
}

/// `RTM_NEWLINK` moving a link into the namespace behind `netns_fd`
pub(crate) fn move_netns_request(index: u32, netns_fd: u32) -> NlRequest {
    let mut req = NlRequest::new(RTM_NEWLINK, 0);
    IfInfoMsg {
        index: index as i32,
        ..IfInfoMsg::default()
    }
    .encode(&mut req.buf);
    req.attr_u32(IFLA_NET_NS_FD, netns_fd);
    req
}

/// `RTM_NEWADDR` assigning `addr` to a link
pub(crate) fn address_request(index: u32, addr: IpNetwork) -> NlRequest {
    let mut req = NlRequest::new(RTM_NEWADDR, NLM_F_CREATE | NLM_F_EXCL);
    let (family, octets) = match addr {
        IpNetwork::V4(v4) => (libc::AF_INET as u8, v4.ip().octets().to_vec()),
        IpNetwork::V6(v6) => (libc::AF_INET6 as u8, v6.ip().octets().to_vec()),
    };
    IfAddrMsg {
        family,
        prefix_len: addr.prefix(),
        index,
    }
    .encode(&mut req.buf);
    req.attr(IFA_LOCAL, &octets);
    req.attr(IFA_ADDRESS, &octets);
    req
}

/// Find the kernel's answer to request `seq` in a receive buffer
///
/// Returns `None` if the buffer holds no answer for `seq`, `Some(0)` for an
/// ACK, and `Some(errno)` for a failure.
pub(crate) fn parse_ack(buf: &[u8], seq: u32) -> Option<i32> {
    let mut offset = 0;
    while offset + NLMSG_HDRLEN <= buf.len() {
        let msg = &buf[offset..];
        let len = read_u32(msg, 0)? as usize;
        let msg_type = read_u16(msg, 4)?;
        let msg_seq = read_u32(msg, 8)?;

        if len < NLMSG_HDRLEN || len > msg.len() {
            return None;
        }

        if msg_seq == seq {
            match msg_type {
                NLMSG_ERROR => return read_i32(msg, NLMSG_HDRLEN).map(|code| -code),
                NLMSG_DONE => return Some(0),
                _ => {}
            }
        }

        offset += align4(len);
    }
    None
}

fn read_u16(buf: &[u8], at: usize) -> Option<u16> {
    buf.get(at..at + 2)?.try_into().ok().map(u16::from_ne_bytes)
}

fn read_u32(buf: &[u8], at: usize) -> Option<u32> {
    buf.get(at..at + 4)?.try_into().ok().map(u32::from_ne_bytes)
}

fn read_i32(buf: &[u8], at: usize) -> Option<i32> {
    buf.get(at..at + 4)?.try_into().ok().map(i32::from_ne_bytes)
}

/// Netlink socket handle for link configuration
pub struct NetlinkBackend {
    fd: OwnedFd,
    seq: u32,
}

impl NetlinkBackend {
    /// Open a route netlink socket in the current network namespace
    ///
    /// # Errors
    /// Returns error if the socket cannot be created or bound
    pub fn new() -> Result<Self> {
        let raw = unsafe {
            libc::socket(
                libc::AF_NETLINK,
                libc::SOCK_RAW | libc::SOCK_CLOEXEC,
                libc::NETLINK_ROUTE,
            )
        };
        if raw < 0 {
            return Err(Error::link(format!(
                "failed to create netlink socket: {}",
                io::Error::last_os_error()
            )));
        }
        // SAFETY: raw is a freshly created, owned descriptor
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let mut addr: libc::sockaddr_nl = unsafe { mem::zeroed() };
        addr.nl_family = libc::AF_NETLINK as libc::sa_family_t;

        let ret = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                std::ptr::addr_of!(addr).cast::<libc::sockaddr>(),
                mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(Error::link(format!(
                "failed to bind netlink socket: {}",
                io::Error::last_os_error()
            )));
        }

        Ok(Self { fd, seq: 0 })
    }

    fn next_seq(&mut self) -> u32 {
        self.seq = self.seq.wrapping_add(1);
        self.seq
    }

    /// Send a request and wait for its ACK
    fn execute(&mut self, operation: &str, req: NlRequest) -> Result<()> {
        let seq = self.next_seq();
        let msg = req.finish(seq);
        trace!(operation, seq, len = msg.len(), "Sending netlink request");

        let sent = unsafe {
            libc::send(
                self.fd.as_raw_fd(),
                msg.as_ptr().cast::<libc::c_void>(),
                msg.len(),
                0,
            )
        };
        if sent < 0 {
            return Err(Error::link(format!(
                "{operation}: send failed: {}",
                io::Error::last_os_error()
            )));
        }

        let mut buf = vec![0u8; 8192];
        loop {
            let len = unsafe {
                libc::recv(
                    self.fd.as_raw_fd(),
                    buf.as_mut_ptr().cast::<libc::c_void>(),
                    buf.len(),
                    0,
                )
            };
            if len < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(Error::link(format!("{operation}: receive failed: {err}")));
            }

            match parse_ack(&buf[..len as usize], seq) {
                Some(0) => return Ok(()),
                Some(errno) => {
                    return Err(Error::link(format!(
                        "{operation}: {}",
                        io::Error::from_raw_os_error(errno)
                    )));
                }
                None => trace!(operation, "Skipping unrelated netlink message"),
            }
        }
    }

    /// Resolve an interface index by name
    ///
    /// The lookup runs in the calling thread's network namespace, not
    /// necessarily the one the socket is bound to.
    ///
    /// # Errors
    /// Returns error if the interface does not exist in that namespace
    pub fn index_of(&self, name: &str) -> Result<u32> {
        let c_name = CString::new(name).map_err(|e| Error::link(e.to_string()))?;
        let index = unsafe { libc::if_nametoindex(c_name.as_ptr()) };
        if index == 0 {
            return Err(Error::link(format!(
                "interface not found: {name}: {}",
                io::Error::last_os_error()
            )));
        }
        Ok(index)
    }
}

impl std::fmt::Debug for NetlinkBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetlinkBackend")
            .field("fd", &self.fd.as_raw_fd())
            .field("seq", &self.seq)
            .finish()
    }
}

impl LinkBackend for NetlinkBackend {
    fn link_exists(&mut self, name: &str) -> Result<bool> {
        let c_name = CString::new(name).map_err(|e| Error::link(e.to_string()))?;
        let index = unsafe { libc::if_nametoindex(c_name.as_ptr()) };
        if index != 0 {
            return Ok(true);
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ENODEV) {
            Ok(false)
        } else {
            Err(Error::link(format!("lookup {name}: {err}")))
        }
    }

    fn create_veth(&mut self, host: &str, peer: &str) -> Result<()> {
        debug!(host, peer, "Adding veth link");
        self.execute(&format!("create veth {host}"), veth_request(host, peer))
    }

    fn set_link_up(&mut self, name: &str) -> Result<()> {
        let index = self.index_of(name)?;
        debug!(link = name, index, "Bringing link up");
        self.execute(&format!("set {name} up"), link_up_request(index))
    }

    fn add_address(&mut self, name: &str, addr: IpNetwork) -> Result<()> {
        let index = self.index_of(name)?;
        debug!(link = name, %addr, "Adding address");
        self.execute(&format!("add {addr} to {name}"), address_request(index, addr))
    }

    fn move_to_netns(&mut self, name: &str, netns: BorrowedFd<'_>) -> Result<()> {
        let index = self.index_of(name)?;
        let fd = u32::try_from(netns.as_raw_fd())
            .map_err(|_| Error::link(format!("invalid namespace descriptor for {name}")))?;
        debug!(link = name, index, netns_fd = fd, "Moving link to network namespace");
        self.execute(&format!("move {name} to netns"), move_netns_request(index, fd))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn test_veth_request_layout() {
        let msg = veth_request("veth0_container", "veth1_container").finish(7);

        assert_eq!(read_u32(&msg, 0).unwrap() as usize, msg.len());
        assert_eq!(read_u16(&msg, 4).unwrap(), RTM_NEWLINK);
        assert_eq!(
            read_u16(&msg, 6).unwrap(),
            NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_EXCL
        );
        assert_eq!(read_u32(&msg, 8).unwrap(), 7);
        assert_eq!(msg.len() % 4, 0);

        assert!(contains(&msg, b"veth0_container\0"));
        assert!(contains(&msg, b"veth1_container\0"));
        assert!(contains(&msg, b"veth\0"));
    }

    #[test]
    fn test_veth_request_nesting() {
        let msg = veth_request("a", "b").finish(1);

        // header (16) + ifinfomsg (16) + IFLA_IFNAME "a\0" (8)
        let linkinfo = NLMSG_HDRLEN + 16 + 8;
        assert_eq!(read_u16(&msg, linkinfo + 2).unwrap(), IFLA_LINKINFO | NLA_F_NESTED);
        // The outermost nest runs to the end of the message
        assert_eq!(linkinfo + read_u16(&msg, linkinfo).unwrap() as usize, msg.len());
    }

    #[test]
    fn test_link_up_request() {
        let msg = link_up_request(5).finish(2);

        assert_eq!(msg.len(), NLMSG_HDRLEN + 16);
        assert_eq!(read_u32(&msg, NLMSG_HDRLEN + 4).unwrap(), 5);
        assert_eq!(read_u32(&msg, NLMSG_HDRLEN + 8).unwrap(), IFF_UP);
        assert_eq!(read_u32(&msg, NLMSG_HDRLEN + 12).unwrap(), IFF_UP);
    }

    #[test]
    fn test_move_netns_request() {
        let msg = move_netns_request(9, 42).finish(3);

        let attr = NLMSG_HDRLEN + 16;
        assert_eq!(read_u16(&msg, attr).unwrap(), 8);
        assert_eq!(read_u16(&msg, attr + 2).unwrap(), IFLA_NET_NS_FD);
        assert_eq!(read_u32(&msg, attr + 4).unwrap(), 42);
    }

    #[test]
    fn test_address_request() {
        let msg = address_request(4, "10.0.0.2/24".parse().unwrap()).finish(4);

        assert_eq!(read_u16(&msg, 4).unwrap(), RTM_NEWADDR);
        assert_eq!(msg[NLMSG_HDRLEN], libc::AF_INET as u8);
        assert_eq!(msg[NLMSG_HDRLEN + 1], 24);
        assert_eq!(read_u32(&msg, NLMSG_HDRLEN + 4).unwrap(), 4);
        assert!(contains(&msg, &[10, 0, 0, 2]));
    }

    fn error_message(seq: u32, code: i32) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&36u32.to_ne_bytes());
        buf.extend_from_slice(&NLMSG_ERROR.to_ne_bytes());
        buf.extend_from_slice(&0u16.to_ne_bytes());
        buf.extend_from_slice(&seq.to_ne_bytes());
        buf.extend_from_slice(&0u32.to_ne_bytes());
        buf.extend_from_slice(&code.to_ne_bytes());
        buf.resize(36, 0);
        buf
    }

    #[test]
    fn test_parse_ack() {
        assert_eq!(parse_ack(&error_message(3, 0), 3), Some(0));
        assert_eq!(parse_ack(&error_message(3, -libc::EEXIST), 3), Some(libc::EEXIST));
        assert_eq!(parse_ack(&error_message(2, 0), 3), None);
        assert_eq!(parse_ack(&[0u8; 4], 3), None);
    }

    #[test]
    fn test_parse_ack_skips_other_messages() {
        let mut buf = error_message(1, -libc::EPERM);
        buf.extend(error_message(2, 0));
        assert_eq!(parse_ack(&buf, 2), Some(0));
    }

    #[test]
    fn test_loopback_lookup() {
        let mut backend = NetlinkBackend::new().unwrap();
        assert!(backend.link_exists("lo").unwrap());
        assert!(!backend.link_exists("burrow-nope0").unwrap());
        assert!(backend.index_of("lo").unwrap() > 0);
    }
}
