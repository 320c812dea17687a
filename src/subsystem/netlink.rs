// src/subsystem/netlink.rs

//! Netlink uevent monitor.
//!
//! The socket is non-blocking and registered with the tokio reactor through
//! [`AsyncFd`]. `ready` waits for readability; `try_next` reads datagrams
//! until one passes the sender check, parses and matches the query, or the
//! socket reports `WouldBlock`.
//!
//! Only multicast datagrams are accepted. Kernel events must come from port
//! 0; udevd events must come from a nonzero port with root credentials.

use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::path::PathBuf;
use std::future::Future;
use std::pin::Pin;

use tokio::io::unix::AsyncFd;
use tracing::{debug, info, trace};

use crate::device::DeviceRecord;
use crate::errors::{DevwatchError, Result};
use crate::subsystem::sysfs::monotonic_usec;
use crate::subsystem::{uevent, DeviceMonitor, MonitorQuery, RawEvent};
use crate::types::MonitorSource;

/// udevd messages can carry many properties; kernel ones are capped at 2 KiB.
const RECV_BUFFER_LEN: usize = 16 * 1024;

#[derive(Debug)]
pub struct NetlinkMonitor {
    fd: AsyncFd<OwnedFd>,
    source: MonitorSource,
    query: MonitorQuery,
    sys_root: PathBuf,
    port_id: u32,
    buf: Vec<u8>,
}

/// Metadata of one received datagram.
#[derive(Debug, Clone, Copy)]
struct Datagram {
    len: usize,
    sender_port: u32,
    groups: u32,
    uid: Option<u32>,
}

impl NetlinkMonitor {
    /// Open and bind the uevent socket. Must be called inside a tokio runtime.
    pub fn open(source: MonitorSource, query: MonitorQuery, sys_root: PathBuf) -> Result<Self> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(DevwatchError::Subsystem(
                "device monitoring needs a running tokio runtime".to_string(),
            ));
        }

        let socket = open_socket(source.netlink_group()).map_err(|e| {
            DevwatchError::Subsystem(format!("cannot open uevent socket: {e}"))
        })?;
        let port_id = local_port(&socket).map_err(|e| {
            DevwatchError::Subsystem(format!("cannot query uevent socket address: {e}"))
        })?;
        let fd = AsyncFd::new(socket).map_err(|e| {
            DevwatchError::Subsystem(format!("cannot register uevent socket: {e}"))
        })?;

        info!(?source, port_id, "uevent monitor listening");

        Ok(Self {
            fd,
            source,
            query,
            sys_root,
            port_id,
            buf: vec![0; RECV_BUFFER_LEN],
        })
    }

    /// Netlink port id the socket is bound to.
    pub fn port_id(&self) -> u32 {
        self.port_id
    }

    /// Unicast datagrams are never uevents. Kernel uevents come from port 0;
    /// udevd re-broadcasts from its own port and runs as root.
    fn sender_allowed(&self, datagram: &Datagram) -> bool {
        if datagram.groups == 0 {
            return false;
        }
        match self.source {
            MonitorSource::Kernel => datagram.sender_port == 0,
            MonitorSource::Udev => datagram.sender_port != 0 && datagram.uid == Some(0),
        }
    }

    fn decode(&self, len: usize) -> Option<RawEvent> {
        let event = uevent::parse(&self.buf[..len])?;
        if event.from_udev != (self.source == MonitorSource::Udev) {
            return None;
        }

        let initialized_at = event
            .properties
            .get("USEC_INITIALIZED")
            .and_then(|s| s.parse::<u64>().ok());
        let mut record = DeviceRecord::from_properties(event.properties, &self.sys_root)?;
        if let Some(at) = initialized_at {
            record.usec_since_initialized = monotonic_usec().saturating_sub(at);
        }

        if !self.query.matches(event.action, &record) {
            trace!(devpath = %record.devpath, "uevent filtered by monitor query");
            return None;
        }
        Some(RawEvent {
            action: event.action,
            record,
        })
    }
}

impl DeviceMonitor for NetlinkMonitor {
    fn ready(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut guard = self.fd.readable().await?;
            // The caller drains to WouldBlock right after, so readiness can be
            // cleared up front.
            guard.clear_ready();
            Ok(())
        })
    }

    fn try_next(&mut self) -> Result<Option<RawEvent>> {
        loop {
            let datagram = match recv_datagram(self.fd.get_ref(), &mut self.buf) {
                Ok(received) => received,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            };

            if !self.sender_allowed(&datagram) {
                debug!(
                    sender = datagram.sender_port,
                    groups = datagram.groups,
                    uid = ?datagram.uid,
                    "dropping uevent from unexpected sender"
                );
                continue;
            }
            if let Some(event) = self.decode(datagram.len) {
                return Ok(Some(event));
            }
        }
    }
}

fn open_socket(group: u32) -> io::Result<OwnedFd> {
    // SAFETY: plain socket(2) call; the result is checked before use.
    let raw = unsafe {
        libc::socket(
            libc::AF_NETLINK,
            libc::SOCK_DGRAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
            libc::NETLINK_KOBJECT_UEVENT,
        )
    };
    if raw < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: `raw` is a freshly created descriptor owned by nobody else.
    let fd = unsafe { OwnedFd::from_raw_fd(raw) };

    let one: libc::c_int = 1;
    // SAFETY: `one` outlives the call and the length matches its type.
    let rc = unsafe {
        libc::setsockopt(
            fd.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_PASSCRED,
            (&one as *const libc::c_int).cast::<libc::c_void>(),
            mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: sockaddr_nl is plain data; all-zero is a valid value.
    let mut addr: libc::sockaddr_nl = unsafe { mem::zeroed() };
    addr.nl_family = libc::AF_NETLINK as libc::sa_family_t;
    addr.nl_groups = group;

    // SAFETY: `addr` outlives the call and the length matches its type.
    let rc = unsafe {
        libc::bind(
            fd.as_raw_fd(),
            (&addr as *const libc::sockaddr_nl).cast::<libc::sockaddr>(),
            mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(fd)
}

/// Port id assigned by the kernel at bind time.
fn local_port(fd: &OwnedFd) -> io::Result<u32> {
    // SAFETY: see `open_socket`.
    let mut addr: libc::sockaddr_nl = unsafe { mem::zeroed() };
    let mut addr_len = mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t;

    // SAFETY: `addr` is valid for writes of `addr_len` bytes.
    let rc = unsafe {
        libc::getsockname(
            fd.as_raw_fd(),
            (&mut addr as *mut libc::sockaddr_nl).cast::<libc::sockaddr>(),
            &mut addr_len,
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(addr.nl_pid)
}

/// Receive one datagram together with its source address and the sender
/// credentials passed through `SO_PASSCRED`.
fn recv_datagram(fd: &OwnedFd, buf: &mut [u8]) -> io::Result<Datagram> {
    // SAFETY: see `open_socket`.
    let mut addr: libc::sockaddr_nl = unsafe { mem::zeroed() };
    let mut iov = libc::iovec {
        iov_base: buf.as_mut_ptr().cast::<libc::c_void>(),
        iov_len: buf.len(),
    };
    // Room for one SCM_CREDENTIALS message, u64-aligned for cmsghdr.
    let mut control = [0u64; 8];

    // SAFETY: msghdr is plain data; all-zero is a valid value.
    let mut msg: libc::msghdr = unsafe { mem::zeroed() };
    msg.msg_name = (&mut addr as *mut libc::sockaddr_nl).cast::<libc::c_void>();
    msg.msg_namelen = mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t;
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = control.as_mut_ptr().cast::<libc::c_void>();
    msg.msg_controllen = mem::size_of_val(&control) as _;

    // SAFETY: every pointer in `msg` refers to a live buffer of the stated
    // length.
    let n = unsafe { libc::recvmsg(fd.as_raw_fd(), &mut msg, 0) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }

    let mut uid = None;
    // SAFETY: `msg` was filled in by recvmsg and its control buffer is still
    // alive; the CMSG_* helpers stay within `msg_controllen`.
    unsafe {
        let mut cmsg = libc::CMSG_FIRSTHDR(&msg);
        while !cmsg.is_null() {
            if (*cmsg).cmsg_level == libc::SOL_SOCKET
                && (*cmsg).cmsg_type == libc::SCM_CREDENTIALS
            {
                let cred = libc::CMSG_DATA(cmsg)
                    .cast::<libc::ucred>()
                    .read_unaligned();
                uid = Some(cred.uid);
            }
            cmsg = libc::CMSG_NXTHDR(&msg, cmsg);
        }
    }

    Ok(Datagram {
        len: n as usize,
        sender_port: addr.nl_pid,
        groups: addr.nl_groups,
        uid,
    })
}
