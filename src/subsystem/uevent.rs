// src/subsystem/uevent.rs

//! Netlink uevent datagram parsing.
//!
//! Two framings exist on `NETLINK_KOBJECT_UEVENT`:
//!
//! - kernel: `action@devpath\0KEY=VALUE\0KEY=VALUE\0...`
//! - udevd re-broadcast: a 40-byte header starting with `libudev\0`, a
//!   big-endian magic, then native-endian offset/length of the
//!   `KEY=VALUE\0` property block.

use std::collections::BTreeMap;

use crate::subsystem::Action;

pub const UDEV_PREFIX: &[u8] = b"libudev\0";
pub const UDEV_MAGIC: u32 = 0xfeed_cafe;
pub const UDEV_HEADER_LEN: usize = 40;

/// A parsed uevent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uevent {
    pub action: Action,
    pub properties: BTreeMap<String, String>,
    /// True for events re-broadcast by udevd.
    pub from_udev: bool,
}

/// Parse one datagram. Returns `None` for anything malformed.
pub fn parse(buf: &[u8]) -> Option<Uevent> {
    if buf.starts_with(UDEV_PREFIX) {
        parse_udev(buf)
    } else {
        parse_kernel(buf)
    }
}

fn parse_udev(buf: &[u8]) -> Option<Uevent> {
    if buf.len() < UDEV_HEADER_LEN {
        return None;
    }
    let magic = u32::from_be_bytes(buf[8..12].try_into().ok()?);
    if magic != UDEV_MAGIC {
        return None;
    }
    let offset = u32::from_ne_bytes(buf[16..20].try_into().ok()?) as usize;
    let len = u32::from_ne_bytes(buf[20..24].try_into().ok()?) as usize;
    let end = offset.checked_add(len)?;
    if offset < UDEV_HEADER_LEN || end > buf.len() {
        return None;
    }

    let properties = parse_properties(&buf[offset..end]);
    let action = Action::parse(properties.get("ACTION")?);
    properties.get("DEVPATH")?;

    Some(Uevent {
        action,
        properties,
        from_udev: true,
    })
}

fn parse_kernel(buf: &[u8]) -> Option<Uevent> {
    let header_end = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
    let header = std::str::from_utf8(&buf[..header_end]).ok()?;
    let (action, devpath) = header.split_once('@')?;

    let rest = buf.get(header_end + 1..).unwrap_or(&[]);
    let mut properties = parse_properties(rest);
    properties
        .entry("ACTION".to_string())
        .or_insert_with(|| action.to_string());
    properties
        .entry("DEVPATH".to_string())
        .or_insert_with(|| devpath.to_string());

    let action = Action::parse(&properties["ACTION"]);
    Some(Uevent {
        action,
        properties,
        from_udev: false,
    })
}

/// Split a `KEY=VALUE\0...` block. Entries that are not UTF-8 or have no `=`
/// are dropped.
pub fn parse_properties(block: &[u8]) -> BTreeMap<String, String> {
    block
        .split(|b| *b == 0)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| std::str::from_utf8(entry).ok())
        .filter_map(|entry| entry.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
