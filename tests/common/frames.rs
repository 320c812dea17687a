//! Hand-built uevent datagrams.

use devwatch::subsystem::uevent::{UDEV_HEADER_LEN, UDEV_PREFIX};

pub fn kernel_frame(header: &str, props: &[(&str, &str)]) -> Vec<u8> {
    let mut buf = header.as_bytes().to_vec();
    buf.push(0);
    for (k, v) in props {
        buf.extend_from_slice(format!("{k}={v}").as_bytes());
        buf.push(0);
    }
    buf
}

/// libudev framing: prefix, BE magic, NE header size / property offset and
/// length, filter hashes, then the property block.
pub fn udev_frame(magic: u32, props: &[(&str, &str)]) -> Vec<u8> {
    let mut block = Vec::new();
    for (k, v) in props {
        block.extend_from_slice(format!("{k}={v}").as_bytes());
        block.push(0);
    }

    let mut buf = Vec::with_capacity(UDEV_HEADER_LEN + block.len());
    buf.extend_from_slice(UDEV_PREFIX);
    buf.extend_from_slice(&magic.to_be_bytes());
    buf.extend_from_slice(&(UDEV_HEADER_LEN as u32).to_ne_bytes());
    buf.extend_from_slice(&(UDEV_HEADER_LEN as u32).to_ne_bytes());
    buf.extend_from_slice(&(block.len() as u32).to_ne_bytes());
    buf.extend_from_slice(&[0u8; 16]);
    assert_eq!(buf.len(), UDEV_HEADER_LEN);
    buf.extend_from_slice(&block);
    buf
}
