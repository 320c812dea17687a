// src/types.rs

use serde::Deserialize;

/// Which netlink multicast group the monitor listens on.
///
/// - `Udev`: events re-broadcast by udevd after rule processing (properties,
///   tags and device node permissions are final). Default.
/// - `Kernel`: raw kernel uevents, delivered before udev has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorSource {
    Udev,
    Kernel,
}

impl Default for MonitorSource {
    fn default() -> Self {
        MonitorSource::Udev
    }
}

impl MonitorSource {
    /// Netlink multicast group for this source.
    pub fn netlink_group(self) -> u32 {
        match self {
            MonitorSource::Kernel => 1,
            MonitorSource::Udev => 2,
        }
    }
}

/// File type a device node must have before the opener accepts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Char,
    Block,
    Any,
}

impl Default for NodeKind {
    fn default() -> Self {
        NodeKind::Char
    }
}
