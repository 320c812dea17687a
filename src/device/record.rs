// src/device/record.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Raw data the OS device subsystem reports for one device.
///
/// Backends fill this in; [`crate::device::Description`] wraps it as an
/// immutable snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceRecord {
    /// Kernel device path relative to the sysfs mount, e.g. `/devices/pci0000:00/...`.
    pub devpath: String,
    pub syspath: PathBuf,
    pub subsystem: Option<String>,
    pub devtype: Option<String>,
    pub devnode: Option<PathBuf>,
    pub driver: Option<String>,
    pub sysname: String,
    pub sysnum: Option<String>,
    pub properties: BTreeMap<String, String>,
    pub tags: Vec<String>,
    pub attributes: BTreeMap<String, String>,
    pub initialized: bool,
    pub seqnum: u64,
    pub usec_since_initialized: u64,
}

impl DeviceRecord {
    /// Build a record from a uevent property set (`DEVPATH`, `SUBSYSTEM`, ...).
    ///
    /// Returns `None` when `DEVPATH` is missing. `sys_root` is the sysfs mount
    /// point the devpath is relative to.
    pub fn from_properties(properties: BTreeMap<String, String>, sys_root: &Path) -> Option<Self> {
        let devpath = properties.get("DEVPATH")?.clone();
        let sysname = sysname_of(&devpath).to_string();

        let tags = properties
            .get("TAGS")
            .map(|t| parse_tag_list(t))
            .unwrap_or_default();

        Some(Self {
            syspath: syspath_of(sys_root, &devpath),
            subsystem: properties.get("SUBSYSTEM").cloned(),
            devtype: properties.get("DEVTYPE").cloned(),
            devnode: properties.get("DEVNAME").map(|n| devnode_path(n)),
            driver: properties.get("DRIVER").cloned(),
            sysnum: sysnum_of(&sysname),
            sysname,
            tags,
            initialized: properties.contains_key("USEC_INITIALIZED"),
            seqnum: properties
                .get("SEQNUM")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            usec_since_initialized: 0,
            attributes: BTreeMap::new(),
            devpath,
            properties,
        })
    }

    pub fn has_property(&self, key: &str, value: &str) -> bool {
        self.properties.get(key).is_some_and(|v| v == value)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn has_attribute(&self, key: &str, value: &str) -> bool {
        self.attributes.get(key).is_some_and(|v| v == value)
    }
}

/// Last path component of a devpath.
pub fn sysname_of(devpath: &str) -> &str {
    devpath.rsplit('/').next().unwrap_or(devpath)
}

/// Trailing decimal digits of a sysname (`hidraw3` -> `3`), if any.
pub fn sysnum_of(sysname: &str) -> Option<String> {
    let digits = sysname
        .bytes()
        .rev()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if digits == 0 {
        None
    } else {
        Some(sysname[sysname.len() - digits..].to_string())
    }
}

pub fn syspath_of(sys_root: &Path, devpath: &str) -> PathBuf {
    sys_root.join(devpath.trim_start_matches('/'))
}

/// udev reports `DEVNAME` relative to `/dev` in kernel events and absolute in
/// its own database.
pub fn devnode_path(devname: &str) -> PathBuf {
    if devname.starts_with('/') {
        PathBuf::from(devname)
    } else {
        Path::new("/dev").join(devname)
    }
}

/// Split a `:tag1:tag2:` list.
pub fn parse_tag_list(tags: &str) -> Vec<String> {
    tags.split(':')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
