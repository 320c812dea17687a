// src/subsystem/sysfs.rs

//! Linux backend: device records from sysfs and the udev database, live
//! events from a netlink uevent socket.
//!
//! Layout relied on:
//! - every device is a directory under `<sys>/devices` holding a `uevent` file;
//! - `subsystem` and `driver` are symlinks whose basename is the name;
//! - `<sys>/class/<subsystem>/*` and `<sys>/bus/<subsystem>/devices/*` are
//!   symlinks to device directories;
//! - udev keeps per-device state in `<udev_data>/<id>` with `E:` (property),
//!   `G:` (tag) and `I:` (initialisation timestamp) lines.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::device::record::{devnode_path, syspath_of, sysnum_of};
use crate::device::DeviceRecord;
use crate::errors::{DevwatchError, Result};
use crate::fs::{FileSystem, RealFileSystem};
use crate::subsystem::{DeviceMonitor, DeviceSubsystem, EnumerateQuery, MonitorQuery};
use crate::types::MonitorSource;

pub const DEFAULT_SYS_ROOT: &str = "/sys";
pub const DEFAULT_UDEV_DATA_DIR: &str = "/run/udev/data";

#[derive(Debug, Clone)]
pub struct SysfsSubsystem {
    fs: Arc<dyn FileSystem>,
    sys_root: PathBuf,
    udev_data: PathBuf,
    monitor_source: MonitorSource,
}

impl SysfsSubsystem {
    /// Connect to the live system.
    pub fn open(monitor_source: MonitorSource) -> Result<Self> {
        Self::with_filesystem(
            Arc::new(RealFileSystem),
            DEFAULT_SYS_ROOT,
            DEFAULT_UDEV_DATA_DIR,
            monitor_source,
        )
    }

    /// Connect through an arbitrary filesystem view.
    ///
    /// Fails when `<sys_root>/devices` is missing, i.e. sysfs is not mounted.
    pub fn with_filesystem(
        fs: Arc<dyn FileSystem>,
        sys_root: impl Into<PathBuf>,
        udev_data: impl Into<PathBuf>,
        monitor_source: MonitorSource,
    ) -> Result<Self> {
        let sys_root = sys_root.into();
        if !fs.is_dir(&sys_root.join("devices")) {
            return Err(DevwatchError::Subsystem(format!(
                "no device tree at {:?}; is sysfs mounted?",
                sys_root.join("devices")
            )));
        }
        Ok(Self {
            fs,
            sys_root,
            udev_data: udev_data.into(),
            monitor_source,
        })
    }

    pub fn sys_root(&self) -> &Path {
        &self.sys_root
    }

    fn devices_root(&self) -> PathBuf {
        self.sys_root.join("devices")
    }

    fn devpath_of(&self, syspath: &Path) -> Option<String> {
        let rel = syspath.strip_prefix(&self.sys_root).ok()?;
        Some(format!("/{}", rel.to_string_lossy()))
    }

    fn is_device_dir(&self, path: &Path) -> bool {
        self.fs.is_dir(path) && !self.fs.is_symlink(path) && self.fs.is_file(&path.join("uevent"))
    }

    fn link_name(&self, path: &Path) -> Option<String> {
        let target = self.fs.read_link(path).ok()?;
        target.file_name().map(|n| n.to_string_lossy().into_owned())
    }

    fn read_record(&self, syspath: &Path) -> Result<DeviceRecord> {
        let devpath = self
            .devpath_of(syspath)
            .ok_or_else(|| DevwatchError::DeviceNotFound(syspath.display().to_string()))?;
        if !self.is_device_dir(syspath) {
            return Err(DevwatchError::DeviceNotFound(devpath));
        }

        let uevent = self.fs.read_to_string(&syspath.join("uevent"))?;
        let mut properties = parse_uevent_file(&uevent);

        let subsystem = self.link_name(&syspath.join("subsystem"));
        let driver = self
            .link_name(&syspath.join("driver"))
            .or_else(|| properties.get("DRIVER").cloned());
        let sysname = syspath
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let devnode = properties.get("DEVNAME").map(|n| devnode_path(n));

        properties.insert("DEVPATH".to_string(), devpath.clone());
        if let Some(s) = &subsystem {
            properties.insert("SUBSYSTEM".to_string(), s.clone());
        }
        if let Some(node) = &devnode {
            properties.insert("DEVNAME".to_string(), node.display().to_string());
        }

        let mut record = DeviceRecord {
            devpath,
            syspath: syspath.to_path_buf(),
            devtype: properties.get("DEVTYPE").cloned(),
            sysnum: sysnum_of(&sysname),
            sysname,
            subsystem,
            driver,
            devnode,
            ..DeviceRecord::default()
        };

        self.merge_udev_db(&mut record, &mut properties);
        record.properties = properties;
        record.attributes = self.read_attributes(syspath);
        Ok(record)
    }

    /// Fold the udev database entry into the record, if udev has seen the
    /// device.
    fn merge_udev_db(&self, record: &mut DeviceRecord, properties: &mut BTreeMap<String, String>) {
        let Some(id) = udev_db_id(properties, record.subsystem.as_deref(), &record.sysname) else {
            return;
        };
        let db_path = self.udev_data.join(&id);
        let Ok(content) = self.fs.read_to_string(&db_path) else {
            trace!(devpath = %record.devpath, db = ?db_path, "no udev database entry");
            return;
        };

        record.initialized = true;
        for line in content.lines() {
            match line.split_once(':') {
                Some(("E", entry)) => {
                    if let Some((k, v)) = entry.split_once('=') {
                        properties.insert(k.to_string(), v.to_string());
                    }
                }
                Some(("G", tag)) => {
                    if !record.has_tag(tag) {
                        record.tags.push(tag.to_string());
                    }
                }
                Some(("I", usec)) => {
                    if let Ok(initialized_at) = usec.parse::<u64>() {
                        record.usec_since_initialized =
                            monotonic_usec().saturating_sub(initialized_at);
                    }
                }
                _ => {}
            }
        }
    }

    fn read_attributes(&self, syspath: &Path) -> BTreeMap<String, String> {
        let mut attributes = BTreeMap::new();
        let Ok(entries) = self.fs.read_dir(syspath) else {
            return attributes;
        };
        for path in entries {
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            if name == "uevent" || self.fs.is_symlink(&path) || !self.fs.is_file(&path) {
                continue;
            }
            // Write-only and binary attributes fail to read; they are left out.
            if let Ok(value) = self.fs.read_to_string(&path) {
                attributes.insert(name, value.trim_end_matches('\n').to_string());
            }
        }
        attributes
    }

    /// Physical device directories that belong to `subsystem`.
    fn subsystem_members(&self, subsystem: &str) -> Vec<PathBuf> {
        let bases = [
            self.sys_root.join("class").join(subsystem),
            self.sys_root.join("bus").join(subsystem).join("devices"),
        ];
        let mut seen = HashSet::new();
        let mut members = Vec::new();
        for base in bases {
            let Ok(entries) = self.fs.read_dir(&base) else {
                continue;
            };
            for entry in entries {
                match self.fs.canonicalize(&entry) {
                    Ok(path) => {
                        if seen.insert(path.clone()) {
                            members.push(path);
                        }
                    }
                    Err(err) => debug!(entry = ?entry, error = %err, "dangling class link"),
                }
            }
        }
        members
    }

    /// Every device directory under `root`, depth-first.
    fn walk_devices(&self, root: &Path, include_root: bool) -> Vec<PathBuf> {
        let mut found = Vec::new();
        if include_root && self.is_device_dir(root) {
            found.push(root.to_path_buf());
        }
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            let Ok(entries) = self.fs.read_dir(&dir) else {
                continue;
            };
            let mut subdirs: Vec<PathBuf> = entries
                .into_iter()
                .filter(|p| self.fs.is_dir(p) && !self.fs.is_symlink(p))
                .collect();
            subdirs.reverse();
            for sub in subdirs {
                if self.is_device_dir(&sub) {
                    found.push(sub.clone());
                }
                stack.push(sub);
            }
        }
        found
    }
}

impl DeviceSubsystem for SysfsSubsystem {
    fn enumerate(&self, query: &EnumerateQuery) -> Result<Vec<Result<DeviceRecord>>> {
        let candidates = match &query.subsystem {
            Some(subsystem) => self.subsystem_members(subsystem),
            None => self.walk_devices(&self.devices_root(), false),
        };
        debug!(count = candidates.len(), subsystem = ?query.subsystem, "enumerating sysfs devices");

        Ok(candidates
            .iter()
            .map(|syspath| self.read_record(syspath))
            .filter(|res| match res {
                Ok(record) => query.matches(record),
                Err(_) => true,
            })
            .collect())
    }

    fn device(&self, devpath: &str) -> Result<DeviceRecord> {
        self.read_record(&syspath_of(&self.sys_root, devpath))
    }

    fn parent(&self, devpath: &str) -> Result<Option<String>> {
        let devices_root = self.devices_root();
        let mut current = syspath_of(&self.sys_root, devpath);
        if !self.fs.is_dir(&current) {
            return Err(DevwatchError::DeviceNotFound(devpath.to_string()));
        }
        while current.pop() {
            if !current.starts_with(&devices_root) || current == devices_root {
                break;
            }
            if self.is_device_dir(&current) {
                return Ok(self.devpath_of(&current));
            }
        }
        Ok(None)
    }

    fn children(&self, devpath: &str) -> Result<Vec<String>> {
        let syspath = syspath_of(&self.sys_root, devpath);
        if !self.fs.is_dir(&syspath) {
            return Err(DevwatchError::DeviceNotFound(devpath.to_string()));
        }
        // Children sit directly below, or below class directories like
        // `hidraw/` that are not devices themselves.
        let mut children = Vec::new();
        let mut stack = vec![syspath];
        while let Some(dir) = stack.pop() {
            let Ok(entries) = self.fs.read_dir(&dir) else {
                continue;
            };
            for entry in entries {
                if !self.fs.is_dir(&entry) || self.fs.is_symlink(&entry) {
                    continue;
                }
                if self.is_device_dir(&entry) {
                    if let Some(child) = self.devpath_of(&entry) {
                        children.push(child);
                    }
                } else {
                    stack.push(entry);
                }
            }
        }
        Ok(children)
    }

    #[cfg(target_os = "linux")]
    fn monitor(&self, query: &MonitorQuery) -> Result<Box<dyn DeviceMonitor>> {
        let monitor = crate::subsystem::netlink::NetlinkMonitor::open(
            self.monitor_source,
            query.clone(),
            self.sys_root.clone(),
        )?;
        Ok(Box::new(monitor))
    }

    #[cfg(not(target_os = "linux"))]
    fn monitor(&self, _query: &MonitorQuery) -> Result<Box<dyn DeviceMonitor>> {
        Err(DevwatchError::Subsystem(
            "device monitoring needs Linux netlink uevents".to_string(),
        ))
    }
}

/// Parse the `KEY=VALUE` lines of a sysfs `uevent` file.
pub fn parse_uevent_file(content: &str) -> BTreeMap<String, String> {
    content
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Name of the udev database file for a device.
///
/// `c<maj>:<min>` / `b<maj>:<min>` for device nodes, `n<ifindex>` for network
/// interfaces, `+<subsystem>:<sysname>` otherwise.
pub fn udev_db_id(
    properties: &BTreeMap<String, String>,
    subsystem: Option<&str>,
    sysname: &str,
) -> Option<String> {
    if let (Some(major), Some(minor)) = (properties.get("MAJOR"), properties.get("MINOR")) {
        if major != "0" {
            let kind = if subsystem == Some("block") { 'b' } else { 'c' };
            return Some(format!("{kind}{major}:{minor}"));
        }
    }
    if subsystem == Some("net") {
        if let Some(ifindex) = properties.get("IFINDEX") {
            return Some(format!("n{ifindex}"));
        }
    }
    subsystem.map(|s| format!("+{s}:{sysname}"))
}

/// Microseconds on `CLOCK_MONOTONIC`, the clock udev stamps `I:` lines with.
#[cfg(target_os = "linux")]
pub fn monotonic_usec() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid, writable timespec.
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    if rc != 0 {
        return 0;
    }
    (ts.tv_sec as u64) * 1_000_000 + (ts.tv_nsec as u64) / 1_000
}

#[cfg(not(target_os = "linux"))]
pub fn monotonic_usec() -> u64 {
    0
}
