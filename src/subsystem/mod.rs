// src/subsystem/mod.rs

//! OS device-subsystem abstraction.
//!
//! The discovery engine never talks to sysfs or netlink directly. It goes
//! through [`DeviceSubsystem`] for enumeration, record reads and topology,
//! and through [`DeviceMonitor`] for the live attach/detach stream.
//!
//! - [`sysfs`] is the Linux backend (sysfs + udev database).
//! - [`netlink`] is the uevent socket monitor used by the sysfs backend.
//! - [`uevent`] parses netlink datagrams (kernel and libudev framing).
//! - [`mock`] is an in-memory device tree for tests.

pub mod mock;
#[cfg(target_os = "linux")]
pub mod netlink;
pub mod sysfs;
pub mod uevent;

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;

use crate::device::DeviceRecord;
use crate::errors::Result;

pub use mock::MockSubsystem;
pub use sysfs::SysfsSubsystem;

/// Connection to the OS device subsystem.
pub trait DeviceSubsystem: Send + Sync + Debug {
    /// Enumerate currently present devices matching `query`.
    ///
    /// The outer `Result` fails only when the enumeration itself cannot run.
    /// Individual records that could not be read come back as `Err` entries
    /// so callers can skip them and carry on.
    fn enumerate(&self, query: &EnumerateQuery) -> Result<Vec<Result<DeviceRecord>>>;

    /// Read one device by devpath.
    fn device(&self, devpath: &str) -> Result<DeviceRecord>;

    /// Devpath of the parent device, if any.
    fn parent(&self, devpath: &str) -> Result<Option<String>>;

    /// Devpaths of the direct child devices.
    fn children(&self, devpath: &str) -> Result<Vec<String>>;

    /// Open a live monitor delivering attach/detach events.
    fn monitor(&self, query: &MonitorQuery) -> Result<Box<dyn DeviceMonitor>>;
}

/// Live event stream from the device subsystem.
///
/// `ready` resolves once `try_next` is likely to return an event; `try_next`
/// never blocks and returns `Ok(None)` when nothing is pending.
pub trait DeviceMonitor: Send + Debug {
    fn ready(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    fn try_next(&mut self) -> Result<Option<RawEvent>>;
}

/// Kind of change carried by a raw event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Add,
    Remove,
    Change,
    Move,
    Bind,
    Unbind,
    Other,
}

impl Action {
    pub fn parse(s: &str) -> Self {
        match s {
            "add" => Action::Add,
            "remove" => Action::Remove,
            "change" => Action::Change,
            "move" => Action::Move,
            "bind" => Action::Bind,
            "unbind" => Action::Unbind,
            _ => Action::Other,
        }
    }
}

/// One attach/detach notification as delivered by a monitor.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub action: Action,
    pub record: DeviceRecord,
}

/// Pushdown filter for enumeration. All set fields must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnumerateQuery {
    pub subsystem: Option<String>,
    pub devtype: Option<String>,
    pub properties: BTreeMap<String, String>,
    pub tags: Vec<String>,
    pub attributes: BTreeMap<String, String>,
}

impl EnumerateQuery {
    pub fn matches(&self, record: &DeviceRecord) -> bool {
        field_matches(&self.subsystem, &record.subsystem)
            && field_matches(&self.devtype, &record.devtype)
            && self.properties.iter().all(|(k, v)| record.has_property(k, v))
            && self.tags.iter().all(|t| record.has_tag(t))
            && self.attributes.iter().all(|(k, v)| record.has_attribute(k, v))
    }
}

/// Pushdown filter for monitoring.
///
/// Only what a udev monitor can filter on: subsystem/devtype and tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorQuery {
    pub subsystem: Option<String>,
    pub devtype: Option<String>,
    pub tags: Vec<String>,
}

impl MonitorQuery {
    /// Remove events are let through on subsystem/devtype alone, because the
    /// kernel does not repeat tags when a device goes away.
    pub fn matches(&self, action: Action, record: &DeviceRecord) -> bool {
        let type_ok = field_matches(&self.subsystem, &record.subsystem)
            && field_matches(&self.devtype, &record.devtype);
        type_ok && (action == Action::Remove || self.tags.iter().all(|t| record.has_tag(t)))
    }
}

fn field_matches(rule: &Option<String>, value: &Option<String>) -> bool {
    match rule {
        None => true,
        Some(r) => value.as_deref() == Some(r.as_str()),
    }
}
