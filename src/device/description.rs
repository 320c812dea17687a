// src/device/description.rs

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::device::record::DeviceRecord;
use crate::errors::{DevwatchError, Result};
use crate::subsystem::DeviceSubsystem;

/// Immutable snapshot of one device.
///
/// Everything is materialised at construction time, so accessors never
/// touch the OS. Topology lookups go back to the subsystem the snapshot came
/// from and return fresh snapshots.
#[derive(Clone)]
pub struct Description {
    record: DeviceRecord,
    source: Arc<dyn DeviceSubsystem>,
}

impl fmt::Debug for Description {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Description")
            .field("devpath", &self.record.devpath)
            .field("subsystem", &self.record.subsystem)
            .field("devnode", &self.record.devnode)
            .finish_non_exhaustive()
    }
}

impl Description {
    pub fn new(record: DeviceRecord, source: Arc<dyn DeviceSubsystem>) -> Self {
        Self { record, source }
    }

    /// Read the device at `devpath` from `source`.
    pub fn from_devpath(source: Arc<dyn DeviceSubsystem>, devpath: &str) -> Result<Self> {
        let record = source.device(devpath)?;
        Ok(Self::new(record, source))
    }

    /// Query the subsystem again for the same device.
    pub fn refresh(&self) -> Result<Self> {
        Self::from_devpath(Arc::clone(&self.source), &self.record.devpath)
    }

    pub fn parent(&self) -> Result<Description> {
        match self.source.parent(&self.record.devpath)? {
            Some(devpath) => Self::from_devpath(Arc::clone(&self.source), &devpath),
            None => Err(DevwatchError::NoParent(self.record.devpath.clone())),
        }
    }

    /// Nearest ancestor with the given subsystem and device type.
    ///
    /// An empty `devtype` matches any type.
    pub fn parent_with_type(&self, subsystem: &str, devtype: &str) -> Result<Description> {
        let mut current = self.record.devpath.clone();
        while let Some(parent) = self.source.parent(&current)? {
            let record = self.source.device(&parent)?;
            let subsystem_ok = record.subsystem.as_deref() == Some(subsystem);
            let devtype_ok = devtype.is_empty() || record.devtype.as_deref() == Some(devtype);
            if subsystem_ok && devtype_ok {
                return Ok(Self::new(record, Arc::clone(&self.source)));
            }
            current = parent;
        }
        Err(DevwatchError::NoMatchingAncestor {
            devpath: self.record.devpath.clone(),
            subsystem: subsystem.to_string(),
            devtype: devtype.to_string(),
        })
    }

    /// All transitive descendants with the given subsystem, depth-first.
    pub fn descendants_with_type(&self, subsystem: &str) -> Result<Vec<Description>> {
        let mut found = Vec::new();
        let mut stack: Vec<String> = self.source.children(&self.record.devpath)?;
        stack.reverse();

        while let Some(devpath) = stack.pop() {
            match self.source.device(&devpath) {
                Ok(record) => {
                    if record.subsystem.as_deref() == Some(subsystem) {
                        found.push(Self::new(record, Arc::clone(&self.source)));
                    }
                }
                Err(err) => {
                    debug!(devpath = %devpath, error = %err, "skipping unreadable descendant");
                }
            }
            match self.source.children(&devpath) {
                Ok(mut children) => {
                    children.reverse();
                    stack.extend(children);
                }
                Err(err) => {
                    debug!(devpath = %devpath, error = %err, "cannot list descendant's children");
                }
            }
        }

        Ok(found)
    }

    pub fn devpath(&self) -> &str {
        &self.record.devpath
    }

    pub fn syspath(&self) -> &Path {
        &self.record.syspath
    }

    pub fn subsystem(&self) -> Option<&str> {
        self.record.subsystem.as_deref()
    }

    pub fn devtype(&self) -> Option<&str> {
        self.record.devtype.as_deref()
    }

    pub fn sysname(&self) -> &str {
        &self.record.sysname
    }

    pub fn sysnum(&self) -> Option<&str> {
        self.record.sysnum.as_deref()
    }

    pub fn devnode(&self) -> Option<&Path> {
        self.record.devnode.as_deref()
    }

    pub fn driver(&self) -> Option<&str> {
        self.record.driver.as_deref()
    }

    pub fn is_initialized(&self) -> bool {
        self.record.initialized
    }

    pub fn seqnum(&self) -> u64 {
        self.record.seqnum
    }

    pub fn usec_since_initialized(&self) -> u64 {
        self.record.usec_since_initialized
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.record.properties
    }

    pub fn tags(&self) -> &[String] {
        &self.record.tags
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.record.attributes
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.record.properties.get(key).map(String::as_str)
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.record.attributes.get(key).map(String::as_str)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.record.has_tag(tag)
    }

    pub fn record(&self) -> &DeviceRecord {
        &self.record
    }
}
