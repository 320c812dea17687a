#![allow(dead_code)]

use std::path::PathBuf;

use devwatch::config::{ConfigFile, RawConfigFile};
use devwatch::device::record::{sysname_of, sysnum_of};
use devwatch::device::DeviceRecord;
use devwatch::types::{MonitorSource, NodeKind};

/// Builder for `DeviceRecord`s as a backend would report them.
///
/// Typed fields and the matching udev properties are kept in sync.
pub struct RecordBuilder {
    record: DeviceRecord,
}

impl RecordBuilder {
    pub fn new(devpath: &str) -> Self {
        let sysname = sysname_of(devpath).to_string();
        let mut record = DeviceRecord {
            devpath: devpath.to_string(),
            syspath: PathBuf::from(format!("/sys{devpath}")),
            sysnum: sysnum_of(&sysname),
            sysname,
            initialized: true,
            ..DeviceRecord::default()
        };
        record
            .properties
            .insert("DEVPATH".to_string(), devpath.to_string());
        Self { record }
    }

    pub fn subsystem(mut self, subsystem: &str) -> Self {
        self.record.subsystem = Some(subsystem.to_string());
        self.property("SUBSYSTEM", subsystem)
    }

    pub fn devtype(mut self, devtype: &str) -> Self {
        self.record.devtype = Some(devtype.to_string());
        self.property("DEVTYPE", devtype)
    }

    pub fn devnode(mut self, node: &str) -> Self {
        self.record.devnode = Some(PathBuf::from(node));
        self.property("DEVNAME", node)
    }

    pub fn driver(mut self, driver: &str) -> Self {
        self.record.driver = Some(driver.to_string());
        self.property("DRIVER", driver)
    }

    pub fn property(mut self, key: &str, value: &str) -> Self {
        self.record
            .properties
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        if !self.record.has_tag(tag) {
            self.record.tags.push(tag.to_string());
        }
        self
    }

    pub fn attribute(mut self, key: &str, value: &str) -> Self {
        self.record
            .attributes
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn uninitialized(mut self) -> Self {
        self.record.initialized = false;
        self
    }

    pub fn build(self) -> DeviceRecord {
        self.record
    }
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn auto_quit(mut self, on: bool) -> Self {
        self.config.service.auto_quit = on;
        self
    }

    pub fn monitor_source(mut self, source: MonitorSource) -> Self {
        self.config.service.monitor_source = source;
        self
    }

    pub fn subsystem(mut self, subsystem: &str) -> Self {
        self.config.match_rules.subsystem = subsystem.to_string();
        self
    }

    pub fn devtype(mut self, devtype: &str) -> Self {
        self.config.match_rules.devtype = devtype.to_string();
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.config.match_rules.tags.push(tag.to_string());
        self
    }

    pub fn property(mut self, key: &str, value: &str) -> Self {
        self.config
            .match_rules
            .properties
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn node_kind(mut self, kind: NodeKind) -> Self {
        self.config.device.node_kind = kind;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
