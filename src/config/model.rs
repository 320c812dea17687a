// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::subsystem::sysfs::{DEFAULT_SYS_ROOT, DEFAULT_UDEV_DATA_DIR};
use crate::types::{MonitorSource, NodeKind};
use crate::watch::MatchRules;

/// Configuration exactly as deserialized from TOML, before validation.
///
/// ```toml
/// [service]
/// auto_quit = true
/// monitor_source = "udev"
///
/// [match]
/// subsystem = "hidraw"
/// tags = ["uaccess"]
///
/// [match.properties]
/// ID_INPUT = "1"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub service: ServiceSection,

    #[serde(default)]
    pub backend: BackendSection,

    #[serde(default, rename = "match")]
    pub match_rules: MatchSection,

    #[serde(default)]
    pub device: DeviceSection,
}

/// Validated configuration. Only obtainable through `TryFrom<RawConfigFile>`
/// (or `Default`, which is always valid).
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    service: ServiceSection,
    backend: BackendSection,
    match_rules: MatchSection,
    device: DeviceSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            service: raw.service,
            backend: raw.backend,
            match_rules: raw.match_rules,
            device: raw.device,
        }
    }

    pub fn service(&self) -> &ServiceSection {
        &self.service
    }

    pub fn backend(&self) -> &BackendSection {
        &self.backend
    }

    pub fn device(&self) -> &DeviceSection {
        &self.device
    }

    /// Build the watcher filter described by `[match]`.
    pub fn match_rules(&self) -> MatchRules {
        let section = &self.match_rules;
        let mut rules = MatchRules::new()
            .subsystem(section.subsystem.clone())
            .devtype(section.devtype.clone());
        for (key, value) in &section.properties {
            rules.add_property(key.clone(), value.clone());
        }
        for tag in &section.tags {
            rules.add_tag(tag.clone());
        }
        for (key, value) in &section.attributes {
            rules.add_attribute(key.clone(), value.clone());
        }
        rules
    }
}

/// `[service]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceSection {
    /// Quit once the last tracked device goes away.
    #[serde(default)]
    pub auto_quit: bool,

    /// `"udev"` (default) or `"kernel"`.
    #[serde(default)]
    pub monitor_source: MonitorSource,
}

/// `[backend]` section. Only useful for pointing at a non-standard sysfs
/// mount or udev runtime directory.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendSection {
    #[serde(default = "default_sysfs_root")]
    pub sysfs_root: PathBuf,

    #[serde(default = "default_udev_data_dir")]
    pub udev_data_dir: PathBuf,
}

fn default_sysfs_root() -> PathBuf {
    PathBuf::from(DEFAULT_SYS_ROOT)
}

fn default_udev_data_dir() -> PathBuf {
    PathBuf::from(DEFAULT_UDEV_DATA_DIR)
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            sysfs_root: default_sysfs_root(),
            udev_data_dir: default_udev_data_dir(),
        }
    }
}

/// `[match]` section. Every configured rule must hold for a device to be
/// visible; empty `subsystem` / `devtype` mean "any".
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchSection {
    #[serde(default)]
    pub subsystem: String,

    #[serde(default)]
    pub devtype: String,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub properties: BTreeMap<String, String>,

    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// `[device]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceSection {
    /// `"char"` (default), `"block"` or `"any"`.
    #[serde(default)]
    pub node_kind: NodeKind,
}
