// src/service/opener.rs

//! Turning descriptions into open devices.

use std::fmt::Debug;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileTypeExt;
use std::path::PathBuf;

use tracing::debug;

use crate::device::Description;
use crate::errors::OpenError;
use crate::types::NodeKind;

/// Opens the resource behind a device description.
///
/// Returning [`OpenError::WrongKind`] means "not mine": the service drops
/// the device silently. Any other error is reported.
pub trait DeviceOpener: Send {
    fn open(&self, description: &Description) -> Result<Box<dyn DeviceHandle>, OpenError>;
}

/// An open device, as seen by the service.
pub trait DeviceHandle: Send + Debug {
    fn name(&self) -> &str;
    fn model(&self) -> &str;
    fn firmware(&self) -> &str;
    fn serial(&self) -> &str;
}

/// Opens the device node read-only and checks its file type.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeOpener {
    kind: NodeKind,
}

impl NodeOpener {
    pub fn new(kind: NodeKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }
}

impl DeviceOpener for NodeOpener {
    fn open(&self, description: &Description) -> Result<Box<dyn DeviceHandle>, OpenError> {
        let Some(node) = description.devnode() else {
            return Err(OpenError::WrongKind(format!(
                "{} has no device node",
                description.devpath()
            )));
        };

        let io_err = |source| OpenError::Io {
            path: node.to_path_buf(),
            source,
        };
        let file = OpenOptions::new().read(true).open(node).map_err(io_err)?;
        let file_type = file.metadata().map_err(io_err)?.file_type();

        let kind_ok = match self.kind {
            NodeKind::Char => file_type.is_char_device(),
            NodeKind::Block => file_type.is_block_device(),
            NodeKind::Any => true,
        };
        if !kind_ok {
            return Err(OpenError::WrongKind(format!(
                "{} is not a {:?} device node",
                node.display(),
                self.kind
            )));
        }

        debug!(node = %node.display(), "device node opened");
        Ok(Box::new(NodeDevice::new(file, node.to_path_buf(), description)))
    }
}

/// An open device node with identifiers collected from udev properties of
/// the device and its ancestors.
#[derive(Debug)]
pub struct NodeDevice {
    _file: File,
    node: PathBuf,
    name: String,
    model: String,
    firmware: String,
    serial: String,
}

const UNKNOWN: &str = "unknown";

impl NodeDevice {
    fn new(file: File, node: PathBuf, description: &Description) -> Self {
        let lineage = lineage(description);
        let lookup = |keys: &[&str]| -> Option<String> {
            lineage.iter().find_map(|d| {
                keys.iter()
                    .filter_map(|k| d.property(k))
                    .find(|v| !v.is_empty())
                    .map(str::to_string)
            })
        };

        let name = lookup(&["HID_NAME", "ID_MODEL_FROM_DATABASE", "ID_MODEL", "NAME"])
            .map(|n| n.trim_matches('"').to_string())
            .unwrap_or_else(|| description.sysname().to_string());
        let model = lookup(&["ID_MODEL_ID"])
            .or_else(|| lookup(&["HID_ID"]).and_then(|id| hid_product(&id)))
            .unwrap_or_else(|| UNKNOWN.to_string());
        let firmware = lookup(&["ID_REVISION"])
            .or_else(|| {
                lineage
                    .iter()
                    .find_map(|d| d.attribute("bcdDevice").map(str::to_string))
            })
            .unwrap_or_else(|| UNKNOWN.to_string());
        let serial = lookup(&["ID_SERIAL_SHORT", "HID_UNIQ", "ID_SERIAL"])
            .unwrap_or_else(|| UNKNOWN.to_string());

        Self {
            _file: file,
            node,
            name,
            model,
            firmware,
            serial,
        }
    }

}

impl Drop for NodeDevice {
    fn drop(&mut self) {
        debug!(node = %self.node.display(), "device node closed");
    }
}

impl DeviceHandle for NodeDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn firmware(&self) -> &str {
        &self.firmware
    }

    fn serial(&self) -> &str {
        &self.serial
    }
}

/// The device followed by its ancestors, nearest first.
fn lineage(description: &Description) -> Vec<Description> {
    let mut chain = vec![description.clone()];
    while let Some(parent) = chain.last().and_then(|d| d.parent().ok()) {
        chain.push(parent);
    }
    chain
}

/// Product id from a `HID_ID` value like `0003:0000046D:0000C33C`.
fn hid_product(hid_id: &str) -> Option<String> {
    let product = hid_id.split(':').nth(2)?;
    let trimmed = product.trim_start_matches('0');
    Some(if trimmed.is_empty() { "0" } else { trimmed }.to_lowercase())
}
