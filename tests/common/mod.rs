#![allow(dead_code)]

pub mod frames;

pub use devwatch_test_utils::builders;
pub use devwatch_test_utils::fakes;
pub use devwatch_test_utils::{init_tracing, mock_watcher, with_timeout};

use devwatch::device::DeviceRecord;
use devwatch_test_utils::builders::RecordBuilder;

/// `/devices/usb1/1-<n>/hidraw/hidraw<n>` with a `/dev/hidraw<n>` node.
pub fn hidraw(n: u32) -> DeviceRecord {
    RecordBuilder::new(&format!("/devices/usb1/1-{n}/hidraw/hidraw{n}"))
        .subsystem("hidraw")
        .devnode(&format!("/dev/hidraw{n}"))
        .build()
}

/// `/devices/usb1/1-<n>/input/input<n>` with no device node.
pub fn input(n: u32) -> DeviceRecord {
    RecordBuilder::new(&format!("/devices/usb1/1-{n}/input/input{n}"))
        .subsystem("input")
        .build()
}
