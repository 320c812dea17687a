// tests/sysfs_backend.rs

mod common;
use crate::common::init_tracing;

use std::collections::BTreeMap;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use devwatch::device::Description;
use devwatch::errors::DevwatchError;
use devwatch::fs::mock::MockFileSystem;
use devwatch::subsystem::sysfs::{parse_uevent_file, udev_db_id};
use devwatch::subsystem::{DeviceSubsystem, EnumerateQuery, SysfsSubsystem};
use devwatch::types::MonitorSource;

type TestResult = Result<(), Box<dyn Error>>;

const USB: &str = "/devices/pci0000:00/0000:00:14.0/usb1/1-1";
const IFACE: &str = "/devices/pci0000:00/0000:00:14.0/usb1/1-1/1-1:1.0";
const HID: &str = "/devices/pci0000:00/0000:00:14.0/usb1/1-1/1-1:1.0/0003:046D:C33C.0001";
const HIDRAW: &str =
    "/devices/pci0000:00/0000:00:14.0/usb1/1-1/1-1:1.0/0003:046D:C33C.0001/hidraw/hidraw0";

fn sys(devpath: &str) -> String {
    format!("/sys{devpath}")
}

/// A sysfs + udev database view of one USB keyboard.
fn keyboard_sysfs() -> MockFileSystem {
    init_tracing();
    let fs = MockFileSystem::new();

    fs.add_file(
        format!("{}/uevent", sys(USB)),
        "MAJOR=189\nMINOR=1\nDEVNAME=bus/usb/001/002\nDEVTYPE=usb_device\n",
    );
    fs.add_link(format!("{}/subsystem", sys(USB)), "../../../../../bus/usb");
    fs.add_file(format!("{}/idVendor", sys(USB)), "046d\n");
    fs.add_file(format!("{}/idProduct", sys(USB)), "c33c\n");

    fs.add_file(
        format!("{}/uevent", sys(IFACE)),
        "DEVTYPE=usb_interface\nDRIVER=usbhid\n",
    );
    fs.add_link(format!("{}/subsystem", sys(IFACE)), "../../../../../../bus/usb");

    fs.add_file(
        format!("{}/uevent", sys(HID)),
        "HID_ID=0003:0000046D:0000C33C\nHID_NAME=Logitech Keyboard\nHID_UNIQ=abc123\n",
    );
    fs.add_link(format!("{}/subsystem", sys(HID)), "../../../../../../../bus/hid");
    fs.add_link(format!("{}/driver", sys(HID)), "../../../../../../../bus/hid/drivers/hid-generic");

    fs.add_file(
        format!("{}/uevent", sys(HIDRAW)),
        "MAJOR=241\nMINOR=0\nDEVNAME=hidraw0\n",
    );
    fs.add_link(
        format!("{}/subsystem", sys(HIDRAW)),
        "../../../../../../../../../class/hidraw",
    );
    fs.add_file(format!("{}/dev", sys(HIDRAW)), "241:0\n");

    fs.add_link(
        "/sys/class/hidraw/hidraw0",
        format!("../../devices{}", HIDRAW.trim_start_matches("/devices")),
    );
    fs.add_link(
        "/sys/bus/usb/devices/1-1",
        format!("../../../devices{}", USB.trim_start_matches("/devices")),
    );

    fs.add_file(
        "/run/udev/data/c241:0",
        "I:1000\nE:ID_INPUT=1\nE:ID_SERIAL_SHORT=abc123\nG:uaccess\nG:seat\n",
    );
    fs
}

fn backend(fs: MockFileSystem) -> Result<SysfsSubsystem, DevwatchError> {
    SysfsSubsystem::with_filesystem(Arc::new(fs), "/sys", "/run/udev/data", MonitorSource::Udev)
}

#[test]
fn missing_device_tree_is_a_subsystem_error() {
    let err = backend(MockFileSystem::new()).unwrap_err();
    assert!(matches!(err, DevwatchError::Subsystem(_)));
}

#[test]
fn reads_a_record_with_udev_data_merged() -> TestResult {
    let sysfs = backend(keyboard_sysfs())?;
    let record = sysfs.device(HIDRAW)?;

    assert_eq!(record.devpath, HIDRAW);
    assert_eq!(record.syspath, PathBuf::from(sys(HIDRAW)));
    assert_eq!(record.subsystem.as_deref(), Some("hidraw"));
    assert_eq!(record.sysname, "hidraw0");
    assert_eq!(record.sysnum.as_deref(), Some("0"));
    assert_eq!(record.devnode, Some(PathBuf::from("/dev/hidraw0")));
    assert!(record.initialized);
    assert!(record.has_tag("uaccess"));
    assert!(record.has_tag("seat"));
    assert!(record.has_property("ID_INPUT", "1"));
    assert!(record.has_property("DEVNAME", "/dev/hidraw0"));
    assert!(record.has_property("SUBSYSTEM", "hidraw"));
    assert_eq!(record.attributes.get("dev").map(String::as_str), Some("241:0"));
    assert!(!record.attributes.contains_key("uevent"));
    assert!(!record.attributes.contains_key("subsystem"));
    Ok(())
}

#[test]
fn devices_without_udev_data_are_uninitialized() -> TestResult {
    let sysfs = backend(keyboard_sysfs())?;
    let record = sysfs.device(HID)?;

    assert!(!record.initialized);
    assert_eq!(record.subsystem.as_deref(), Some("hid"));
    assert_eq!(record.driver.as_deref(), Some("hid-generic"));
    assert!(record.has_property("HID_NAME", "Logitech Keyboard"));
    assert!(record.devnode.is_none());
    Ok(())
}

#[test]
fn driver_falls_back_to_the_uevent_file() -> TestResult {
    let sysfs = backend(keyboard_sysfs())?;
    let record = sysfs.device(IFACE)?;
    assert_eq!(record.driver.as_deref(), Some("usbhid"));
    assert_eq!(record.devtype.as_deref(), Some("usb_interface"));
    Ok(())
}

#[test]
fn enumerates_by_subsystem_through_class_and_bus_links() -> TestResult {
    let sysfs = backend(keyboard_sysfs())?;

    let query = EnumerateQuery {
        subsystem: Some("hidraw".to_string()),
        ..EnumerateQuery::default()
    };
    let records: Vec<_> = sysfs.enumerate(&query)?.into_iter().collect::<Result<_, _>>()?;
    let paths: Vec<&str> = records.iter().map(|r| r.devpath.as_str()).collect();
    assert_eq!(paths, vec![HIDRAW]);

    let query = EnumerateQuery {
        subsystem: Some("usb".to_string()),
        devtype: Some("usb_device".to_string()),
        ..EnumerateQuery::default()
    };
    let records: Vec<_> = sysfs.enumerate(&query)?.into_iter().collect::<Result<_, _>>()?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].devpath, USB);
    Ok(())
}

#[test]
fn enumerates_everything_by_walking_the_device_tree() -> TestResult {
    let sysfs = backend(keyboard_sysfs())?;

    let all = sysfs.enumerate(&EnumerateQuery::default())?;
    let mut paths: Vec<String> = all
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .map(|r| r.devpath)
        .collect();
    paths.sort();
    assert_eq!(paths, vec![USB, IFACE, HID, HIDRAW]);

    let mut tagged = EnumerateQuery::default();
    tagged.tags.push("uaccess".to_string());
    assert_eq!(sysfs.enumerate(&tagged)?.len(), 1);
    Ok(())
}

#[test]
fn topology_skips_non_device_directories() -> TestResult {
    let sysfs = backend(keyboard_sysfs())?;

    assert_eq!(sysfs.parent(HIDRAW)?.as_deref(), Some(HID));
    assert_eq!(sysfs.parent(HID)?.as_deref(), Some(IFACE));
    assert_eq!(sysfs.parent(USB)?, None);
    assert_eq!(sysfs.children(HID)?, vec![HIDRAW.to_string()]);
    assert_eq!(sysfs.children(USB)?, vec![IFACE.to_string()]);
    Ok(())
}

#[test]
fn descriptions_navigate_the_sysfs_tree() -> TestResult {
    let source: Arc<dyn DeviceSubsystem> = Arc::new(backend(keyboard_sysfs())?);
    let hidraw = Description::from_devpath(Arc::clone(&source), HIDRAW)?;

    let usb = hidraw.parent_with_type("usb", "usb_device")?;
    assert_eq!(usb.devpath(), USB);
    assert_eq!(usb.attribute("idVendor"), Some("046d"));

    let found = usb.descendants_with_type("hidraw")?;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].devpath(), HIDRAW);
    Ok(())
}

#[test]
fn uevent_files_and_db_ids() {
    let props = parse_uevent_file("MAJOR=241\nMINOR=0\nDEVNAME=hidraw0\nbogus line\n");
    assert_eq!(props.len(), 3);
    assert_eq!(props.get("DEVNAME").map(String::as_str), Some("hidraw0"));

    assert_eq!(
        udev_db_id(&props, Some("hidraw"), "hidraw0").as_deref(),
        Some("c241:0")
    );
    assert_eq!(
        udev_db_id(&props, Some("block"), "sda").as_deref(),
        Some("b241:0")
    );

    let mut net = BTreeMap::new();
    net.insert("IFINDEX".to_string(), "3".to_string());
    assert_eq!(udev_db_id(&net, Some("net"), "eth0").as_deref(), Some("n3"));

    let empty = BTreeMap::new();
    assert_eq!(
        udev_db_id(&empty, Some("hid"), "0003:046D:C33C.0001").as_deref(),
        Some("+hid:0003:046D:C33C.0001")
    );
    assert_eq!(udev_db_id(&empty, None, "x"), None);
}
