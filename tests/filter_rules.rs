// tests/filter_rules.rs

mod common;
use crate::common::builders::RecordBuilder;
use crate::common::{hidraw, init_tracing, mock_watcher};

use devwatch::subsystem::{Action, EnumerateQuery, MonitorQuery};
use devwatch::watch::{DeviceFilter, MatchRules, Predicate, WatchEvent};

fn keyboard_rules() -> MatchRules {
    MatchRules::new()
        .subsystem("usb")
        .tag("keyboard")
        .property("ID_INPUT", "1")
}

#[test]
fn all_rules_must_hold() {
    init_tracing();
    let (mock, mut watcher) = mock_watcher(keyboard_rules());

    let matching = RecordBuilder::new("/devices/usb1/1-1")
        .subsystem("usb")
        .tag("keyboard")
        .property("ID_INPUT", "1")
        .build();
    let no_tag = RecordBuilder::new("/devices/usb1/1-2")
        .subsystem("usb")
        .property("ID_INPUT", "1")
        .build();
    let wrong_property = RecordBuilder::new("/devices/usb1/1-3")
        .subsystem("usb")
        .tag("keyboard")
        .property("ID_INPUT", "0")
        .build();
    let wrong_subsystem = RecordBuilder::new("/devices/usb1/1-4")
        .subsystem("hidraw")
        .tag("keyboard")
        .property("ID_INPUT", "1")
        .build();

    for record in [matching, no_tag, wrong_property, wrong_subsystem] {
        mock.insert(None, record);
    }

    let events = watcher.scan();
    let paths: Vec<&str> = events.iter().map(WatchEvent::devpath).collect();
    assert_eq!(paths, vec!["/devices/usb1/1-1"]);
}

#[test]
fn empty_subsystem_and_devtype_match_anything() {
    let rules = MatchRules::new().subsystem("").devtype("");
    assert_eq!(rules.subsystem_rule(), None);
    assert_eq!(rules.devtype_rule(), None);
    assert!(rules.matches_record(&hidraw(1)));
}

#[test]
fn devtype_rule_requires_a_devtype() {
    let rules = MatchRules::new().devtype("usb_device");
    let device = RecordBuilder::new("/devices/usb1/1-1")
        .subsystem("usb")
        .devtype("usb_device")
        .build();
    let interface = RecordBuilder::new("/devices/usb1/1-1/1-1:1.0")
        .subsystem("usb")
        .devtype("usb_interface")
        .build();

    assert!(rules.matches_record(&device));
    assert!(!rules.matches_record(&interface));
    assert!(!rules.matches_record(&hidraw(1)));
}

#[test]
fn attribute_rules_compare_exact_values() {
    let rules = MatchRules::new().attribute("idVendor", "046d");
    let logitech = RecordBuilder::new("/devices/usb1/1-1")
        .attribute("idVendor", "046d")
        .build();
    let other = RecordBuilder::new("/devices/usb1/1-2")
        .attribute("idVendor", "1050")
        .build();

    assert!(rules.matches_record(&logitech));
    assert!(!rules.matches_record(&other));
}

#[test]
fn tags_are_deduplicated() {
    let rules = MatchRules::new().tag("uaccess").tag("uaccess").tag("seat");
    assert_eq!(rules.tag_rules(), ["uaccess".to_string(), "seat".to_string()]);
}

#[test]
fn rules_are_pushed_down_to_enumeration_and_monitor() {
    let rules = keyboard_rules().attribute("idVendor", "046d");

    let mut enumerate = EnumerateQuery::default();
    rules.setup_enumerator(&mut enumerate);
    assert_eq!(enumerate.subsystem.as_deref(), Some("usb"));
    assert_eq!(enumerate.tags, vec!["keyboard".to_string()]);
    assert_eq!(enumerate.properties.get("ID_INPUT").map(String::as_str), Some("1"));
    assert_eq!(enumerate.attributes.len(), 1);

    let mut monitor = MonitorQuery::default();
    rules.setup_monitor(&mut monitor);
    assert_eq!(monitor.subsystem.as_deref(), Some("usb"));
    assert_eq!(monitor.tags, vec!["keyboard".to_string()]);
}

#[test]
fn monitor_query_lets_removals_through_without_tags() {
    let query = MonitorQuery {
        subsystem: Some("usb".to_string()),
        devtype: None,
        tags: vec!["keyboard".to_string()],
    };
    let untagged = RecordBuilder::new("/devices/usb1/1-1").subsystem("usb").build();

    assert!(!query.matches(Action::Add, &untagged));
    assert!(query.matches(Action::Remove, &untagged));
    assert!(!query.matches(Action::Remove, &hidraw(1)));
}

#[test]
fn predicate_filters_decide_visibility_in_process() {
    init_tracing();
    let only_first = Predicate(|d: &devwatch::device::Description| d.sysname() == "hidraw1");
    let (mock, mut watcher) = mock_watcher(only_first);
    mock.insert(None, hidraw(1));
    mock.insert(None, hidraw(2));

    let events = watcher.scan();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].devpath(), hidraw(1).devpath);
}
