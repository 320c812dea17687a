// src/watch/filter.rs

//! Device filters.
//!
//! A filter is a capability value handed to the watcher: it may push cheap
//! rules down into the OS enumeration and monitor queries, and it decides
//! the final in-process visibility of each device. New filter behaviour is
//! a new value implementing [`DeviceFilter`], not a new watcher type.

use std::collections::BTreeMap;

use crate::device::{Description, DeviceRecord};
use crate::subsystem::{EnumerateQuery, MonitorQuery};

pub trait DeviceFilter: Send {
    fn setup_enumerator(&self, _query: &mut EnumerateQuery) {}

    fn setup_monitor(&self, _query: &mut MonitorQuery) {}

    fn is_visible(&self, _device: &Description) -> bool {
        true
    }
}

/// Sees every device.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl DeviceFilter for AcceptAll {}

/// Visibility decided by a closure; nothing is pushed down.
pub struct Predicate<P>(pub P);

impl<P> DeviceFilter for Predicate<P>
where
    P: Fn(&Description) -> bool + Send,
{
    fn is_visible(&self, device: &Description) -> bool {
        (self.0)(device)
    }
}

/// Conjunctive match rules.
///
/// A device is visible iff every configured rule holds. An unset (or empty)
/// subsystem/devtype matches anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchRules {
    rules: EnumerateQuery,
}

impl MatchRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subsystem(mut self, subsystem: impl Into<String>) -> Self {
        self.set_subsystem(subsystem);
        self
    }

    pub fn devtype(mut self, devtype: impl Into<String>) -> Self {
        self.set_devtype(devtype);
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_property(key, value);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.add_tag(tag);
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_attribute(key, value);
        self
    }

    pub fn set_subsystem(&mut self, subsystem: impl Into<String>) {
        self.rules.subsystem = non_empty(subsystem.into());
    }

    pub fn set_devtype(&mut self, devtype: impl Into<String>) {
        self.rules.devtype = non_empty(devtype.into());
    }

    pub fn add_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.rules.properties.insert(key.into(), value.into());
    }

    pub fn add_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !self.rules.tags.contains(&tag) {
            self.rules.tags.push(tag);
        }
    }

    pub fn add_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.rules.attributes.insert(key.into(), value.into());
    }

    pub fn subsystem_rule(&self) -> Option<&str> {
        self.rules.subsystem.as_deref()
    }

    pub fn devtype_rule(&self) -> Option<&str> {
        self.rules.devtype.as_deref()
    }

    pub fn property_rules(&self) -> &BTreeMap<String, String> {
        &self.rules.properties
    }

    pub fn tag_rules(&self) -> &[String] {
        &self.rules.tags
    }

    pub fn attribute_rules(&self) -> &BTreeMap<String, String> {
        &self.rules.attributes
    }

    pub fn matches_record(&self, record: &DeviceRecord) -> bool {
        self.rules.matches(record)
    }
}

impl DeviceFilter for MatchRules {
    fn setup_enumerator(&self, query: &mut EnumerateQuery) {
        *query = self.rules.clone();
    }

    fn setup_monitor(&self, query: &mut MonitorQuery) {
        query.subsystem = self.rules.subsystem.clone();
        query.devtype = self.rules.devtype.clone();
        query.tags = self.rules.tags.clone();
    }

    fn is_visible(&self, device: &Description) -> bool {
        self.matches_record(device.record())
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}
