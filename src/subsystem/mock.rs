// src/subsystem/mock.rs

//! In-memory device subsystem.
//!
//! Devices live in a tree keyed by devpath. `plug`/`unplug` change the tree
//! and push raw events to every live monitor; `insert`/`remove_silently`
//! change it without events (devices that were present before watching
//! started, or that vanished while nobody was listening).

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::Notify;

use crate::device::DeviceRecord;
use crate::errors::{DevwatchError, Result};
use crate::subsystem::{
    Action, DeviceMonitor, DeviceSubsystem, EnumerateQuery, MonitorQuery, RawEvent,
};

#[derive(Debug)]
struct MockNode {
    record: DeviceRecord,
    parent: Option<String>,
    children: Vec<String>,
}

#[derive(Debug)]
enum Queued {
    Event(RawEvent),
    Overflow,
}

#[derive(Debug)]
struct MonitorChannel {
    query: MonitorQuery,
    queue: Mutex<VecDeque<Queued>>,
    notify: Notify,
}

impl MonitorChannel {
    fn push(&self, item: Queued) {
        self.queue.lock().unwrap().push_back(item);
        self.notify.notify_one();
    }
}

#[derive(Debug, Default)]
struct MockState {
    devices: HashMap<String, MockNode>,
    /// Insertion order, used as enumeration order.
    order: Vec<String>,
    unreadable: HashSet<String>,
    unlistable: HashSet<String>,
    monitor_unavailable: bool,
    enumerate_fails: bool,
    monitors: Vec<Weak<MonitorChannel>>,
    next_seqnum: u64,
}

impl MockState {
    fn live_monitors(&mut self) -> Vec<Arc<MonitorChannel>> {
        self.monitors.retain(|m| m.strong_count() > 0);
        self.monitors.iter().filter_map(Weak::upgrade).collect()
    }

    fn broadcast(&mut self, action: Action, mut record: DeviceRecord) {
        self.next_seqnum += 1;
        record.seqnum = self.next_seqnum;
        for monitor in self.live_monitors() {
            if monitor.query.matches(action, &record) {
                monitor.push(Queued::Event(RawEvent {
                    action,
                    record: record.clone(),
                }));
            }
        }
    }

    fn insert(&mut self, parent: Option<&str>, record: DeviceRecord) {
        let devpath = record.devpath.clone();
        if let Some(parent) = parent {
            if let Some(node) = self.devices.get_mut(parent) {
                node.children.push(devpath.clone());
            }
        }
        if !self.devices.contains_key(&devpath) {
            self.order.push(devpath.clone());
        }
        self.devices.insert(
            devpath,
            MockNode {
                record,
                parent: parent.map(str::to_string),
                children: Vec::new(),
            },
        );
    }

    /// Remove `devpath` and its subtree, returning removed records
    /// children-first.
    fn remove(&mut self, devpath: &str) -> Vec<DeviceRecord> {
        let Some(node) = self.devices.remove(devpath) else {
            return Vec::new();
        };
        self.order.retain(|p| p != devpath);
        if let Some(parent) = node.parent.as_deref() {
            if let Some(p) = self.devices.get_mut(parent) {
                p.children.retain(|c| c != devpath);
            }
        }

        let mut removed = Vec::new();
        for child in &node.children {
            removed.extend(self.remove(child));
        }
        removed.push(node.record);
        removed
    }
}

/// Shared handle to an in-memory device tree.
#[derive(Debug, Clone, Default)]
pub struct MockSubsystem {
    state: Arc<Mutex<MockState>>,
}

impl MockSubsystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device without emitting an event.
    pub fn insert(&self, parent: Option<&str>, record: DeviceRecord) {
        self.state.lock().unwrap().insert(parent, record);
    }

    /// Add a device and emit an `add` event.
    pub fn plug(&self, parent: Option<&str>, record: DeviceRecord) {
        let mut state = self.state.lock().unwrap();
        state.insert(parent, record.clone());
        state.broadcast(Action::Add, record);
    }

    /// Remove a device and its subtree, emitting `remove` events bottom-up.
    pub fn unplug(&self, devpath: &str) {
        let mut state = self.state.lock().unwrap();
        for record in state.remove(devpath) {
            state.broadcast(Action::Remove, record);
        }
    }

    /// Remove a device and its subtree without emitting events.
    pub fn remove_silently(&self, devpath: &str) {
        self.state.lock().unwrap().remove(devpath);
    }

    /// Emit an arbitrary raw event without touching the tree.
    pub fn emit(&self, action: Action, record: DeviceRecord) {
        self.state.lock().unwrap().broadcast(action, record);
    }

    /// Make every live monitor report a lost-events error on its next read.
    pub fn overflow(&self) {
        let mut state = self.state.lock().unwrap();
        for monitor in state.live_monitors() {
            monitor.push(Queued::Overflow);
        }
    }

    /// Make reads of `devpath` fail while it stays in the tree.
    pub fn set_unreadable(&self, devpath: &str, unreadable: bool) {
        let mut state = self.state.lock().unwrap();
        if unreadable {
            state.unreadable.insert(devpath.to_string());
        } else {
            state.unreadable.remove(devpath);
        }
    }

    /// Make listing the children of `devpath` fail.
    pub fn set_unlistable(&self, devpath: &str, unlistable: bool) {
        let mut state = self.state.lock().unwrap();
        if unlistable {
            state.unlistable.insert(devpath.to_string());
        } else {
            state.unlistable.remove(devpath);
        }
    }

    pub fn set_monitor_available(&self, available: bool) {
        self.state.lock().unwrap().monitor_unavailable = !available;
    }

    pub fn set_enumerate_fails(&self, fails: bool) {
        self.state.lock().unwrap().enumerate_fails = fails;
    }

    /// Number of monitors that have not been dropped yet.
    pub fn live_monitor_count(&self) -> usize {
        self.state.lock().unwrap().live_monitors().len()
    }

    fn read(state: &MockState, devpath: &str) -> Result<DeviceRecord> {
        if state.unreadable.contains(devpath) {
            return Err(DevwatchError::IoError(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("cannot read {devpath}"),
            )));
        }
        state
            .devices
            .get(devpath)
            .map(|n| n.record.clone())
            .ok_or_else(|| DevwatchError::DeviceNotFound(devpath.to_string()))
    }
}

impl DeviceSubsystem for MockSubsystem {
    fn enumerate(&self, query: &EnumerateQuery) -> Result<Vec<Result<DeviceRecord>>> {
        let state = self.state.lock().unwrap();
        if state.enumerate_fails {
            return Err(DevwatchError::Subsystem("enumeration failed".to_string()));
        }
        Ok(state
            .order
            .iter()
            .map(|devpath| Self::read(&state, devpath))
            .filter(|res| match res {
                Ok(record) => query.matches(record),
                Err(_) => true,
            })
            .collect())
    }

    fn device(&self, devpath: &str) -> Result<DeviceRecord> {
        Self::read(&self.state.lock().unwrap(), devpath)
    }

    fn parent(&self, devpath: &str) -> Result<Option<String>> {
        let state = self.state.lock().unwrap();
        state
            .devices
            .get(devpath)
            .map(|n| n.parent.clone())
            .ok_or_else(|| DevwatchError::DeviceNotFound(devpath.to_string()))
    }

    fn children(&self, devpath: &str) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        if state.unlistable.contains(devpath) {
            return Err(DevwatchError::IoError(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("cannot list children of {devpath}"),
            )));
        }
        state
            .devices
            .get(devpath)
            .map(|n| n.children.clone())
            .ok_or_else(|| DevwatchError::DeviceNotFound(devpath.to_string()))
    }

    fn monitor(&self, query: &MonitorQuery) -> Result<Box<dyn DeviceMonitor>> {
        let mut state = self.state.lock().unwrap();
        if state.monitor_unavailable {
            return Err(DevwatchError::Subsystem(
                "monitor socket unavailable".to_string(),
            ));
        }
        let channel = Arc::new(MonitorChannel {
            query: query.clone(),
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        });
        state.monitors.push(Arc::downgrade(&channel));
        Ok(Box::new(MockMonitor { channel }))
    }
}

#[derive(Debug)]
pub struct MockMonitor {
    channel: Arc<MonitorChannel>,
}

impl MockMonitor {
    fn has_pending(&self) -> bool {
        !self.channel.queue.lock().unwrap().is_empty()
    }
}

impl DeviceMonitor for MockMonitor {
    fn ready(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            loop {
                let notified = self.channel.notify.notified();
                if self.has_pending() {
                    return Ok(());
                }
                notified.await;
            }
        })
    }

    fn try_next(&mut self) -> Result<Option<RawEvent>> {
        match self.channel.queue.lock().unwrap().pop_front() {
            Some(Queued::Event(event)) => Ok(Some(event)),
            Some(Queued::Overflow) => Err(DevwatchError::IoError(io::Error::other(
                "monitor receive buffer overflow",
            ))),
            None => Ok(None),
        }
    }
}
