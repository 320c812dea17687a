// src/watch/watcher.rs

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::device::Description;
use crate::errors::{DevwatchError, Result};
use crate::subsystem::{
    Action, DeviceMonitor, DeviceSubsystem, EnumerateQuery, MonitorQuery, RawEvent,
    SysfsSubsystem,
};
use crate::types::MonitorSource;
use crate::watch::filter::DeviceFilter;

/// Notification produced by the watcher.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    Added(Description),
    Removed(Description),
}

impl WatchEvent {
    pub fn description(&self) -> &Description {
        match self {
            WatchEvent::Added(d) | WatchEvent::Removed(d) => d,
        }
    }

    pub fn devpath(&self) -> &str {
        self.description().devpath()
    }
}

/// Device enumerator and monitor.
///
/// Scanning is incremental: the first scan reports every visible device as
/// added, later scans report the difference against what was already
/// reported. While active, a live monitor feeds the same known-device map.
///
/// Deactivating or dropping the watcher never reports removals.
pub struct DeviceWatcher<F: DeviceFilter> {
    subsystem: Arc<dyn DeviceSubsystem>,
    filter: F,
    monitor: Option<Box<dyn DeviceMonitor>>,
    known: HashMap<String, Description>,
}

impl<F: DeviceFilter> fmt::Debug for DeviceWatcher<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceWatcher")
            .field("active", &self.is_active())
            .field("known", &self.known.len())
            .finish_non_exhaustive()
    }
}

impl<F: DeviceFilter> DeviceWatcher<F> {
    /// Watch the live system through sysfs.
    pub fn new(filter: F, monitor_source: MonitorSource) -> Result<Self> {
        let subsystem = SysfsSubsystem::open(monitor_source)?;
        Ok(Self::with_subsystem(Arc::new(subsystem), filter))
    }

    pub fn with_subsystem(subsystem: Arc<dyn DeviceSubsystem>, filter: F) -> Self {
        Self {
            subsystem,
            filter,
            monitor: None,
            known: HashMap::new(),
        }
    }

    pub fn subsystem(&self) -> &Arc<dyn DeviceSubsystem> {
        &self.subsystem
    }

    pub fn filter(&self) -> &F {
        &self.filter
    }

    /// Filter rules can only change while the watcher is inactive.
    pub fn filter_mut(&mut self) -> Option<&mut F> {
        if self.is_active() {
            None
        } else {
            Some(&mut self.filter)
        }
    }

    pub fn is_active(&self) -> bool {
        self.monitor.is_some()
    }

    pub fn is_known(&self, devpath: &str) -> bool {
        self.known.contains_key(devpath)
    }

    pub fn known(&self) -> impl Iterator<Item = &Description> {
        self.known.values()
    }

    pub fn known_count(&self) -> usize {
        self.known.len()
    }

    /// Enumerate present devices and diff them against the known set.
    ///
    /// Removals are reported first, then additions in enumeration order.
    /// Devices present in both are left alone even if their data changed.
    pub fn scan(&mut self) -> Vec<WatchEvent> {
        let mut query = EnumerateQuery::default();
        self.filter.setup_enumerator(&mut query);

        let records = match self.subsystem.enumerate(&query) {
            Ok(records) => records,
            Err(err) => {
                warn!(error = %err, "device enumeration failed; keeping previous state");
                return Vec::new();
            }
        };

        let mut present = Vec::new();
        let mut present_paths = HashSet::new();
        for record in records {
            match record {
                Ok(record) => {
                    let description = Description::new(record, Arc::clone(&self.subsystem));
                    if self.filter.is_visible(&description)
                        && present_paths.insert(description.devpath().to_string())
                    {
                        present.push(description);
                    }
                }
                Err(err) => warn!(error = %err, "skipping unreadable device record"),
            }
        }

        let mut gone: Vec<String> = self
            .known
            .keys()
            .filter(|devpath| !present_paths.contains(*devpath))
            .cloned()
            .collect();
        gone.sort();

        let mut events = Vec::new();
        for devpath in gone {
            if let Some(description) = self.known.remove(&devpath) {
                debug!(devpath = %devpath, "device gone since last scan");
                events.push(WatchEvent::Removed(description));
            }
        }
        for description in present {
            if !self.known.contains_key(description.devpath()) {
                debug!(devpath = %description.devpath(), "new device found by scan");
                self.known
                    .insert(description.devpath().to_string(), description.clone());
                events.push(WatchEvent::Added(description));
            }
        }

        debug!(
            known = self.known.len(),
            changes = events.len(),
            "scan complete"
        );
        events
    }

    /// Switch between live monitoring and scan-only mode.
    ///
    /// Activation opens the monitor and returns the events of a baseline
    /// scan. Deactivation releases the monitor; the known set is kept and
    /// nothing is reported.
    pub fn set_active(&mut self, active: bool) -> Result<Vec<WatchEvent>> {
        if active == self.is_active() {
            return Ok(Vec::new());
        }

        if !active {
            self.monitor = None;
            info!("device watcher inactive");
            return Ok(Vec::new());
        }

        let mut query = MonitorQuery::default();
        self.filter.setup_monitor(&mut query);
        let monitor = self.subsystem.monitor(&query).map_err(|err| match err {
            DevwatchError::Subsystem(_) => err,
            other => DevwatchError::Subsystem(other.to_string()),
        })?;
        self.monitor = Some(monitor);
        info!("device watcher active");

        Ok(self.scan())
    }

    /// Resolves when the monitor has events to drain. Never resolves while
    /// the watcher is inactive.
    pub async fn ready(&mut self) -> Result<()> {
        match self.monitor.as_mut() {
            Some(monitor) => monitor.ready().await,
            None => std::future::pending().await,
        }
    }

    /// Drain every pending monitor event.
    ///
    /// A read error (typically lost events after a receive-buffer overflow)
    /// ends the drain and triggers a reconciling scan.
    pub fn process_ready(&mut self) -> Vec<WatchEvent> {
        let mut events = Vec::new();
        let mut resync = false;

        while let Some(monitor) = self.monitor.as_mut() {
            match monitor.try_next() {
                Ok(Some(raw)) => {
                    if let Some(event) = self.handle_raw(raw) {
                        events.push(event);
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "device monitor read failed; rescanning");
                    resync = true;
                    break;
                }
            }
        }

        if resync {
            events.extend(self.scan());
        }
        events
    }

    fn handle_raw(&mut self, raw: RawEvent) -> Option<WatchEvent> {
        let devpath = raw.record.devpath.clone();
        match raw.action {
            Action::Add => {
                if self.known.contains_key(&devpath) {
                    debug!(devpath = %devpath, "add event for known device ignored");
                    return None;
                }
                let record = match self.subsystem.device(&devpath) {
                    Ok(mut fresh) => {
                        fresh.seqnum = raw.record.seqnum;
                        fresh
                    }
                    Err(err) => {
                        debug!(devpath = %devpath, error = %err, "using event payload for new device");
                        raw.record
                    }
                };
                let description = Description::new(record, Arc::clone(&self.subsystem));
                if !self.filter.is_visible(&description) {
                    trace!(devpath = %devpath, "added device not visible");
                    return None;
                }
                debug!(devpath = %devpath, "device added");
                self.known.insert(devpath, description.clone());
                Some(WatchEvent::Added(description))
            }
            Action::Remove => {
                let description = self.known.remove(&devpath)?;
                debug!(devpath = %devpath, "device removed");
                Some(WatchEvent::Removed(description))
            }
            other => {
                trace!(devpath = %devpath, action = ?other, "ignoring device event");
                None
            }
        }
    }
}
