// src/service/registry.rs

//! Pure lifecycle bookkeeping.
//!
//! [`Registry`] consumes watcher notifications and stop signals and keeps
//! at most one [`DeviceManager`] per devpath. It performs no async IO and
//! can be driven directly from tests.

use std::collections::HashMap;
use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::device::Description;
use crate::service::manager::{DeviceManager, StopHandle, StopSignal};
use crate::service::observer::ServiceObserver;
use crate::service::opener::DeviceOpener;
use crate::service::{ServiceOptions, Step};
use crate::watch::WatchEvent;

pub struct Registry<O: DeviceOpener> {
    opener: O,
    observer: Box<dyn ServiceObserver>,
    options: ServiceOptions,
    managers: HashMap<String, DeviceManager>,
    stop_tx: mpsc::UnboundedSender<StopSignal>,
    next_generation: u64,
}

impl<O: DeviceOpener> fmt::Debug for Registry<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("options", &self.options)
            .field("managers", &self.managers.len())
            .finish_non_exhaustive()
    }
}

impl<O: DeviceOpener> Registry<O> {
    pub fn new(
        opener: O,
        observer: Box<dyn ServiceObserver>,
        options: ServiceOptions,
        stop_tx: mpsc::UnboundedSender<StopSignal>,
    ) -> Self {
        Self {
            opener,
            observer,
            options,
            managers: HashMap::new(),
            stop_tx,
            next_generation: 1,
        }
    }

    pub fn handle(&mut self, event: WatchEvent) -> Step {
        match event {
            WatchEvent::Added(description) => {
                self.device_added(description);
                Step::Continue
            }
            WatchEvent::Removed(description) => self.device_removed(&description),
        }
    }

    /// Open the device and register a manager for it.
    ///
    /// An already-registered devpath keeps its existing manager.
    pub fn device_added(&mut self, description: Description) {
        let devpath = description.devpath().to_string();
        if self.managers.contains_key(&devpath) {
            debug!(devpath = %devpath, "manager already registered; ignoring add");
            return;
        }

        let device = match self.opener.open(&description) {
            Ok(device) => device,
            Err(err) if err.is_wrong_kind() => {
                debug!(devpath = %devpath, reason = %err, "device not handled");
                return;
            }
            Err(err) => {
                warn!(devpath = %devpath, error = %err, "failed to open device");
                self.observer.open_failed(&description, &err);
                return;
            }
        };

        let generation = self.next_generation;
        self.next_generation += 1;
        let stop = StopHandle::new(devpath.clone(), generation, self.stop_tx.clone());
        let manager = DeviceManager::new(description, device, stop);

        let device = manager.device();
        info!(
            devpath = %devpath,
            serial = %device.serial(),
            model = %device.model(),
            firmware = %device.firmware(),
            name = %device.name(),
            generation,
            "opened device"
        );
        self.observer.manager_added(&manager);
        self.managers.insert(devpath, manager);
    }

    pub fn device_removed(&mut self, description: &Description) -> Step {
        self.remove(description.devpath())
    }

    /// React to a manager's own stop request.
    pub fn manager_stopped(&mut self, signal: &StopSignal) -> Step {
        let current = self.managers.get(&signal.devpath).map(|m| m.generation());
        match current {
            Some(generation) if generation == signal.generation => self.remove(&signal.devpath),
            Some(_) => {
                debug!(devpath = %signal.devpath, generation = signal.generation, "stale stop signal ignored");
                Step::Continue
            }
            None => {
                debug!(devpath = %signal.devpath, "stop signal for unknown manager ignored");
                Step::Continue
            }
        }
    }

    fn remove(&mut self, devpath: &str) -> Step {
        let Some(manager) = self.managers.remove(devpath) else {
            debug!(devpath = %devpath, "no manager to remove");
            return Step::Continue;
        };

        info!(devpath = %devpath, serial = %manager.serial(), "device manager removed");
        self.observer.manager_removed(&manager);
        drop(manager);

        if self.managers.is_empty() && self.options.auto_quit {
            info!("last device gone; auto-quit");
            Step::Quit
        } else {
            Step::Continue
        }
    }

    /// Drop every manager without notifications.
    pub fn clear(&mut self) {
        if !self.managers.is_empty() {
            debug!(count = self.managers.len(), "releasing device managers");
        }
        self.managers.clear();
    }

    pub fn len(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }

    pub fn contains(&self, devpath: &str) -> bool {
        self.managers.contains_key(devpath)
    }

    pub fn manager(&self, devpath: &str) -> Option<&DeviceManager> {
        self.managers.get(devpath)
    }

    pub fn managers(&self) -> impl Iterator<Item = &DeviceManager> {
        self.managers.values()
    }
}
