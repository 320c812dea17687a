// src/service/runtime.rs

use std::fmt;
use std::future::Future;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::errors::Result;
use crate::service::manager::StopSignal;
use crate::service::observer::ServiceObserver;
use crate::service::opener::DeviceOpener;
use crate::service::registry::Registry;
use crate::service::{ServiceOptions, Step};
use crate::watch::{DeviceFilter, DeviceWatcher, WatchEvent};

/// Async shell around [`Registry`].
///
/// Owns the watcher, feeds its notifications into the registry, and
/// handles manager stop requests. Dropping the service deactivates the
/// watcher and releases every manager without notifications.
pub struct Service<O: DeviceOpener, F: DeviceFilter> {
    watcher: DeviceWatcher<F>,
    registry: Registry<O>,
    stop_rx: mpsc::UnboundedReceiver<StopSignal>,
}

impl<O: DeviceOpener, F: DeviceFilter> fmt::Debug for Service<O, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("watcher", &self.watcher)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl<O: DeviceOpener, F: DeviceFilter> Service<O, F> {
    pub fn new(
        watcher: DeviceWatcher<F>,
        opener: O,
        observer: Box<dyn ServiceObserver>,
        options: ServiceOptions,
    ) -> Self {
        let (stop_tx, stop_rx) = mpsc::unbounded_channel();
        Self {
            watcher,
            registry: Registry::new(opener, observer, options, stop_tx),
            stop_rx,
        }
    }

    /// Activate the watcher and register managers for present devices.
    pub fn init(&mut self) -> Result<Step> {
        self.set_active(true)
    }

    pub fn set_active(&mut self, active: bool) -> Result<Step> {
        let events = self.watcher.set_active(active)?;
        Ok(self.dispatch(events))
    }

    pub fn is_active(&self) -> bool {
        self.watcher.is_active()
    }

    /// Rescan and apply the difference.
    pub fn rescan(&mut self) -> Step {
        let events = self.watcher.scan();
        self.dispatch(events)
    }

    pub fn watcher(&self) -> &DeviceWatcher<F> {
        &self.watcher
    }

    pub fn registry(&self) -> &Registry<O> {
        &self.registry
    }

    /// Main event loop.
    ///
    /// Returns when `shutdown` resolves, when auto-quit fires, or with an
    /// error if the monitor fails.
    pub async fn run<S>(&mut self, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        info!("devwatch service started");
        tokio::pin!(shutdown);

        loop {
            let step = tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested; stopping service");
                    return Ok(());
                }
                ready = self.watcher.ready() => {
                    ready?;
                    let events = self.watcher.process_ready();
                    self.dispatch(events)
                }
                Some(signal) = self.stop_rx.recv() => {
                    self.registry.manager_stopped(&signal)
                }
            };

            if step == Step::Quit {
                info!("service finished");
                return Ok(());
            }
        }
    }

    /// Apply a batch in order. Quit is reported once for the batch.
    fn dispatch(&mut self, events: Vec<WatchEvent>) -> Step {
        let mut step = Step::Continue;
        for event in events {
            debug!(devpath = %event.devpath(), added = matches!(event, WatchEvent::Added(_)), "dispatching");
            if self.registry.handle(event) == Step::Quit {
                step = Step::Quit;
            }
        }
        step
    }
}

impl<O: DeviceOpener, F: DeviceFilter> Drop for Service<O, F> {
    fn drop(&mut self) {
        let _ = self.watcher.set_active(false);
        self.registry.clear();
    }
}
