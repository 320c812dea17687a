// src/service/manager.rs

use tokio::sync::mpsc;
use tracing::debug;

use crate::device::Description;
use crate::service::opener::DeviceHandle;

/// Stop request from a manager, tagged with the registration it belongs to.
///
/// A signal whose generation no longer matches the registered manager for
/// that devpath is stale and gets ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopSignal {
    pub devpath: String,
    pub generation: u64,
}

/// Lets a manager (or anything acting on its behalf) ask the service to
/// remove it.
#[derive(Debug, Clone)]
pub struct StopHandle {
    signal: StopSignal,
    tx: mpsc::UnboundedSender<StopSignal>,
}

impl StopHandle {
    pub(crate) fn new(
        devpath: String,
        generation: u64,
        tx: mpsc::UnboundedSender<StopSignal>,
    ) -> Self {
        Self {
            signal: StopSignal {
                devpath,
                generation,
            },
            tx,
        }
    }

    /// Request removal. Returns `false` if the service is already gone.
    pub fn stop(&self) -> bool {
        debug!(devpath = %self.signal.devpath, generation = self.signal.generation, "manager stop requested");
        self.tx.send(self.signal.clone()).is_ok()
    }
}

/// Per-device worker owned by the registry.
///
/// Holds the description it was created from and the open device; dropping
/// the manager closes the device.
#[derive(Debug)]
pub struct DeviceManager {
    description: Description,
    device: Box<dyn DeviceHandle>,
    stop: StopHandle,
}

impl DeviceManager {
    pub(crate) fn new(
        description: Description,
        device: Box<dyn DeviceHandle>,
        stop: StopHandle,
    ) -> Self {
        Self {
            description,
            device,
            stop,
        }
    }

    pub fn description(&self) -> &Description {
        &self.description
    }

    pub fn devpath(&self) -> &str {
        self.description.devpath()
    }

    pub fn device(&self) -> &dyn DeviceHandle {
        self.device.as_ref()
    }

    pub fn serial(&self) -> &str {
        self.device.serial()
    }

    pub fn generation(&self) -> u64 {
        self.stop.signal.generation
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }
}
