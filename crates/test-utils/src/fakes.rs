use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use devwatch::device::Description;
use devwatch::errors::OpenError;
use devwatch::service::{DeviceHandle, DeviceManager, DeviceOpener, ServiceObserver};

/// What `FakeOpener` does for a given devpath.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    /// Open successfully with this serial.
    Open(String),
    WrongKind,
    Fail(String),
}

/// A scriptable opener.
///
/// - unscripted devpaths open successfully with the sysname as serial
/// - records every open attempt
/// - counts devices that are currently open (dropped handles decrement)
#[derive(Debug, Clone, Default)]
pub struct FakeOpener {
    outcomes: Arc<Mutex<HashMap<String, OpenOutcome>>>,
    attempts: Arc<Mutex<Vec<String>>>,
    live: Arc<AtomicUsize>,
}

impl FakeOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, devpath: &str, outcome: OpenOutcome) {
        self.outcomes
            .lock()
            .unwrap()
            .insert(devpath.to_string(), outcome);
    }

    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }

    /// Number of fake devices not yet dropped.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl DeviceOpener for FakeOpener {
    fn open(&self, description: &Description) -> Result<Box<dyn DeviceHandle>, OpenError> {
        let devpath = description.devpath().to_string();
        self.attempts.lock().unwrap().push(devpath.clone());

        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .get(&devpath)
            .cloned()
            .unwrap_or_else(|| OpenOutcome::Open(description.sysname().to_string()));

        match outcome {
            OpenOutcome::Open(serial) => {
                self.live.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(FakeDevice {
                    name: description.sysname().to_string(),
                    serial,
                    live: Arc::clone(&self.live),
                }))
            }
            OpenOutcome::WrongKind => Err(OpenError::WrongKind(devpath)),
            OpenOutcome::Fail(msg) => Err(OpenError::Other(msg)),
        }
    }
}

#[derive(Debug)]
pub struct FakeDevice {
    name: String,
    serial: String,
    live: Arc<AtomicUsize>,
}

impl DeviceHandle for FakeDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        "fake"
    }

    fn firmware(&self) -> &str {
        "0.0"
    }

    fn serial(&self) -> &str {
        &self.serial
    }
}

impl Drop for FakeDevice {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// One observer callback, keyed by devpath.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observed {
    Added(String),
    Removed(String),
    OpenFailed(String),
}

/// Observer that records every callback into a shared log.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    log: Arc<Mutex<Vec<Observed>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Observed> {
        self.log.lock().unwrap().clone()
    }

    pub fn boxed(&self) -> Box<dyn ServiceObserver> {
        Box::new(self.clone())
    }
}

impl ServiceObserver for RecordingObserver {
    fn manager_added(&mut self, manager: &DeviceManager) {
        self.log
            .lock()
            .unwrap()
            .push(Observed::Added(manager.devpath().to_string()));
    }

    fn manager_removed(&mut self, manager: &DeviceManager) {
        self.log
            .lock()
            .unwrap()
            .push(Observed::Removed(manager.devpath().to_string()));
    }

    fn open_failed(&mut self, description: &Description, _error: &OpenError) {
        self.log
            .lock()
            .unwrap()
            .push(Observed::OpenFailed(description.devpath().to_string()));
    }
}
