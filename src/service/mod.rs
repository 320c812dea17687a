// src/service/mod.rs

//! Device lifecycle service.
//!
//! This module ties together:
//! - the device watcher (added/removed notifications)
//! - a device opener (turns a description into an open device handle)
//! - the registry of live device managers, keyed by devpath
//! - per-manager stop requests and the optional auto-quit policy
//!
//! The pure bookkeeping lives in [`registry`]; the async shell that drives
//! the watcher and reacts to stop requests is [`runtime`].

pub mod manager;
pub mod observer;
pub mod opener;
pub mod registry;
pub mod runtime;

pub use manager::{DeviceManager, StopHandle, StopSignal};
pub use observer::{ConsoleObserver, NullObserver, ServiceObserver};
pub use opener::{DeviceHandle, DeviceOpener, NodeDevice, NodeOpener};
pub use registry::Registry;
pub use runtime::Service;

/// Service behaviour switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceOptions {
    /// Terminate once the last live manager is removed.
    pub auto_quit: bool,
}

/// What the shell should do after a registry step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// The registry just became empty with auto-quit enabled.
    Quit,
}
