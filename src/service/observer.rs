// src/service/observer.rs

use crate::device::Description;
use crate::errors::OpenError;
use crate::service::manager::DeviceManager;

/// Hooks called by the registry as managers come and go.
pub trait ServiceObserver: Send {
    fn manager_added(&mut self, _manager: &DeviceManager) {}

    fn manager_removed(&mut self, _manager: &DeviceManager) {}

    /// Only called for failures other than [`OpenError::WrongKind`].
    fn open_failed(&mut self, _description: &Description, _error: &OpenError) {}
}

#[derive(Debug, Default)]
pub struct NullObserver;

impl ServiceObserver for NullObserver {}

/// Prints device arrivals and departures to stdout, failures to stderr.
#[derive(Debug, Default)]
pub struct ConsoleObserver;

impl ServiceObserver for ConsoleObserver {
    fn manager_added(&mut self, manager: &DeviceManager) {
        let device = manager.device();
        let node = manager
            .description()
            .devnode()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| manager.devpath().to_string());
        println!(
            "Opened device {node}: serial {}, model {}, firmware {}, {}",
            device.serial(),
            device.model(),
            device.firmware(),
            device.name()
        );
    }

    fn manager_removed(&mut self, manager: &DeviceManager) {
        println!("Removing device {}", manager.serial());
    }

    fn open_failed(&mut self, description: &Description, error: &OpenError) {
        eprintln!("Failed to open device {}: {error}", description.devpath());
    }
}
