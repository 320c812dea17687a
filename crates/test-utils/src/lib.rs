pub mod builders;
pub mod fakes;

use std::sync::Arc;
use std::sync::Once;

use devwatch::subsystem::{DeviceSubsystem, MockSubsystem};
use devwatch::watch::{DeviceFilter, DeviceWatcher};
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `DEVWATCH_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_env("DEVWATCH_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// A watcher over a fresh mock device tree. The returned handle shares
/// state with the watcher's subsystem.
pub fn mock_watcher<F: DeviceFilter>(filter: F) -> (MockSubsystem, DeviceWatcher<F>) {
    let mock = MockSubsystem::new();
    let subsystem: Arc<dyn DeviceSubsystem> = Arc::new(mock.clone());
    (mock, DeviceWatcher::with_subsystem(subsystem, filter))
}
