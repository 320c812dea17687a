// tests/service_runtime.rs

mod common;
use crate::common::fakes::{FakeOpener, Observed, RecordingObserver};
use crate::common::{hidraw, init_tracing, input, with_timeout};

use std::error::Error;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::time::{sleep, Duration};

use devwatch::device::Description;
use devwatch::errors::DevwatchError;
use devwatch::service::{Service, ServiceOptions, Step};
use devwatch::subsystem::{DeviceSubsystem, MockSubsystem};
use devwatch::watch::{AcceptAll, DeviceFilter, DeviceWatcher, MatchRules, Predicate};

type TestResult = Result<(), Box<dyn Error>>;

fn service_with<F: DeviceFilter>(
    mock: &MockSubsystem,
    filter: F,
    auto_quit: bool,
) -> (Service<FakeOpener, F>, FakeOpener, RecordingObserver) {
    init_tracing();
    let subsystem: Arc<dyn DeviceSubsystem> = Arc::new(mock.clone());
    let watcher = DeviceWatcher::with_subsystem(subsystem, filter);
    let opener = FakeOpener::new();
    let observer = RecordingObserver::new();
    let service = Service::new(
        watcher,
        opener.clone(),
        observer.boxed(),
        ServiceOptions { auto_quit },
    );
    (service, opener, observer)
}

#[test]
fn init_opens_every_present_visible_device() -> TestResult {
    let mock = MockSubsystem::new();
    mock.insert(None, hidraw(1));
    mock.insert(None, hidraw(2));
    mock.insert(None, input(1));
    let (mut service, opener, _observer) =
        service_with(&mock, MatchRules::new().subsystem("hidraw"), false);

    assert_eq!(service.init()?, Step::Continue);
    assert!(service.is_active());
    assert_eq!(service.registry().len(), 2);
    assert_eq!(opener.live(), 2);
    Ok(())
}

#[test]
fn init_fails_when_the_monitor_is_unavailable() {
    let mock = MockSubsystem::new();
    mock.set_monitor_available(false);
    let (mut service, _opener, _observer) = service_with(&mock, AcceptAll, false);

    let err = service.init().unwrap_err();
    assert!(matches!(err, DevwatchError::Subsystem(_)));
    assert!(service.registry().is_empty());
}

#[test]
fn dropping_the_service_releases_managers_silently() -> TestResult {
    let mock = MockSubsystem::new();
    mock.insert(None, hidraw(1));
    let (mut service, opener, observer) = service_with(&mock, AcceptAll, true);
    service.init()?;
    assert_eq!(mock.live_monitor_count(), 1);

    drop(service);

    assert_eq!(opener.live(), 0);
    assert_eq!(mock.live_monitor_count(), 0);
    assert_eq!(observer.events(), vec![Observed::Added(hidraw(1).devpath)]);
    Ok(())
}

#[test]
fn deactivation_keeps_managers_until_devices_go() -> TestResult {
    let mock = MockSubsystem::new();
    mock.insert(None, hidraw(1));
    let (mut service, _opener, _observer) = service_with(&mock, AcceptAll, false);
    service.init()?;

    assert_eq!(service.set_active(false)?, Step::Continue);
    assert_eq!(service.registry().len(), 1);

    mock.remove_silently(&hidraw(1).devpath);
    assert_eq!(service.rescan(), Step::Continue);
    assert!(service.registry().is_empty());
    Ok(())
}

#[tokio::test]
async fn run_follows_plug_and_unplug_until_auto_quit() -> TestResult {
    let mock = MockSubsystem::new();
    mock.insert(None, hidraw(1));
    let (mut service, opener, observer) = service_with(&mock, AcceptAll, true);
    service.init()?;

    let driver = mock.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(10)).await;
        driver.plug(None, hidraw(2));
        sleep(Duration::from_millis(10)).await;
        driver.unplug(&hidraw(1).devpath);
        sleep(Duration::from_millis(10)).await;
        driver.unplug(&hidraw(2).devpath);
    });

    with_timeout(service.run(std::future::pending::<()>())).await?;

    assert_eq!(
        observer.events(),
        vec![
            Observed::Added(hidraw(1).devpath),
            Observed::Added(hidraw(2).devpath),
            Observed::Removed(hidraw(1).devpath),
            Observed::Removed(hidraw(2).devpath),
        ]
    );
    assert_eq!(opener.live(), 0);
    Ok(())
}

#[tokio::test]
async fn run_returns_when_shutdown_fires() -> TestResult {
    let mock = MockSubsystem::new();
    mock.insert(None, hidraw(1));
    let (mut service, _opener, observer) = service_with(&mock, AcceptAll, true);
    service.init()?;

    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        sleep(Duration::from_millis(20)).await;
        let _ = tx.send(());
    });

    with_timeout(service.run(async {
        let _ = rx.await;
    }))
    .await?;

    // Shutdown is not a removal.
    assert_eq!(service.registry().len(), 1);
    assert_eq!(observer.events(), vec![Observed::Added(hidraw(1).devpath)]);
    Ok(())
}

#[tokio::test]
async fn manager_stop_request_is_handled_by_the_run_loop() -> TestResult {
    let mock = MockSubsystem::new();
    mock.insert(None, hidraw(1));
    let (mut service, _opener, observer) = service_with(&mock, AcceptAll, true);
    service.init()?;

    let handle = service
        .registry()
        .manager(&hidraw(1).devpath)
        .map(|m| m.stop_handle())
        .ok_or("manager missing")?;
    assert!(handle.stop());

    with_timeout(service.run(std::future::pending::<()>())).await?;

    assert!(service.registry().is_empty());
    assert_eq!(
        observer.events().last(),
        Some(&Observed::Removed(hidraw(1).devpath))
    );
    Ok(())
}

#[tokio::test]
async fn only_visible_devices_reach_the_registry() -> TestResult {
    // A is visible, B is not.
    let mock = MockSubsystem::new();
    let a = hidraw(1);
    let b = hidraw(2);
    mock.insert(None, a.clone());
    mock.insert(None, b.clone());
    let visible = a.devpath.clone();
    let filter = Predicate(move |d: &Description| d.devpath() == visible);
    let (mut service, opener, observer) = service_with(&mock, filter, true);

    service.init()?;
    assert_eq!(opener.attempts(), vec![a.devpath.clone()]);

    let driver = mock.clone();
    let (a_path, b_path) = (a.devpath.clone(), b.devpath.clone());
    tokio::spawn(async move {
        sleep(Duration::from_millis(10)).await;
        driver.unplug(&b_path);
        sleep(Duration::from_millis(10)).await;
        driver.unplug(&a_path);
    });

    with_timeout(service.run(std::future::pending::<()>())).await?;

    assert_eq!(
        observer.events(),
        vec![Observed::Added(a.devpath.clone()), Observed::Removed(a.devpath)]
    );
    Ok(())
}
