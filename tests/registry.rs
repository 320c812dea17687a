// tests/registry.rs

mod common;
use crate::common::fakes::{FakeOpener, Observed, OpenOutcome, RecordingObserver};
use crate::common::{hidraw, init_tracing};

use std::sync::Arc;

use tokio::sync::mpsc;

use devwatch::device::Description;
use devwatch::service::{Registry, ServiceOptions, Step, StopSignal};
use devwatch::subsystem::{DeviceSubsystem, MockSubsystem};
use devwatch::watch::WatchEvent;

struct Fixture {
    registry: Registry<FakeOpener>,
    opener: FakeOpener,
    observer: RecordingObserver,
    stop_rx: mpsc::UnboundedReceiver<StopSignal>,
    source: Arc<dyn DeviceSubsystem>,
}

fn fixture(auto_quit: bool) -> Fixture {
    init_tracing();
    let opener = FakeOpener::new();
    let observer = RecordingObserver::new();
    let (stop_tx, stop_rx) = mpsc::unbounded_channel();
    let registry = Registry::new(
        opener.clone(),
        observer.boxed(),
        ServiceOptions { auto_quit },
        stop_tx,
    );
    Fixture {
        registry,
        opener,
        observer,
        stop_rx,
        source: Arc::new(MockSubsystem::new()),
    }
}

impl Fixture {
    fn describe(&self, n: u32) -> Description {
        Description::new(hidraw(n), Arc::clone(&self.source))
    }
}

#[test]
fn add_then_remove_opens_and_releases_the_device() {
    let mut f = fixture(false);
    let device = f.describe(1);

    f.registry.device_added(device.clone());
    assert!(f.registry.contains(device.devpath()));
    assert_eq!(f.opener.live(), 1);

    assert_eq!(f.registry.device_removed(&device), Step::Continue);
    assert!(f.registry.is_empty());
    assert_eq!(f.opener.live(), 0);
    assert_eq!(
        f.observer.events(),
        vec![
            Observed::Added(device.devpath().to_string()),
            Observed::Removed(device.devpath().to_string()),
        ]
    );
}

#[test]
fn duplicate_add_keeps_the_existing_manager() {
    let mut f = fixture(false);
    let device = f.describe(1);

    f.registry.device_added(device.clone());
    let generation = f
        .registry
        .manager(device.devpath())
        .map(|m| m.generation());
    f.registry.device_added(device.clone());

    assert_eq!(f.registry.len(), 1);
    assert_eq!(f.opener.attempts().len(), 1);
    assert_eq!(f.opener.live(), 1);
    assert_eq!(
        f.registry.manager(device.devpath()).map(|m| m.generation()),
        generation
    );
}

#[test]
fn wrong_kind_devices_are_skipped_silently() {
    let mut f = fixture(false);
    let device = f.describe(1);
    f.opener.script(device.devpath(), OpenOutcome::WrongKind);

    f.registry.device_added(device.clone());

    assert!(!f.registry.contains(device.devpath()));
    assert!(f.observer.events().is_empty());
}

#[test]
fn other_open_failures_are_reported_and_leave_the_device_unknown() {
    let mut f = fixture(true);
    let device = f.describe(1);
    f.opener
        .script(device.devpath(), OpenOutcome::Fail("permission denied".into()));

    f.registry.device_added(device.clone());

    assert!(!f.registry.contains(device.devpath()));
    assert_eq!(
        f.observer.events(),
        vec![Observed::OpenFailed(device.devpath().to_string())]
    );
    // Nothing was open, so the removal is not a transition.
    assert_eq!(f.registry.device_removed(&device), Step::Continue);
}

#[test]
fn wrong_kind_device_does_not_block_later_additions() {
    let mut f = fixture(false);
    let skipped = f.describe(1);
    let opened = f.describe(2);
    f.opener.script(skipped.devpath(), OpenOutcome::WrongKind);

    for event in [
        WatchEvent::Added(skipped.clone()),
        WatchEvent::Added(opened.clone()),
    ] {
        assert_eq!(f.registry.handle(event), Step::Continue);
    }

    assert!(!f.registry.contains(skipped.devpath()));
    assert!(f.registry.contains(opened.devpath()));
    assert_eq!(f.opener.attempts().len(), 2);
    assert_eq!(
        f.observer.events(),
        vec![Observed::Added(opened.devpath().to_string())]
    );
}

#[test]
fn failed_open_does_not_block_later_additions() {
    let mut f = fixture(false);
    let failing = f.describe(1);
    let opened = f.describe(2);
    f.opener
        .script(failing.devpath(), OpenOutcome::Fail("device busy".into()));

    f.registry.handle(WatchEvent::Added(failing.clone()));
    f.registry.handle(WatchEvent::Added(opened.clone()));

    assert_eq!(f.registry.len(), 1);
    assert!(f.registry.contains(opened.devpath()));
    assert_eq!(f.opener.live(), 1);
    assert_eq!(
        f.observer.events(),
        vec![
            Observed::OpenFailed(failing.devpath().to_string()),
            Observed::Added(opened.devpath().to_string()),
        ]
    );
}

#[test]
fn removing_an_unknown_device_never_quits() {
    let mut f = fixture(true);
    let device = f.describe(7);
    assert_eq!(f.registry.device_removed(&device), Step::Continue);
    assert!(f.observer.events().is_empty());
}

#[test]
fn auto_quit_fires_exactly_when_the_last_manager_goes() {
    let mut f = fixture(true);
    let (a, b) = (f.describe(1), f.describe(2));
    f.registry.handle(WatchEvent::Added(a.clone()));
    f.registry.handle(WatchEvent::Added(b.clone()));

    assert_eq!(f.registry.handle(WatchEvent::Removed(a.clone())), Step::Continue);
    assert_eq!(f.registry.handle(WatchEvent::Removed(b.clone())), Step::Quit);
    // Already empty: further removals are no-ops.
    assert_eq!(f.registry.handle(WatchEvent::Removed(b)), Step::Continue);
}

#[test]
fn without_auto_quit_the_registry_never_quits() {
    let mut f = fixture(false);
    let a = f.describe(1);
    f.registry.device_added(a.clone());
    assert_eq!(f.registry.device_removed(&a), Step::Continue);
}

#[test]
fn manager_stop_request_removes_it() {
    let mut f = fixture(true);
    let device = f.describe(1);
    f.registry.device_added(device.clone());

    let handle = f
        .registry
        .manager(device.devpath())
        .map(|m| m.stop_handle())
        .expect("manager registered");
    assert!(handle.stop());

    let signal = f.stop_rx.try_recv().expect("stop signal queued");
    assert_eq!(f.registry.manager_stopped(&signal), Step::Quit);
    assert!(f.registry.is_empty());
    assert_eq!(
        f.observer.events().last(),
        Some(&Observed::Removed(device.devpath().to_string()))
    );
}

#[test]
fn stale_stop_signal_from_an_earlier_registration_is_ignored() {
    let mut f = fixture(false);
    let device = f.describe(1);

    f.registry.device_added(device.clone());
    let old = f
        .registry
        .manager(device.devpath())
        .map(|m| m.stop_handle())
        .expect("manager registered");
    f.registry.device_removed(&device);
    f.registry.device_added(device.clone());

    old.stop();
    let signal = f.stop_rx.try_recv().expect("stop signal queued");
    assert_eq!(f.registry.manager_stopped(&signal), Step::Continue);
    assert!(f.registry.contains(device.devpath()));
    assert_eq!(f.opener.live(), 1);
}

#[test]
fn clear_releases_everything_without_notifications() {
    let mut f = fixture(true);
    let (a, b) = (f.describe(1), f.describe(2));
    f.registry.device_added(a);
    f.registry.device_added(b);

    f.registry.clear();

    assert!(f.registry.is_empty());
    assert_eq!(f.opener.live(), 0);
    assert!(
        !f.observer
            .events()
            .iter()
            .any(|e| matches!(e, Observed::Removed(_)))
    );
}
