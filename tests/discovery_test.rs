//! Discovery tests
//!
//! Scanning through the worker and through the dispatcher, with a scripted
//! backend in place of atvremote.

mod common;

use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_err;

use atvtui::app::{Action, App};
use atvtui::config::Config;
use atvtui::controller::Controller;
use atvtui::discovery::{reconcile, DiscoveryWorker};
use atvtui::error::RemoteError;
use atvtui::models::{CommandKind, PairingStatus, Service};
use atvtui::store::{DeviceStore, MemoryStore};
use atvtui::ui_state::LoadingState;
use common::{device, living_room, office_pod, ScanScript, ScriptedBackend};

// =============================================================================
// Worker
// =============================================================================

#[tokio::test]
async fn test_two_devices_found() {
    let backend = Arc::new(ScriptedBackend::finding(vec![living_room(), office_pod()]));
    let worker = DiscoveryWorker::new(backend, Duration::from_secs(8), Duration::from_secs(12));

    let found = worker.discover().await.unwrap();

    assert_eq!(found.len(), 2);
    assert_eq!(found[0].name, "Living Room");
    assert_eq!(found[0].address.to_string(), "10.0.0.5");
    assert_eq!(found[1].name, "Office Pod");
    assert_eq!(found[1].address.to_string(), "10.0.0.9");
    assert!(found.iter().all(|d| d.pairing_status() == PairingStatus::Unpaired));
}

#[tokio::test]
async fn test_same_address_reported_twice_is_one_device() {
    let echo = device("other-id", "Living Room (2)", "10.0.0.5", &[Service::Mrp]);
    let backend = Arc::new(ScriptedBackend::finding(vec![living_room(), echo, office_pod()]));
    let worker = DiscoveryWorker::new(backend, Duration::from_secs(8), Duration::from_secs(12));

    let found = worker.discover().await.unwrap();

    assert_eq!(found.len(), 2);
    let living = &found[0];
    assert_eq!(living.identifier, living_room().identifier);
    assert!(living.has_service(Service::Mrp));
    assert!(living.has_service(Service::Companion));
}

#[tokio::test(start_paused = true)]
async fn test_hung_scan_times_out_within_outer_bound() {
    let backend = Arc::new(ScriptedBackend::hanging());
    let worker = DiscoveryWorker::new(backend, Duration::from_secs(8), Duration::from_secs(12));
    let started = tokio::time::Instant::now();

    let err = assert_err!(worker.discover().await);

    assert!(matches!(err, RemoteError::Timeout(_)), "got {:?}", err);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(12));
    assert!(elapsed < Duration::from_secs(13));
}

#[test]
fn test_outer_timeout_never_below_scan_timeout() {
    let backend = Arc::new(ScriptedBackend::default());
    let worker = DiscoveryWorker::new(backend, Duration::from_secs(10), Duration::from_secs(3));
    assert_eq!(worker.outer_timeout(), Duration::from_secs(11));
}

#[test]
fn test_rescan_keeps_stored_credentials() {
    let mut stored = living_room();
    stored.attach_credential(Service::Companion, "companion-cred");

    let devices = reconcile(vec![living_room(), office_pod()], &[stored]);

    assert_eq!(
        devices[0].credentials.get(&Service::Companion).map(String::as_str),
        Some("companion-cred")
    );
    assert_eq!(devices[0].pairing_status(), PairingStatus::PartiallyPaired);
    assert!(devices[1].credentials.is_empty());
}

// =============================================================================
// Through the Controller
// =============================================================================

fn controller(backend: Arc<ScriptedBackend>, store: MemoryStore) -> Controller {
    Controller::new(backend, Box::new(store), Config::default())
}

#[tokio::test]
async fn test_discovery_result_reaches_device_list() {
    let backend = Arc::new(ScriptedBackend {
        scan_delay: Duration::from_millis(20),
        ..ScriptedBackend::finding(vec![living_room(), office_pod()])
    });
    let mut ctl = controller(backend, MemoryStore::new());
    let mut app = App::default();

    ctl.perform(Action::Discover, &mut app);
    assert!(app.ui.discovery.is_loading());
    assert!(ctl.dispatcher().is_in_flight(CommandKind::Discovery));

    let event = ctl.next_event().await.unwrap();
    ctl.handle(event, &mut app);

    assert_eq!(app.ui.discovery, LoadingState::Idle);
    assert_eq!(app.devices.len(), 2);
    assert!(!ctl.dispatcher().is_in_flight(CommandKind::Discovery));
}

#[tokio::test]
async fn test_second_scan_while_scanning_is_ignored() {
    let backend = Arc::new(ScriptedBackend {
        scan_delay: Duration::from_millis(50),
        ..ScriptedBackend::finding(vec![living_room()])
    });
    let mut ctl = controller(backend, MemoryStore::new());
    let mut app = App::default();

    ctl.perform(Action::Discover, &mut app);
    ctl.perform(Action::Discover, &mut app);

    let event = ctl.next_event().await.unwrap();
    ctl.handle(event, &mut app);
    assert_eq!(app.devices.len(), 1);

    // Only one scan ran, so nothing else is queued
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(ctl.drain(&mut app), 0);
    assert!(app.ui.notice.is_none());
}

#[tokio::test]
async fn test_cancelled_scan_is_silent_and_rescan_allowed() {
    let backend = Arc::new(ScriptedBackend::hanging());
    let mut ctl = controller(Arc::clone(&backend), MemoryStore::new());
    let mut app = App::default();

    ctl.perform(Action::Discover, &mut app);
    ctl.perform(Action::CancelDiscovery, &mut app);
    assert!(!ctl.dispatcher().is_in_flight(CommandKind::Discovery));

    let event = ctl.next_event().await.unwrap();
    ctl.handle(event, &mut app);
    assert_eq!(app.ui.discovery, LoadingState::Idle);
    assert!(app.ui.notice.is_none());

    backend.set_scan(ScanScript::Found(vec![office_pod()]));
    ctl.perform(Action::Discover, &mut app);
    let event = ctl.next_event().await.unwrap();
    ctl.handle(event, &mut app);
    assert_eq!(app.devices.len(), 1);
    assert_eq!(app.devices[0].name, "Office Pod");
}

#[tokio::test]
async fn test_scan_failure_shows_notice() {
    let backend = Arc::new(ScriptedBackend::default());
    backend.set_scan(ScanScript::Fail(RemoteError::ToolMissing("atvremote".into())));
    let mut ctl = controller(backend, MemoryStore::new());
    let mut app = App::default();

    ctl.perform(Action::Discover, &mut app);
    let event = ctl.next_event().await.unwrap();
    ctl.handle(event, &mut app);

    assert!(app.ui.discovery.is_error());
    let notice = app.ui.notice.as_ref().unwrap();
    assert_eq!(notice.title, "Discovery failed");
    assert!(notice.message.contains("pip install pyatv"));
}

#[tokio::test]
async fn test_known_devices_shown_before_first_scan() {
    let mut store = MemoryStore::new();
    let mut stored = living_room();
    stored.attach_credential(Service::Companion, "c");
    stored.attach_credential(Service::AirPlay, "a");
    store.save_device(&stored).unwrap();

    let ctl = controller(Arc::new(ScriptedBackend::default()), store);
    let mut app = App::default();
    ctl.load_known(&mut app);

    assert_eq!(app.devices.len(), 1);
    assert_eq!(app.devices[0].pairing_status(), PairingStatus::Paired);
}

#[tokio::test]
async fn test_rediscovered_device_refreshes_store() {
    let id = living_room().identifier;
    let mut stored = device(&id, "Living Room", "10.0.0.4", &[Service::Companion]);
    stored.last_seen = chrono::Utc::now() - chrono::Duration::days(3);
    stored.attach_credential(Service::Companion, "c");
    let before = stored.last_seen;
    let mut store = MemoryStore::new();
    store.save_device(&stored).unwrap();

    let backend = Arc::new(ScriptedBackend::finding(vec![living_room(), office_pod()]));
    let mut ctl = controller(backend, store);
    let mut app = App::default();

    ctl.perform(Action::Discover, &mut app);
    let event = ctl.next_event().await.unwrap();
    ctl.handle(event, &mut app);

    let refreshed = ctl.store().get_device(&id).unwrap();
    assert_eq!(refreshed.address.to_string(), "10.0.0.5");
    assert!(refreshed.last_seen > before);
    assert_eq!(
        refreshed.credentials.get(&Service::Companion).map(String::as_str),
        Some("c")
    );
    // Devices never paired are not written
    assert!(ctl.store().get_device(&office_pod().identifier).is_none());
}
