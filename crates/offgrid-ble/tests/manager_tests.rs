//! Connection manager behaviour against an in-memory central


use std::time::Duration;

use offgrid_ble::{
    BleTransportError, ConnectionManager, LinkState, LinkStatus, NameMatcher, WriteMode,
    UART_SERVICE_UUID,
};
use offgrid_core::{FrameCodec, FrameKind, OutboundFrame, PeripheralIdentity};
use tokio::time::{sleep, timeout};
use tokio_test::{assert_err, assert_ok};

use test_utils::*;

fn peer(last: u8, name: &str) -> PeripheralIdentity {
    PeripheralIdentity::new(address(last)).with_name(name)
}

async fn connected(central: MockCentral) -> ConnectionManager<MockCentral> {
    let manager = ConnectionManager::new(central, test_config());
    manager
        .scan_and_connect(NameMatcher::default(), Duration::from_millis(50))
        .await;
    assert_eq!(settle(&manager).await, LinkState::Ready);
    manager
}

// ----------------------------------------------------------------------------
// Discovery and Connection
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_scan_match_reaches_ready() {
    let central = MockCentral::new()
        .advertise(peer(1, "Galaxy Buds"))
        .advertise(peer(2, "OffGridChat-ESP32"));
    let manager = ConnectionManager::new(central.clone(), test_config());
    let mut status = manager.subscribe_status();

    manager
        .scan_and_connect(NameMatcher::default(), Duration::from_secs(1))
        .await;
    assert_eq!(settle(&manager).await, LinkState::Ready);

    let events = drain_status(&mut status);
    assert!(events.contains(&LinkStatus::Matched(peer(2, "OffGridChat-ESP32"))));
    assert_eq!(
        states(&events),
        vec![
            LinkState::Scanning,
            LinkState::Connecting,
            LinkState::ServiceDiscovery,
            LinkState::Ready
        ]
    );
    assert!(failures(&events).is_empty());

    assert_eq!(central.connect_attempts(), vec![address(2)]);
    assert_eq!(central.scans_started(), 1);
    assert_eq!(central.scans_stopped(), 1);
    assert_eq!(
        manager.connected_peer().await.and_then(|p| p.name),
        Some("OffGridChat-ESP32".to_string())
    );
}

#[tokio::test]
async fn test_closure_matcher_selects_by_address() {
    let central = MockCentral::new()
        .advertise(peer(1, "OffGridChat-ESP32"))
        .advertise(peer(2, "unnamed board"));
    let manager = ConnectionManager::new(central.clone(), test_config());

    let wanted = address(2);
    manager
        .scan_and_connect(
            move |p: &PeripheralIdentity| p.address == wanted,
            Duration::from_secs(1),
        )
        .await;

    assert_eq!(settle(&manager).await, LinkState::Ready);
    assert_eq!(central.connect_attempts(), vec![address(2)]);
}

#[tokio::test]
async fn test_scan_timeout_falls_back_in_order() {
    let known_match = peer(3, "esp32 bench unit");
    let known_other = peer(4, "Headphones");
    let central = MockCentral::new()
        .know(known_match)
        .know(known_other)
        .reachable(address(6));
    let config = test_config().with_known_addresses(vec![address(5), address(3), address(6)]);
    let manager = ConnectionManager::new(central.clone(), config);
    let mut status = manager.subscribe_status();

    manager
        .scan_and_connect(NameMatcher::default(), Duration::from_millis(50))
        .await;
    assert_eq!(settle(&manager).await, LinkState::Ready);

    // Matching known peripheral first, then configured addresses without duplicates
    assert_eq!(
        central.connect_attempts(),
        vec![address(3), address(5), address(6)]
    );
    assert_eq!(manager.connected_peer().await.map(|p| p.address), Some(address(6)));

    let events = drain_status(&mut status);
    assert!(!events.iter().any(|e| matches!(e, LinkStatus::Matched(_))));
    assert_eq!(central.scans_stopped(), 1);
}

#[tokio::test]
async fn test_scan_timeout_without_fallback() {
    let central = MockCentral::new().advertise(peer(1, "Galaxy Buds"));
    let manager = ConnectionManager::new(central.clone(), test_config());
    let mut status = manager.subscribe_status();

    manager
        .scan_and_connect(NameMatcher::default(), Duration::from_millis(50))
        .await;
    assert_eq!(settle(&manager).await, LinkState::Disconnected);

    let events = drain_status(&mut status);
    assert_eq!(failures(&events), vec![BleTransportError::ScanTimeout]);
    assert!(central.connect_attempts().is_empty());
}

#[tokio::test]
async fn test_all_candidates_unreachable_reports_last_error() {
    let central = MockCentral::new();
    let config = test_config().with_known_addresses(vec![address(7), address(8)]);
    let manager = ConnectionManager::new(central.clone(), config);
    let mut status = manager.subscribe_status();

    manager
        .scan_and_connect(NameMatcher::default(), Duration::from_millis(20))
        .await;
    assert_eq!(settle(&manager).await, LinkState::Disconnected);

    assert_eq!(central.connect_attempts(), vec![address(7), address(8)]);
    let events = drain_status(&mut status);
    assert!(matches!(
        failures(&events).as_slice(),
        [BleTransportError::ConnectFailed { address, .. }] if *address == "10:20:30:40:50:08"
    ));
}

#[tokio::test]
async fn test_preflight_failures_stop_before_scanning() {
    for error in [
        BleTransportError::AdapterDisabled,
        BleTransportError::PermissionDenied,
    ] {
        let central = MockCentral::new()
            .with_ready(Err(error.clone()))
            .advertise(peer(1, "OffGridChat"));
        let manager = ConnectionManager::new(central.clone(), test_config());
        let mut status = manager.subscribe_status();

        assert_eq!(assert_err!(manager.preflight().await), error);

        manager
            .scan_and_connect(NameMatcher::default(), Duration::from_secs(1))
            .await;
        assert_eq!(settle(&manager).await, LinkState::Disconnected);

        let events = drain_status(&mut status);
        assert_eq!(failures(&events), vec![error.clone()]);
        assert!(error.is_discovery_failure());
        assert_eq!(central.scans_started(), 0);
    }
}

#[tokio::test]
async fn test_connect_direct() {
    let central = MockCentral::new().reachable(address(9));
    let manager = ConnectionManager::new(central.clone(), test_config());
    let mut status = manager.subscribe_status();

    manager.connect_direct(address(9)).await;
    assert_eq!(settle(&manager).await, LinkState::Ready);

    let events = drain_status(&mut status);
    assert_eq!(
        states(&events),
        vec![LinkState::Connecting, LinkState::ServiceDiscovery, LinkState::Ready]
    );
    assert_eq!(central.scans_started(), 0);
}

#[tokio::test]
async fn test_connect_direct_unreachable() {
    let central = MockCentral::new();
    let manager = ConnectionManager::new(central, test_config());
    let mut status = manager.subscribe_status();

    manager.connect_direct(address(9)).await;
    assert_eq!(settle(&manager).await, LinkState::Disconnected);
    assert!(matches!(
        failures(&drain_status(&mut status)).as_slice(),
        [BleTransportError::ConnectFailed { .. }]
    ));
}

// ----------------------------------------------------------------------------
// Service Binding
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_missing_service_leaves_link_without_io() {
    let central = MockCentral::new()
        .advertise(peer(1, "OffGridChat"))
        .with_services(Vec::new());
    let manager = ConnectionManager::new(central.clone(), test_config());
    let mut status = manager.subscribe_status();

    manager
        .scan_and_connect(NameMatcher::default(), Duration::from_secs(1))
        .await;
    assert_eq!(settle(&manager).await, LinkState::ReadyWithoutIo);

    let events = drain_status(&mut status);
    assert_eq!(
        failures(&events),
        vec![BleTransportError::ServiceNotFound {
            service: UART_SERVICE_UUID
        }]
    );

    // Still linked, but writes cannot go anywhere
    assert!(manager.connected_peer().await.is_some());
    assert!(matches!(
        manager.write(OutboundFrame::text("hi")).await,
        Err(BleTransportError::CharacteristicNotFound { .. })
    ));
    assert!(central.link(0).writes().is_empty());
}

// ----------------------------------------------------------------------------
// Writes
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_write_is_chunked_in_order() {
    let central = MockCentral::new().advertise(peer(1, "OffGridChat"));
    let config = test_config().with_write_chunk_size(8);
    let manager = ConnectionManager::new(central.clone(), config);
    manager
        .scan_and_connect(NameMatcher::default(), Duration::from_secs(1))
        .await;
    assert_eq!(settle(&manager).await, LinkState::Ready);

    let photo = (0u8..=40).collect::<Vec<_>>();
    assert_ok!(manager.write(OutboundFrame::photo(photo.clone())).await);

    let writes = central.link(0).writes();
    assert!(writes.len() > 1);
    assert!(writes.iter().all(|w| w.len() <= 8));

    let expected = FrameCodec::default()
        .encode(&OutboundFrame::photo(photo))
        .unwrap();
    assert_eq!(writes.concat(), expected);
    assert!(central
        .link(0)
        .write_modes()
        .iter()
        .all(|m| *m == WriteMode::WithResponse));
}

#[tokio::test]
async fn test_concurrent_writes_do_not_interleave() {
    let manager = connected(MockCentral::new().advertise(peer(1, "OffGridChat"))).await;
    let central = manager.central().clone();

    let first = OutboundFrame::text("a".repeat(600));
    let second = OutboundFrame::audio(vec![7u8; 600]);
    let (a, b) = tokio::join!(manager.write(first.clone()), manager.write(second.clone()));
    assert_ok!(a);
    assert_ok!(b);

    let codec = FrameCodec::default();
    let first_bytes = codec.encode(&first).unwrap();
    let second_bytes = codec.encode(&second).unwrap();
    let written = central.link(0).writes().concat();

    let either_order = [first_bytes.clone(), second_bytes.clone()].concat() == written
        || [second_bytes, first_bytes].concat() == written;
    assert!(either_order);
}

#[tokio::test]
async fn test_write_without_link_is_not_connected() {
    let manager = ConnectionManager::new(MockCentral::new(), test_config());
    assert_eq!(
        manager.write(OutboundFrame::text("hello")).await,
        Err(BleTransportError::NotConnected)
    );
}

#[tokio::test]
async fn test_oversized_frame_is_rejected_before_writing() {
    let central = MockCentral::new().advertise(peer(1, "OffGridChat"));
    let mut config = test_config();
    config.codec = config.codec.with_max_payload_len(16);
    let manager = ConnectionManager::new(central.clone(), config);
    manager
        .scan_and_connect(NameMatcher::default(), Duration::from_secs(1))
        .await;
    assert_eq!(settle(&manager).await, LinkState::Ready);

    let result = manager.write(OutboundFrame::photo(vec![0; 17])).await;
    assert!(matches!(result, Err(BleTransportError::Frame(_))));
    assert!(central.link(0).writes().is_empty());
}

// ----------------------------------------------------------------------------
// Notifications
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_notifications_reach_subscribers_in_order() {
    let manager = connected(MockCentral::new().advertise(peer(1, "OffGridChat"))).await;
    let link = manager.central().link(0);
    let mut inbound = manager.subscribe_inbound();
    let mut decoder = manager.codec().decoder();

    link.notify(b"TEXT:5:he");
    link.notify_on(uuid::Uuid::from_u128(0xdead), b"noise");
    link.notify(b"llo");

    let first = timeout(TEST_TIMEOUT, inbound.recv()).await.unwrap().unwrap();
    let second = timeout(TEST_TIMEOUT, inbound.recv()).await.unwrap().unwrap();
    assert_eq!(first, b"TEXT:5:he".to_vec());
    assert_eq!(second, b"llo".to_vec());

    assert!(decoder.push(&first).is_empty());
    let messages = decoder.push(&second);
    assert_eq!(messages.len(), 1);
    let message = messages.into_iter().next().unwrap().unwrap();
    assert_eq!(message.kind(), FrameKind::Text);
    assert_eq!(message.text().unwrap(), "hello");
}

#[tokio::test]
async fn test_late_subscriber_sees_only_new_notifications() {
    let manager = connected(MockCentral::new().advertise(peer(1, "OffGridChat"))).await;
    let link = manager.central().link(0);
    let mut early = manager.subscribe_inbound();

    link.notify(b"first");
    assert_eq!(
        timeout(TEST_TIMEOUT, early.recv()).await.unwrap(),
        Some(b"first".to_vec())
    );

    let mut late = manager.subscribe_inbound();
    link.notify(b"second");
    assert_eq!(
        timeout(TEST_TIMEOUT, late.recv()).await.unwrap(),
        Some(b"second".to_vec())
    );
    assert_eq!(
        timeout(TEST_TIMEOUT, early.recv()).await.unwrap(),
        Some(b"second".to_vec())
    );
}

// ----------------------------------------------------------------------------
// Teardown
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_wait_for_state_returns_current_state_when_already_met() {
    let manager = ConnectionManager::new(MockCentral::new(), test_config());
    let state = timeout(TEST_TIMEOUT, manager.wait_for_state(|s| *s == LinkState::Idle))
        .await
        .unwrap();
    assert_eq!(state, LinkState::Idle);
}

#[tokio::test]
async fn test_link_loss_reports_and_disconnects() {
    let manager = connected(MockCentral::new().advertise(peer(1, "OffGridChat"))).await;
    let mut status = manager.subscribe_status();

    manager.central().link(0).drop_link();
    let state = timeout(
        TEST_TIMEOUT,
        manager.wait_for_state(|s| *s == LinkState::Disconnected),
    )
    .await
    .unwrap();
    assert_eq!(state, LinkState::Disconnected);

    let events = drain_status(&mut status);
    assert_eq!(failures(&events), vec![BleTransportError::LinkLost]);
    assert!(manager.connected_peer().await.is_none());
    assert_eq!(
        manager.write(OutboundFrame::text("late")).await,
        Err(BleTransportError::NotConnected)
    );
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let idle = ConnectionManager::new(MockCentral::new(), test_config());
    idle.disconnect().await;
    idle.disconnect().await;
    assert_eq!(idle.state(), LinkState::Idle);

    let manager = connected(MockCentral::new().advertise(peer(1, "OffGridChat"))).await;
    manager.disconnect().await;
    assert_eq!(manager.state(), LinkState::Disconnected);
    assert!(manager.central().link(0).was_disconnected());

    manager.disconnect().await;
    assert_eq!(manager.state(), LinkState::Disconnected);
}

#[tokio::test]
async fn test_disconnect_cancels_pending_scan() {
    let central = MockCentral::new();
    let manager = ConnectionManager::new(central.clone(), test_config());

    manager
        .scan_and_connect(NameMatcher::default(), Duration::from_secs(30))
        .await;
    timeout(
        TEST_TIMEOUT,
        manager.wait_for_state(|s| *s == LinkState::Scanning),
    )
    .await
    .unwrap();

    manager.disconnect().await;
    assert_eq!(manager.state(), LinkState::Disconnected);
    assert_eq!(central.scans_stopped(), 1);
    assert!(central.connect_attempts().is_empty());
}

#[tokio::test]
async fn test_new_attempt_tears_down_previous_link() {
    let central = MockCentral::new().reachable(address(1)).reachable(address(2));
    let manager = ConnectionManager::new(central.clone(), test_config());

    manager.connect_direct(address(1)).await;
    assert_eq!(settle(&manager).await, LinkState::Ready);

    manager.connect_direct(address(2)).await;
    assert!(central.link(0).was_disconnected());
    assert_eq!(settle(&manager).await, LinkState::Ready);
    assert_eq!(manager.connected_peer().await.map(|p| p.address), Some(address(2)));

    // The old link closing later must not disturb the new one
    central.link(0).drop_link();
    sleep(Duration::from_millis(20)).await;
    assert_eq!(manager.state(), LinkState::Ready);
    assert_eq!(central.link_count(), 2);
}
