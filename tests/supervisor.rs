//! Connection supervisor state machine against a mock transport.

use std::time::Duration;

use tokio::time::sleep;

use session_relay::connection::{ConnectionQuality, ConnectionState};
use session_relay::events::{RelayEvent, CONNECTION_CHANGED, TRANSPORT_MESSAGE};
use session_relay::{CircuitState, OutboundMessage};

mod common;
use common::{record_events, relay, test_config, wait_for_state};

fn transitions(events: &[RelayEvent]) -> Vec<(ConnectionState, ConnectionState)> {
    events
        .iter()
        .filter_map(|event| match event {
            RelayEvent::ConnectionChanged(change) => Some((change.previous, change.current)),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_connect_publishes_transitions() {
    let (relay, transport) = relay(&test_config());
    let changes = record_events(&relay, CONNECTION_CHANGED);

    relay.start();
    wait_for_state(&relay.supervisor, ConnectionState::Connected).await;
    sleep(Duration::from_millis(1)).await;

    use ConnectionState::*;
    assert_eq!(
        transitions(&changes.lock().unwrap()),
        vec![(Disconnected, Connecting), (Connecting, Connected)]
    );
    assert_eq!(transport.connect_count(), 1);
    assert_eq!(relay.supervisor.attempts(), 0);
    assert_eq!(relay.supervisor.quality(), ConnectionQuality::Good);
}

#[tokio::test(start_paused = true)]
async fn test_reconnects_after_drop() {
    let (relay, transport) = relay(&test_config());
    let changes = record_events(&relay, CONNECTION_CHANGED);
    relay.start();
    wait_for_state(&relay.supervisor, ConnectionState::Connected).await;

    transport.drop_link();
    wait_for_state(&relay.supervisor, ConnectionState::Reconnecting).await;
    assert_eq!(relay.supervisor.attempts(), 1);
    assert_eq!(relay.supervisor.quality(), ConnectionQuality::Poor);

    wait_for_state(&relay.supervisor, ConnectionState::Connected).await;
    sleep(Duration::from_millis(1)).await;

    assert_eq!(transport.connect_count(), 2);
    assert_eq!(relay.supervisor.attempts(), 0);

    use ConnectionState::*;
    let seen = transitions(&changes.lock().unwrap());
    assert_eq!(
        &seen[2..],
        &[(Connected, Reconnecting), (Reconnecting, Connecting), (Connecting, Connected)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_failed_handshakes_count_as_attempts() {
    let mut config = test_config();
    config.connection.max_reconnect_attempts = Some(2);
    let (relay, transport) = relay(&config);
    transport.fail_next_connects(u32::MAX);

    relay.start();
    sleep(Duration::from_secs(10)).await;

    assert_eq!(relay.supervisor.state(), ConnectionState::Disconnected);
    assert_eq!(transport.connect_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_spacing_between_attempts() {
    let (relay, transport) = relay(&test_config());
    transport.fail_next_connects(3);

    relay.start();
    sleep(Duration::from_millis(50)).await;
    assert_eq!(transport.connect_count(), 1);

    // 100ms, then 200ms, then 400ms
    sleep(Duration::from_millis(100)).await;
    assert_eq!(transport.connect_count(), 2);
    sleep(Duration::from_millis(200)).await;
    assert_eq!(transport.connect_count(), 3);
    sleep(Duration::from_millis(400)).await;
    assert_eq!(transport.connect_count(), 4);
    assert_eq!(relay.supervisor.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_stops_reconnecting() {
    let (relay, transport) = relay(&test_config());
    relay.start();
    wait_for_state(&relay.supervisor, ConnectionState::Connected).await;

    relay.supervisor.disconnect().await;
    assert_eq!(relay.supervisor.state(), ConnectionState::Disconnected);

    sleep(Duration::from_secs(30)).await;
    assert_eq!(transport.connect_count(), 1);
    assert_eq!(relay.supervisor.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_send_requires_connection() {
    let (relay, transport) = relay(&test_config());
    let message = OutboundMessage::new("A", serde_json::json!({ "n": 1 }));
    assert!(relay.supervisor.send(&message).await.is_err());

    relay.start();
    wait_for_state(&relay.supervisor, ConnectionState::Connected).await;
    relay.supervisor.send(&message).await.unwrap();
    assert_eq!(transport.sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_inbound_messages_are_published() {
    let (relay, transport) = relay(&test_config());
    let inbound = record_events(&relay, TRANSPORT_MESSAGE);
    relay.start();
    wait_for_state(&relay.supervisor, ConnectionState::Connected).await;

    transport.push_message(r#"{"ack":1}"#);
    sleep(Duration::from_millis(1)).await;

    assert_eq!(
        *inbound.lock().unwrap(),
        vec![RelayEvent::Message {
            text: r#"{"ack":1}"#.to_string()
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_missed_heartbeats_force_reconnect() {
    let mut config = test_config();
    config.connection.heartbeat_interval_ms = 1_000;
    config.connection.max_missed_heartbeats = 2;
    let (relay, transport) = relay(&config);
    relay.start();
    wait_for_state(&relay.supervisor, ConnectionState::Connected).await;

    // Link stays open but pings fail.
    transport.go_silent();
    sleep(Duration::from_millis(2_200)).await;

    assert!(transport.connect_count() >= 2);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_during_trial_handshake_recovers() {
    let mut config = test_config();
    config.breaker.reset_timeout_ms = 500;
    let (relay, transport) = relay(&config);
    transport.fail_next_connects(5);
    transport.slow_connects(Duration::from_secs(2));

    relay.start();
    // Five refusals open the breaker; the sixth connect is the slow half-open trial.
    while transport.connect_count() < 6 {
        sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(relay.supervisor.handshake_breaker().state(), CircuitState::HalfOpen);

    relay.supervisor.disconnect().await;
    relay.supervisor.connect();
    sleep(Duration::from_secs(30)).await;

    assert_eq!(relay.supervisor.state(), ConnectionState::Connected);
    assert_eq!(relay.supervisor.handshake_breaker().state(), CircuitState::Closed);
    assert!(transport.connect_count() >= 7);
}
