//! Fail-over behaviour of the connection manager
//!
//! Scenarios run against the scripted wire client, plus a few against the real
//! MQTT client pointed at ports nothing listens on.

use brokerlink::broker::{Broker, BrokerKey, BrokerRegistry};
use brokerlink::config::MqttSection;
use brokerlink::connection::{ConnectionManager, ConnectionStatus};
use brokerlink::dispatch::{handler_fn, Dispatcher};
use brokerlink::testing::MockWireClient;
use brokerlink::transport::mqtt::MqttWireClient;
use std::sync::Arc;

fn manager_with(
    brokers: Vec<Broker>,
) -> (ConnectionManager<MockWireClient>, Arc<MockWireClient>) {
    let registry = BrokerRegistry::new(brokers).unwrap();
    let wire = Arc::new(MockWireClient::new());
    let manager = ConnectionManager::new(registry, wire.clone(), Arc::new(Dispatcher::default()));
    (manager, wire)
}

#[tokio::test]
async fn test_priority_selection_and_demotion_sequence() {
    let (manager, wire) = manager_with(vec![
        Broker::new("B1", "b1.local", 1883, 2),
        Broker::new("B2", "b2.local", 1883, 1),
    ]);

    assert!(manager.ensure_connected().await);
    assert_eq!(manager.active_broker().await.unwrap().name, "B2");

    wire.fail_next_publish();
    assert!(!manager.publish("iot/t", "1").await);
    assert!(manager.active_broker().await.is_none());
    assert!(!manager.registry().get("b2.local", 1883).unwrap().healthy);

    assert!(manager.ensure_connected().await);
    assert_eq!(manager.active_broker().await.unwrap().name, "B1");

    wire.fail_next_publish();
    assert!(!manager.publish("iot/t", "2").await);

    // Both demoted: nothing left to try and the wire is not touched again
    let attempts_before = wire.connect_attempts().len();
    assert!(!manager.ensure_connected().await);
    assert_eq!(wire.connect_attempts().len(), attempts_before);
}

#[tokio::test]
async fn test_equal_priorities_prefer_registration_order() {
    let (manager, _wire) = manager_with(vec![
        Broker::new("first", "a.local", 1883, 1),
        Broker::new("second", "b.local", 1883, 1),
    ]);

    assert!(manager.ensure_connected().await);
    assert_eq!(manager.active_broker().await.unwrap().name, "first");
}

#[tokio::test]
async fn test_publish_success_then_transport_error_moves_to_other_broker() {
    let (manager, wire) = manager_with(vec![
        Broker::new("primary", "mq1", 1883, 1),
        Broker::new("secondary", "mq2", 1883, 2),
    ]);

    assert!(manager.publish("iot/t", "ok").await);
    wire.fail_next_publish();
    assert!(!manager.publish("iot/t", "lost").await);
    assert!(manager.publish("iot/t", "recovered").await);

    let published = wire.published();
    assert_eq!(published.len(), 2);
    assert_eq!(published[0].payload, "ok");
    assert_eq!(published[1].broker, BrokerKey::new("mq2", 1883));
    assert_eq!(published[1].payload, "recovered");
}

#[tokio::test]
async fn test_status_events_follow_transitions() {
    let (manager, wire) = manager_with(vec![
        Broker::new("primary", "mq1", 1883, 1),
        Broker::new("secondary", "mq2", 1883, 2),
    ]);
    let mut events = manager.status_events();
    wire.fail_connect_to(BrokerKey::new("mq1", 1883));

    assert!(!manager.ensure_connected().await);
    assert!(manager.ensure_connected().await);
    manager.disconnect().await;

    match events.recv().await.unwrap() {
        ConnectionStatus::ConnectFailed { broker, .. } => assert_eq!(broker.name, "primary"),
        other => panic!("unexpected event: {other:?}"),
    }
    match events.recv().await.unwrap() {
        ConnectionStatus::Connected(broker) => assert_eq!(broker.name, "secondary"),
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(events.recv().await.unwrap(), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn test_health_recovery_restores_preferred_broker_on_next_selection() {
    let (manager, wire) = manager_with(vec![
        Broker::new("primary", "mq1", 1883, 1),
        Broker::new("secondary", "mq2", 1883, 2),
    ]);
    wire.fail_connect_to(BrokerKey::new("mq1", 1883));

    assert!(!manager.ensure_connected().await);
    assert!(manager.ensure_connected().await);
    assert_eq!(manager.active_broker().await.unwrap().name, "secondary");

    // The monitor marks primary healthy again; the live session is kept
    wire.accept_connect_to(&BrokerKey::new("mq1", 1883));
    manager.registry().set_health("mq1", 1883, true);
    assert!(manager.ensure_connected().await);
    assert_eq!(manager.active_broker().await.unwrap().name, "secondary");

    // Only a new selection moves back
    wire.drop_connection();
    assert!(manager.ensure_connected().await);
    assert_eq!(manager.active_broker().await.unwrap().name, "primary");
}

#[tokio::test]
async fn test_subscriptions_survive_failover() {
    let (manager, wire) = manager_with(vec![
        Broker::new("primary", "mq1", 1883, 1),
        Broker::new("secondary", "mq2", 1883, 2),
    ]);

    assert!(
        manager
            .subscribe("iot/+/temperature", handler_fn(|_, _| async { Ok(()) }))
            .await
    );
    wire.fail_next_publish();
    assert!(!manager.publish("iot/greenhouse/temperature", "{}").await);
    assert!(manager.publish("iot/greenhouse/temperature", "{}").await);

    let on_secondary: Vec<String> = wire
        .subscriptions()
        .into_iter()
        .filter(|(broker, _)| *broker == BrokerKey::new("mq2", 1883))
        .map(|(_, pattern)| pattern)
        .collect();
    assert_eq!(on_secondary, vec!["iot/+/temperature"]);
}

fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn test_real_client_demotes_unreachable_brokers() {
    let registry = BrokerRegistry::new(vec![
        Broker::new("down-1", "127.0.0.1", closed_port(), 1),
        Broker::new("down-2", "127.0.0.1", closed_port(), 2),
    ])
    .unwrap();
    let wire = Arc::new(MqttWireClient::new(MqttSection {
        connect_timeout_ms: 2000,
        ..MqttSection::default()
    }));
    let manager = ConnectionManager::new(registry, wire, Arc::new(Dispatcher::default()));

    assert!(!manager.publish("iot/t", "x").await);
    assert!(!manager.publish("iot/t", "x").await);
    assert!(!manager.publish("iot/t", "x").await);

    assert!(manager.registry().select_healthy().is_none());
    assert!(manager.active_broker().await.is_none());
}
