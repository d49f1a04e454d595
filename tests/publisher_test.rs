// Integration tests for the publisher lifecycle. Tests that talk to a real
// broker are ignored by default; run them with a RabbitMQ instance on
// localhost (or point RABBITMQ_HOST elsewhere) via `cargo test -- --ignored`.

use std::collections::{HashMap, HashSet};

use amqp_publisher::{ConnectOptions, Publisher, PublisherSettings};
use lapin::{options::BasicGetOptions, Connection, ConnectionProperties};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn broker_host() -> String {
    std::env::var("RABBITMQ_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn test_options() -> ConnectOptions {
    ConnectOptions {
        hostname: broker_host(),
        port: 5672,
        username: "guest".to_string(),
        password: "guest".to_string(),
        heartbeat: 5,
        ..ConnectOptions::default()
    }
}

fn test_settings() -> PublisherSettings {
    PublisherSettings {
        real_queue_by_internal_name: HashMap::from([
            ("orders".to_string(), "ORDERS_REAL".to_string()),
            ("audit".to_string(), "audit".to_string()),
        ]),
        durable_queues: HashSet::from(["audit".to_string()]),
        ..PublisherSettings::default()
    }
}

#[tokio::test]
#[ignore] // requires a running RabbitMQ instance
async fn start_opens_one_channel_per_mapping_entry() {
    init_tracing();
    let mut publisher = Publisher::new(test_options(), test_settings());

    let response = publisher.start().await;
    assert!(response.success, "start failed: {:?}", response.errors);

    // exactly the internal names of the mapping, nothing else
    assert_eq!(publisher.channel_count(), 2);
    assert!(publisher.has_channel("orders"));
    assert!(publisher.has_channel("audit"));
    assert!(!publisher.has_channel("ORDERS_REAL"));

    let response = publisher.stop().await;
    assert!(response.success, "stop failed: {:?}", response.errors);
}

#[tokio::test]
#[ignore] // requires a running RabbitMQ instance
async fn publish_json_lands_on_the_real_queue() {
    init_tracing();
    let mut publisher = Publisher::new(test_options(), test_settings());
    let response = publisher.start().await;
    assert!(response.success, "start failed: {:?}", response.errors);

    // side connection to inspect the queue the broker actually sees
    let uri = test_options().to_uri();
    let connection = Connection::connect(&uri, ConnectionProperties::default())
        .await
        .expect("side connection should establish");
    let channel = connection
        .create_channel()
        .await
        .expect("side channel should open");
    channel
        .queue_purge("ORDERS_REAL", Default::default())
        .await
        .expect("queue should purge");

    let response = publisher
        .publish_json("orders", &serde_json::json!({ "id": 1 }))
        .await;
    assert!(response.success, "publish failed: {:?}", response.errors);

    let message = channel
        .basic_get("ORDERS_REAL", BasicGetOptions { no_ack: true })
        .await
        .expect("basic_get should succeed")
        .expect("a message should be waiting on ORDERS_REAL");
    assert_eq!(message.delivery.data, br#"{"id":1}"#);

    connection
        .close(0, "test done")
        .await
        .expect("side connection should close");
    let response = publisher.stop().await;
    assert!(response.success, "stop failed: {:?}", response.errors);
}

#[tokio::test]
#[ignore] // requires a running RabbitMQ instance
async fn stop_releases_all_channels() {
    init_tracing();
    let mut publisher = Publisher::new(test_options(), test_settings());
    let response = publisher.start().await;
    assert!(response.success, "start failed: {:?}", response.errors);

    let response = publisher.stop().await;
    assert!(response.success, "stop failed: {:?}", response.errors);
    assert_eq!(publisher.channel_count(), 0);

    // a second stop has nothing left to close and stays clean
    let response = publisher.stop().await;
    assert!(response.success);
}

#[tokio::test]
async fn publish_before_start_never_contacts_the_broker() {
    // offline-safe: no channel exists, so the lookup short-circuits
    let publisher = Publisher::new(test_options(), test_settings());

    let response = publisher
        .publish_json("missing", &serde_json::json!({ "x": 1 }))
        .await;
    assert!(!response.success);
    assert_eq!(response.errors.len(), 1);
    assert!(response.errors[0].to_string().contains("not found"));
}
