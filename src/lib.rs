// src/lib.rs
//! Thin publisher-side RabbitMQ client.
//!
//! Wraps a single [`lapin`] connection, keeps one channel per configured
//! queue and publishes string, JSON or JSON5 payloads. Queues are addressed
//! by an internal name that maps to the real queue name declared on the
//! broker. Connection management, framing and retries are lapin's job; this
//! crate only does the name mapping, channel bookkeeping and success/error
//! reporting.
//!
//! ```no_run
//! use std::collections::HashMap;
//! use amqp_publisher::{ConnectOptions, Publisher, PublisherSettings};
//!
//! # async fn run() {
//! let settings = PublisherSettings {
//!     real_queue_by_internal_name: HashMap::from([
//!         ("orders".to_string(), "ORDERS_REAL".to_string()),
//!     ]),
//!     ..PublisherSettings::default()
//! };
//! let mut publisher = Publisher::new(ConnectOptions::default(), settings);
//!
//! publisher.start().await;
//! let response = publisher.publish_json("orders", &serde_json::json!({ "id": 1 })).await;
//! assert!(response.success);
//! publisher.stop().await;
//! # }
//! ```

pub mod config;
pub mod errors;
pub mod publisher;

pub use config::{convert_legacy_config, ConnectOptions, LegacyConfig, PublisherSettings};
pub use errors::{PublishResponse, PublisherError};
pub use publisher::Publisher;
