// src/publisher.rs

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use futures::future::join_all;
use lapin::{
    options::*, publisher_confirm::Confirmation, types::FieldTable, BasicProperties, Channel,
    Connection, ConnectionProperties,
};
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{convert_legacy_config, ConnectOptions, LegacyConfig, PublisherSettings};
use crate::errors::{PublishResponse, PublisherError};

/// Publisher-side AMQP client holding one connection and one channel per
/// configured queue.
///
/// Queues are addressed by an internal (caller-facing) name which is mapped
/// to the real queue name declared on the broker. The lifecycle is
/// `new` → `start` → `publish_*` → `stop`; a stopped publisher is not
/// guaranteed to be restartable.
pub struct Publisher {
    options: ConnectOptions,
    // internal queue name to real queue name mapping
    real_queue_by_internal_name: HashMap<String, String>,
    // internal names of durable queues; everything else is non-durable
    durable_queues: HashSet<String>,
    connection: Option<Connection>,
    // internal queue name to open channel, populated by start()
    channels: HashMap<String, Channel>,
}

impl Publisher {
    pub fn new(options: ConnectOptions, settings: PublisherSettings) -> Self {
        Self {
            options,
            real_queue_by_internal_name: settings.real_queue_by_internal_name,
            durable_queues: settings.durable_queues,
            connection: None,
            channels: HashMap::new(),
        }
    }

    /// Build a publisher from a legacy upper-case-keyed config, converting it
    /// with the timeouts carried by `settings`.
    pub fn with_legacy_config(conf: &LegacyConfig, settings: PublisherSettings) -> Self {
        let options = convert_legacy_config(
            conf,
            settings.heartbeat_interval_ms,
            settings.connect_timeout_ms,
        );
        Self::new(options, settings)
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    /// Whether `start()` opened a channel for this internal queue name.
    pub fn has_channel(&self, queue: &str) -> bool {
        self.channels.contains_key(queue)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Connect to the broker (bounded by the configured connect timeout),
    /// then open one channel per queue-mapping entry concurrently, declaring
    /// each real queue with its durability flag. Channel-open failures are
    /// collected into the response; queues that failed have no channel.
    pub async fn start(&mut self) -> PublishResponse {
        let uri = self.options.to_uri();
        let connect_timeout = Duration::from_millis(self.options.timeout);
        info!(
            host = %self.options.hostname,
            port = self.options.port,
            "Connecting to RabbitMQ"
        );

        let properties =
            ConnectionProperties::default().with_connection_name("amqp-publisher".into());
        let connection = match timeout(connect_timeout, Connection::connect(&uri, properties)).await
        {
            Ok(Ok(connection)) => connection,
            Ok(Err(source)) => {
                error!(error = %source, "Failed to connect to RabbitMQ");
                return PublishResponse::failed(PublisherError::ConnectionError { uri, source });
            }
            Err(_) => {
                error!(
                    timeout_ms = self.options.timeout,
                    "Connection attempt timed out"
                );
                return PublishResponse::failed(PublisherError::ConnectTimeout(connect_timeout));
            }
        };

        info!("Connected to RabbitMQ");
        connection.on_error(|error| {
            warn!(error = %error, "Disconnected from RabbitMQ");
        });

        let opens = self.real_queue_by_internal_name.iter().map(|(internal, real)| {
            let durable = self.durable_queues.contains(internal);
            let connection = &connection;
            async move {
                let result = open_channel(connection, real, durable).await;
                (internal.clone(), result)
            }
        });
        let results = join_all(opens).await;

        let mut errors = Vec::new();
        for (internal, result) in results {
            match result {
                Ok(channel) => {
                    self.channels.insert(internal, channel);
                }
                Err(err) => {
                    error!(queue = %internal, error = %err, "Failed to open channel for queue");
                    errors.push(err);
                }
            }
        }

        self.connection = Some(connection);
        PublishResponse::from_errors(errors)
    }

    /// Close every open channel (best effort, settling all closes even if
    /// some fail), then close the connection. Success requires both phases
    /// to complete cleanly.
    pub async fn stop(&mut self) -> PublishResponse {
        let mut errors = Vec::new();

        if let Some(err) = self.close_channels().await {
            errors.push(err);
        }
        if let Some(err) = self.close_connection().await {
            errors.push(err);
        }

        PublishResponse::from_errors(errors)
    }

    async fn close_channels(&mut self) -> Option<PublisherError> {
        let channels: Vec<(String, Channel)> = self.channels.drain().collect();
        let closes = channels.into_iter().map(|(queue, channel)| async move {
            match channel.close(0, "closing publisher").await {
                Ok(()) => true,
                Err(err) => {
                    warn!(queue = %queue, error = %err, "Failed to close channel for queue");
                    false
                }
            }
        });

        let all_closed = join_all(closes).await.into_iter().all(|closed| closed);
        if all_closed {
            None
        } else {
            Some(PublisherError::CloseChannelsError)
        }
    }

    async fn close_connection(&mut self) -> Option<PublisherError> {
        let connection = self.connection.take()?;
        info!("Closing RabbitMQ connection");
        match connection.close(0, "closing publisher").await {
            Ok(()) => None,
            Err(err) => Some(PublisherError::CloseConnectionError(err)),
        }
    }

    /// Send raw bytes to `queue` (a real, broker-facing name) over `channel`.
    /// The success flag reflects the broker's publisher confirm: a nack
    /// yields `success=false` without a synthetic error.
    pub async fn publish(
        &self,
        channel: &Channel,
        queue: &str,
        payload: &[u8],
    ) -> PublishResponse {
        let properties = BasicProperties::default()
            .with_message_id(Uuid::new_v4().to_string().into())
            .with_timestamp(chrono::Utc::now().timestamp() as u64);

        let confirmation: Result<Confirmation, lapin::Error> = async {
            channel
                .basic_publish(
                    "",
                    queue,
                    BasicPublishOptions::default(),
                    payload,
                    properties,
                )
                .await?
                .await
        }
        .await;

        match confirmation {
            Ok(Confirmation::Nack(_)) => {
                warn!(queue = %queue, "Broker nacked published message");
                PublishResponse {
                    success: false,
                    errors: Vec::new(),
                }
            }
            Ok(_) => {
                debug!(queue = %queue, bytes = payload.len(), "Published message");
                PublishResponse::ok()
            }
            Err(source) => PublishResponse::failed(PublisherError::PublishError {
                queue: queue.to_string(),
                source,
            }),
        }
    }

    /// Publish a text payload to the queue known internally as `queue`.
    /// Returns a queue-not-found failure without contacting the broker when
    /// no channel was opened for that name.
    pub async fn publish_string(&self, queue: &str, message: &str) -> PublishResponse {
        let channel = match self.channels.get(queue) {
            Some(channel) => channel,
            None => {
                return PublishResponse::failed(PublisherError::QueueNotFound(queue.to_string()))
            }
        };
        let real_queue = self
            .real_queue_by_internal_name
            .get(queue)
            .map(String::as_str)
            .unwrap_or(queue);

        self.publish(channel, real_queue, message.as_bytes()).await
    }

    /// Serialize `message` as JSON and publish it. A serialization failure
    /// comes back as a failed response and nothing is sent.
    pub async fn publish_json<T: Serialize>(&self, queue: &str, message: &T) -> PublishResponse {
        match serde_json::to_string(message) {
            Ok(text) => self.publish_string(queue, &text).await,
            Err(err) => PublishResponse::failed(PublisherError::JsonSerializationError(err)),
        }
    }

    /// Same as [`publish_json`](Self::publish_json) but encoded as JSON5.
    pub async fn publish_json5<T: Serialize>(&self, queue: &str, message: &T) -> PublishResponse {
        match json5::to_string(message) {
            Ok(text) => self.publish_string(queue, &text).await,
            Err(err) => PublishResponse::failed(PublisherError::Json5SerializationError(err)),
        }
    }
}

async fn open_channel(
    connection: &Connection,
    real_queue: &str,
    durable: bool,
) -> Result<Channel, PublisherError> {
    let wrap = |source: lapin::Error| PublisherError::ChannelError {
        queue: real_queue.to_string(),
        source,
    };

    let channel = connection.create_channel().await.map_err(wrap)?;

    // Publisher confirms so the publish success flag reflects the broker ack
    channel
        .confirm_select(ConfirmSelectOptions::default())
        .await
        .map_err(wrap)?;

    channel
        .queue_declare(
            real_queue,
            QueueDeclareOptions {
                durable,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(wrap)?;

    debug!(queue = %real_queue, durable, "Channel opened and queue declared");
    Ok(channel)
}
