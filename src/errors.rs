// src/errors.rs

use std::time::Duration;

use lapin::Error as LapinError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PublisherError {
    #[error("Failed to connect to RabbitMQ at {uri}: {source}")]
    ConnectionError { uri: String, source: LapinError },

    #[error("Connection attempt timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("Failed to open channel for queue {queue}: {source}")]
    ChannelError { queue: String, source: LapinError },

    #[error("Queue {0} not found")]
    QueueNotFound(String),

    #[error("Failed to publish message to queue {queue}: {source}")]
    PublishError { queue: String, source: LapinError },

    #[error("Failed to serialize message to JSON: {0}")]
    JsonSerializationError(#[from] serde_json::Error),

    #[error("Failed to serialize message to JSON5: {0}")]
    Json5SerializationError(#[from] json5::Error),

    // Channel-close failures are logged per queue; one synthetic error
    // stands in for the whole close phase.
    #[error("Failed to close one or more channels")]
    CloseChannelsError,

    #[error("Failed to close connection: {0}")]
    CloseConnectionError(#[source] LapinError),
}

/// Outcome of a lifecycle or publish call. Failures come back as data here,
/// never as a panic or an error thrown across the caller boundary.
#[derive(Debug, Default)]
pub struct PublishResponse {
    pub success: bool,
    pub errors: Vec<PublisherError>,
}

impl PublishResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            errors: Vec::new(),
        }
    }

    pub fn failed(error: PublisherError) -> Self {
        Self {
            success: false,
            errors: vec![error],
        }
    }

    /// Success iff no errors were collected.
    pub fn from_errors(errors: Vec<PublisherError>) -> Self {
        Self {
            success: errors.is_empty(),
            errors,
        }
    }
}
