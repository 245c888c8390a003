// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Error attached to a [`crate::event::Response`] when an event was not
/// accepted.
///
/// None of these are ever returned to the caller of `add`; they travel back
/// through the response channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("queue overflow")]
    QueueOverflow,

    #[error("event exceeds max event size of {max} bytes, API will not accept this event")]
    EventTooLarge { max: usize },

    #[error("failed to encode event: {0}")]
    Encode(String),

    #[error("failed to compress batch: {0}")]
    Compress(String),

    #[error("invalid API host '{host}': {reason}")]
    InvalidApiHost { host: String, reason: String },

    #[error("invalid {name} header: {reason}")]
    InvalidHeader { name: &'static str, reason: String },

    #[error("{0}")]
    Transport(String),

    #[error("batch request failed with HTTP status {0}")]
    HttpStatus(u16),

    #[error("Got HTTP error code but couldn't read response body: {0}")]
    UnreadableBody(String),

    #[error("malformed batch response: {0}")]
    MalformedResponse(String),

    #[error("server returned {got} statuses for a batch of {expected} events")]
    StatusCountMismatch { expected: usize, got: usize },

    #[error("{0}")]
    Rejected(String),

    #[error("transmission stopped before the event could be queued")]
    Stopped,

    #[error("failed to write event: {0}")]
    Write(String),
}

/// Invalid [`crate::config::Config`] values.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be greater than 0")]
    Zero(&'static str),

    #[error("max event size ({event} bytes) cannot exceed max batch size ({batch} bytes)")]
    EventLargerThanBatch { event: usize, batch: usize },

    #[error("invalid HTTPS proxy '{0}'")]
    InvalidProxy(String),
}

/// Lifecycle misuse of a sender.
#[derive(Debug, thiserror::Error)]
pub enum TransmissionError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("Transmission already started")]
    AlreadyStarted,

    #[error("Transmission not running")]
    NotRunning,

    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),

    #[error("Aggregator service failed: {0}")]
    Service(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_error_display() {
        assert_eq!(SendError::QueueOverflow.to_string(), "queue overflow");
        assert_eq!(
            SendError::EventTooLarge { max: 100_000 }.to_string(),
            "event exceeds max event size of 100000 bytes, API will not accept this event"
        );
        assert_eq!(
            SendError::UnreadableBody("mystery read error!".to_string()).to_string(),
            "Got HTTP error code but couldn't read response body: mystery read error!"
        );
        assert_eq!(
            SendError::Rejected("bratelimited".to_string()).to_string(),
            "bratelimited"
        );
        assert_eq!(
            SendError::InvalidHeader {
                name: "write key",
                reason: "failed to parse header value".to_string(),
            }
            .to_string(),
            "invalid write key header: failed to parse header value"
        );
    }

    #[test]
    fn test_transmission_error_from_config() {
        let error: TransmissionError = ConfigError::Zero("batch_timeout").into();
        assert_eq!(
            error.to_string(),
            "Invalid configuration: batch_timeout must be greater than 0"
        );
    }
}
