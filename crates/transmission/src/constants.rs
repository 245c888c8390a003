// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Limits and defaults for the batch ingestion API.
//!
//! The ingestion endpoint rejects whole requests whose uncompressed JSON array
//! is larger than [`MAX_BATCH_SIZE_BYTES`] and individual events whose field
//! data is larger than [`MAX_EVENT_SIZE_BYTES`]. The aggregator keeps every
//! request it builds under both ceilings.

use std::time::Duration;

/// Maximum serialized size of a single event's field data, in bytes.
///
/// Events above this ceiling are never put on the wire; they are failed
/// locally with [`crate::errors::SendError::EventTooLarge`].
pub const MAX_EVENT_SIZE_BYTES: usize = 100_000;

/// Maximum size of one uncompressed batch body (the JSON array), in bytes.
///
/// A destination group that serializes above this ceiling is split: the
/// longest prefix that fits is sent and the remainder is deferred to the next
/// round of the aggregation pass.
pub const MAX_BATCH_SIZE_BYTES: usize = 5_000_000;

/// Default capacity of the pending-work queue.
pub const DEFAULT_PENDING_WORK_CAPACITY: usize = 100;

/// Default capacity of the response channel.
pub const DEFAULT_RESPONSE_QUEUE_SIZE: usize = 100;

/// Default interval between timer-driven aggregation passes.
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_millis(100);

/// Number of queued events that triggers an aggregation pass before the timer fires.
pub const DEFAULT_BATCH_TRIGGER_SIZE: usize = 50;

/// Maximum number of destination batches in flight during one pass.
pub const DEFAULT_MAX_CONCURRENT_BATCHES: usize = 80;

/// Default HTTP request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Path prefix of the batch endpoint; the dataset name is appended.
pub(crate) const BATCH_ENDPOINT_PATH: [&str; 2] = ["1", "batch"];

/// Header carrying the write key.
pub(crate) const WRITE_KEY_HEADER: &str = "x-honeycomb-team";

/// Versioned client identifier sent as the base `User-Agent`.
pub(crate) const USER_AGENT_BASE: &str =
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
