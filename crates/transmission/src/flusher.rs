// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery of one destination batch and mapping of the reply to per-event
//! responses.
//!
//! ```text
//!   JSON array ──gzip──▶ POST <host>/1/batch/<dataset> ──▶ reply
//!                                                          │
//!        ┌─────────────────────────────────────────────────┘
//!        v
//!   2xx: [{"status":202},{"status":429,"error":".."}] ── zip with events
//!   non-2xx: status + raw body for every event
//!   no reply: transport error for every event
//! ```
//!
//! The Nth status object of a successful reply belongs to the Nth event of
//! the batch; any other shape fails the whole batch.

use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, CONTENT_ENCODING, CONTENT_TYPE, USER_AGENT,
};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::clock::Clock;
use crate::constants::{BATCH_ENDPOINT_PATH, WRITE_KEY_HEADER};
use crate::errors::SendError;
use crate::event::{DestinationKey, Response};

#[derive(Debug, Deserialize)]
struct BatchStatus {
    status: u16,
    #[serde(default)]
    error: Option<String>,
}

/// What came back from one batch request.
#[derive(Debug)]
pub(crate) enum Exchange {
    /// No HTTP response was obtained.
    Failed(String),
    /// A response arrived; its body may still have failed to read.
    Completed {
        status: StatusCode,
        body: Result<Vec<u8>, String>,
    },
}

#[derive(Debug, Clone)]
pub struct Flusher {
    client: reqwest::Client,
    user_agent: String,
    clock: Arc<dyn Clock>,
}

impl Flusher {
    #[must_use]
    pub fn new(client: reqwest::Client, user_agent: String, clock: Arc<dyn Clock>) -> Self {
        Flusher {
            client,
            user_agent,
            clock,
        }
    }

    /// Sends one already-encoded JSON array for `key` and returns one
    /// response per entry of `metadata`, in order.
    pub async fn send<M>(
        &self,
        key: &DestinationKey,
        batch: Vec<u8>,
        metadata: Vec<M>,
    ) -> Vec<Response<M>> {
        let url = match batch_url(key) {
            Ok(url) => url,
            Err(e) => {
                error!("TRANSMISSION | {}", e);
                return fail_all(metadata, &e);
            }
        };
        let headers = match self.headers(&key.write_key) {
            Ok(headers) => headers,
            Err(e) => {
                error!("TRANSMISSION | {}", e);
                return fail_all(metadata, &e);
            }
        };
        let body = match compress(&batch) {
            Ok(body) => body,
            Err(e) => {
                let e = SendError::Compress(e.to_string());
                error!("TRANSMISSION | {}", e);
                return fail_all(metadata, &e);
            }
        };

        debug!(
            "TRANSMISSION | Sending {} events ({} bytes, {} compressed) to {}",
            metadata.len(),
            batch.len(),
            body.len(),
            url
        );

        let start = self.clock.now();
        let result = self.client.post(url).headers(headers).body(body).send().await;
        let duration = self.clock.elapsed(start);

        let exchange = match result {
            Ok(resp) => {
                let status = resp.status();
                let body = resp
                    .bytes()
                    .await
                    .map(|body| body.to_vec())
                    .map_err(|e| e.to_string());
                Exchange::Completed { status, body }
            }
            Err(e) => {
                error!(
                    "TRANSMISSION | Failed to send batch to {}/{} after {} ms: {}",
                    key.api_host,
                    key.dataset,
                    duration.as_millis(),
                    e
                );
                Exchange::Failed(e.to_string())
            }
        };

        build_responses(exchange, duration, metadata)
    }

    fn headers(&self, write_key: &str) -> Result<HeaderMap, SendError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&self.user_agent)
                .map_err(|e| SendError::InvalidHeader {
                    name: "user agent",
                    reason: e.to_string(),
                })?,
        );
        headers.insert(
            HeaderName::from_static(WRITE_KEY_HEADER),
            HeaderValue::from_str(write_key)
                .map_err(|e| SendError::InvalidHeader {
                    name: "write key",
                    reason: e.to_string(),
                })?,
        );
        Ok(headers)
    }
}

/// `<api_host>/1/batch/<dataset>`, with the dataset percent-encoded as a path segment.
pub(crate) fn batch_url(key: &DestinationKey) -> Result<Url, SendError> {
    let invalid = |reason: String| SendError::InvalidApiHost {
        host: key.api_host.clone(),
        reason,
    };
    let mut url = Url::parse(&key.api_host).map_err(|e| invalid(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|()| invalid("host cannot be a base URL".to_string()))?
        .pop_if_empty()
        .extend(BATCH_ENDPOINT_PATH)
        .push(&key.dataset);
    Ok(url)
}

pub(crate) fn compress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 4), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

fn fail_all<M>(metadata: Vec<M>, err: &SendError) -> Vec<Response<M>> {
    metadata
        .into_iter()
        .map(|metadata| Response::failed(metadata, err.clone()))
        .collect()
}

fn with_each<M>(
    metadata: Vec<M>,
    status_code: Option<u16>,
    body: Option<&[u8]>,
    duration: Duration,
    err: Option<SendError>,
) -> Vec<Response<M>> {
    metadata
        .into_iter()
        .map(|metadata| Response {
            status_code,
            body: body.map(|body| body.to_vec()),
            duration,
            metadata,
            err: err.clone(),
        })
        .collect()
}

/// Turns the outcome of one request into exactly one response per event.
pub(crate) fn build_responses<M>(
    exchange: Exchange,
    duration: Duration,
    metadata: Vec<M>,
) -> Vec<Response<M>> {
    let (status, body) = match exchange {
        Exchange::Failed(e) => {
            return with_each(metadata, None, None, duration, Some(SendError::Transport(e)));
        }
        Exchange::Completed { status, body } => (status, body),
    };
    let status_code = Some(status.as_u16());

    if !status.is_success() {
        return match body {
            Ok(body) => {
                warn!(
                    "TRANSMISSION | Batch of {} events rejected with {}: {}",
                    metadata.len(),
                    status,
                    String::from_utf8_lossy(&body)
                );
                with_each(
                    metadata,
                    status_code,
                    Some(body.as_slice()),
                    duration,
                    Some(SendError::HttpStatus(status.as_u16())),
                )
            }
            Err(e) => with_each(
                metadata,
                status_code,
                None,
                duration,
                Some(SendError::UnreadableBody(e)),
            ),
        };
    }

    let statuses = match body
        .and_then(|body| serde_json::from_slice::<Vec<BatchStatus>>(&body).map_err(|e| e.to_string()))
    {
        Ok(statuses) => statuses,
        Err(e) => {
            error!("TRANSMISSION | Unable to parse batch response: {}", e);
            return with_each(
                metadata,
                status_code,
                None,
                duration,
                Some(SendError::MalformedResponse(e)),
            );
        }
    };

    if statuses.len() != metadata.len() {
        let err = SendError::StatusCountMismatch {
            expected: metadata.len(),
            got: statuses.len(),
        };
        error!("TRANSMISSION | {}", err);
        return with_each(metadata, status_code, None, duration, Some(err));
    }

    metadata
        .into_iter()
        .zip(statuses)
        .map(|(metadata, entry)| Response {
            status_code: Some(entry.status),
            body: None,
            duration,
            metadata,
            err: entry.error.map(SendError::Rejected),
        })
        .collect()
}
