// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Events handed to a sender and the per-event outcome records it reports back.

use chrono::{DateTime, SecondsFormat, Utc};
use derive_more::Display;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::errors::SendError;

/// One telemetry record plus its routing information.
///
/// `metadata` is never inspected; it is moved into the [`Response`] produced
/// for this event so callers can correlate outcomes.
#[derive(Debug, Clone)]
pub struct Event<M> {
    pub api_host: String,
    pub write_key: String,
    pub dataset: String,
    /// 1 means unsampled and is left off the wire.
    pub sample_rate: u32,
    pub timestamp: Option<DateTime<Utc>>,
    pub metadata: M,
    pub data: Map<String, Value>,
}

impl<M> Event<M> {
    #[must_use]
    pub fn new(
        api_host: impl Into<String>,
        write_key: impl Into<String>,
        dataset: impl Into<String>,
        metadata: M,
    ) -> Self {
        Event {
            api_host: api_host.into(),
            write_key: write_key.into(),
            dataset: dataset.into(),
            sample_rate: 1,
            timestamp: None,
            metadata,
            data: Map::new(),
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    #[must_use]
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn add_field(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }

    /// Events with equal keys may share one wire batch.
    #[must_use]
    pub fn destination_key(&self) -> DestinationKey {
        DestinationKey {
            api_host: self.api_host.clone(),
            write_key: self.write_key.clone(),
            dataset: self.dataset.clone(),
        }
    }

    /// The batch-array element for this event,
    /// `{"data":..,"samplerate":..,"time":..}`, encoded in one pass that also
    /// measures the `data` object.
    pub(crate) fn to_batch_entry(&self) -> Result<BatchEntry, serde_json::Error> {
        let mut json = DATA_PREFIX.to_vec();
        serde_json::to_writer(&mut json, &self.data)?;
        let data_size = json.len() - DATA_PREFIX.len();

        // `{}` or `{"samplerate":..}`; its fields follow `data`.
        let tail = serde_json::to_vec(&self.wire_tail(None))?;
        if tail.len() > 2 {
            json.push(b',');
            json.extend_from_slice(&tail[1..]);
        } else {
            json.push(b'}');
        }
        Ok(BatchEntry { json, data_size })
    }

    /// A standalone line for stream output, which also names the dataset.
    pub(crate) fn to_line_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        let dataset = Some(self.dataset.as_str()).filter(|dataset| !dataset.is_empty());
        serde_json::to_vec(&WireEvent {
            data: &self.data,
            tail: self.wire_tail(dataset),
        })
    }

    fn wire_tail<'a>(&'a self, dataset: Option<&'a str>) -> WireTail<'a> {
        WireTail {
            sample_rate: self.sample_rate,
            timestamp: self.timestamp.as_ref(),
            dataset,
        }
    }
}

const DATA_PREFIX: &[u8] = br#"{"data":"#;

/// An encoded batch-array element.
#[derive(Debug)]
pub(crate) struct BatchEntry {
    pub json: Vec<u8>,
    /// Length of the serialized `data` object, the part the size ceiling applies to.
    pub data_size: usize,
}

#[derive(Serialize)]
struct WireEvent<'a> {
    data: &'a Map<String, Value>,
    #[serde(flatten)]
    tail: WireTail<'a>,
}

#[derive(Serialize)]
struct WireTail<'a> {
    #[serde(rename = "samplerate", skip_serializing_if = "is_unsampled")]
    sample_rate: u32,
    #[serde(
        rename = "time",
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_timestamp"
    )]
    timestamp: Option<&'a DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dataset: Option<&'a str>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_unsampled(sample_rate: &u32) -> bool {
    *sample_rate <= 1
}

fn serialize_timestamp<S: Serializer>(
    timestamp: &Option<&DateTime<Utc>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match timestamp {
        Some(timestamp) => {
            serializer.serialize_str(&timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true))
        }
        None => serializer.serialize_none(),
    }
}

/// Identifies the (host, write key, dataset) stream an event is bound for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("{api_host}_{write_key}_{dataset}")]
pub struct DestinationKey {
    pub api_host: String,
    pub write_key: String,
    pub dataset: String,
}

/// Outcome of one event.
#[derive(Debug, Clone)]
pub struct Response<M> {
    /// `None` when the event never reached the network.
    pub status_code: Option<u16>,
    /// Raw response body, set only for batch-level HTTP errors.
    pub body: Option<Vec<u8>>,
    /// Wall-clock time of the network exchange the event was part of.
    pub duration: Duration,
    pub metadata: M,
    pub err: Option<SendError>,
}

impl<M> Response<M> {
    /// A response for an event that never reached the network.
    #[must_use]
    pub fn failed(metadata: M, err: SendError) -> Self {
        Response {
            status_code: None,
            body: None,
            duration: Duration::ZERO,
            metadata,
            err: Some(err),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.err.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_batch_json_omits_defaults() {
        let event = Event::new("http://host", "key", "ds", ());
        let encoded = event.to_batch_entry().unwrap().json;
        assert_eq!(String::from_utf8(encoded).unwrap(), r#"{"data":{}}"#);
    }

    #[test]
    fn test_batch_json_includes_sample_rate_and_time() {
        let timestamp = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let event = Event::new("http://host", "key", "ds", ())
            .with_data(fields(json!({"foo": "bar"})))
            .with_sample_rate(4)
            .with_timestamp(timestamp);
        let encoded = event.to_batch_entry().unwrap().json;
        assert_eq!(
            String::from_utf8(encoded).unwrap(),
            r#"{"data":{"foo":"bar"},"samplerate":4,"time":"2024-03-01T12:30:00Z"}"#
        );
    }

    #[test]
    fn test_line_json_names_dataset() {
        let timestamp = Utc.with_ymd_and_hms(1, 1, 1, 0, 0, 1).unwrap();
        let mut event = Event::new("", "", "dataset", ())
            .with_sample_rate(2)
            .with_timestamp(timestamp);
        event.add_field("key", "val");
        let encoded = event.to_line_json().unwrap();
        assert_eq!(
            String::from_utf8(encoded).unwrap(),
            r#"{"data":{"key":"val"},"samplerate":2,"time":"0001-01-01T00:00:01Z","dataset":"dataset"}"#
        );
    }

    #[test]
    fn test_sample_rate_zero_is_omitted() {
        let event = Event::new("h", "k", "d", ()).with_sample_rate(0);
        let encoded = event.to_batch_entry().unwrap().json;
        assert_eq!(String::from_utf8(encoded).unwrap(), r#"{"data":{}}"#);
    }

    #[test]
    fn test_batch_entry_measures_data_only() {
        let timestamp = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let event = Event::new("h", "k", "d", ())
            .with_data(fields(json!({"a": 1})))
            .with_sample_rate(10)
            .with_timestamp(timestamp);
        let entry = event.to_batch_entry().unwrap();
        assert_eq!(entry.data_size, r#"{"a":1}"#.len());
        assert_eq!(
            String::from_utf8(entry.json).unwrap(),
            r#"{"data":{"a":1},"samplerate":10,"time":"2024-03-01T12:30:00Z"}"#
        );
    }

    #[test]
    fn test_destination_key() {
        let a = Event::new("http://fakeHost:8080", "written", "ds1", 1);
        let b = Event::new("http://fakeHost:8080", "written", "ds1", 2);
        let c = Event::new("http://fakeHost:8080", "written", "ds2", 3);
        assert_eq!(a.destination_key(), b.destination_key());
        assert_ne!(a.destination_key(), c.destination_key());
        assert_eq!(
            a.destination_key().to_string(),
            "http://fakeHost:8080_written_ds1"
        );
    }

    #[test]
    fn test_failed_response() {
        let response = Response::failed("meta", SendError::QueueOverflow);
        assert_eq!(response.status_code, None);
        assert!(response.body.is_none());
        assert_eq!(response.duration, Duration::ZERO);
        assert_eq!(response.metadata, "meta");
        assert!(!response.is_success());
    }
}
