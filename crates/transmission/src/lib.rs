// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Event Transmission
//!
//! Batching, compressing delivery of structured telemetry events to an
//! HTTP batch ingestion API.
//!
//! ```text
//!   add(event) ──▶ WorkQueue ──▶ AggregatorService ──▶ BatchAggregator
//!       │                                                   │
//!       │ overflow                                 per destination batch
//!       v                                                   v
//!   ResponseQueue ◀──────────── per-event Response ◀─── Flusher (gzip POST)
//! ```
//!
//! - [`transmission::Transmission`] is the batching sender; a
//!   [`writer::WriterSender`] writes JSON lines instead. Both implement
//!   [`sender::Sender`].
//! - Every event accepted by `add` produces exactly one
//!   [`event::Response`], carrying the event's metadata back to the caller.

#![deny(clippy::all)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

pub mod aggregator;
pub mod aggregator_service;
pub mod clock;
pub mod config;
pub mod constants;
pub mod errors;
pub mod event;
pub mod flusher;
pub mod http;
pub mod response_queue;
pub mod sender;
pub mod transmission;
pub mod work_queue;
pub mod writer;

pub use config::Config;
pub use errors::{SendError, TransmissionError};
pub use event::{DestinationKey, Event, Response};
pub use sender::Sender;
pub use transmission::Transmission;
pub use writer::WriterSender;
