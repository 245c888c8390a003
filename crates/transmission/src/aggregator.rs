// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Grouping of pending events by destination and size-bounded batching.
//!
//! One aggregation pass:
//!
//! ```text
//!   overflow store ─┐
//!                   ├─▶ group by destination ─▶ build_and_send (concurrently)
//!   drained events ─┘            ▲                        │
//!                                │       remainder        │
//!                                └──── overflow store ◀───┘
//! ```
//!
//! A pass loops until the overflow store is empty. Every send takes at least
//! one event off its group, so the loop always terminates.

use fnv::FnvBuildHasher;
use futures::stream::{self, StreamExt};
use hashbrown::HashMap;
use tracing::{debug, warn};

use crate::config::Config;
use crate::errors::SendError;
use crate::event::{DestinationKey, Event, Response};
use crate::flusher::Flusher;
use crate::response_queue::ResponseQueue;

type Groups<M> = Vec<(DestinationKey, Vec<Event<M>>)>;

/// Events deferred by a split, waiting for the next round.
#[derive(Debug)]
pub struct OverflowStore<M> {
    entries: HashMap<DestinationKey, Vec<Event<M>>, FnvBuildHasher>,
}

impl<M> Default for OverflowStore<M> {
    fn default() -> Self {
        OverflowStore {
            entries: HashMap::with_hasher(FnvBuildHasher::default()),
        }
    }
}

impl<M> OverflowStore<M> {
    /// Appends `events` behind whatever is already deferred for `key`.
    pub fn defer(&mut self, key: DestinationKey, mut events: Vec<Event<M>>) {
        if events.is_empty() {
            return;
        }
        self.entries
            .entry(key)
            .or_default()
            .append(&mut events);
    }

    pub fn take_all(&mut self) -> Groups<M> {
        self.entries.drain().collect()
    }

    /// Number of events deferred for `key`.
    #[must_use]
    pub fn pending_for(&self, key: &DestinationKey) -> usize {
        self.entries.get(key).map_or(0, Vec::len)
    }

    /// Number of destinations with deferred events.
    #[must_use]
    pub fn destinations(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builds and sends the batch of one destination group.
#[derive(Debug)]
struct BatchSender<M> {
    flusher: Flusher,
    responses: ResponseQueue<M>,
    max_event_size_bytes: usize,
    max_batch_size_bytes: usize,
}

impl<M> BatchSender<M> {
    /// Sends the longest prefix of `events` that fits one request and
    /// returns the rest. Events that can never be sent are failed here.
    async fn build_and_send(&self, key: &DestinationKey, events: Vec<Event<M>>) -> Vec<Event<M>> {
        let mut encoded = Vec::with_capacity(events.len());
        for event in events {
            match self.encode(&event) {
                Ok(json) => encoded.push((json, event)),
                Err(err) => {
                    self.responses
                        .deliver(Response::failed(event.metadata, err))
                        .await;
                }
            }
        }
        if encoded.is_empty() {
            return Vec::new();
        }

        let sizes: Vec<usize> = encoded.iter().map(|(json, _)| json.len()).collect();
        let fit = fitting_prefix(&sizes, self.max_batch_size_bytes);
        let remainder: Vec<Event<M>> = encoded
            .split_off(fit)
            .into_iter()
            .map(|(_, event)| event)
            .collect();
        if !remainder.is_empty() {
            debug!(
                "TRANSMISSION | Batch for {}/{} over {} bytes, sending {} events and deferring {}",
                key.api_host,
                key.dataset,
                self.max_batch_size_bytes,
                encoded.len(),
                remainder.len()
            );
        }

        let payload_len = sizes[..fit].iter().sum::<usize>() + fit + 1;
        let mut batch = Vec::with_capacity(payload_len);
        let mut metadata = Vec::with_capacity(fit);
        batch.push(b'[');
        for (i, (json, event)) in encoded.into_iter().enumerate() {
            if i > 0 {
                batch.push(b',');
            }
            batch.extend_from_slice(&json);
            metadata.push(event.metadata);
        }
        batch.push(b']');

        for response in self.flusher.send(key, batch, metadata).await {
            self.responses.deliver(response).await;
        }
        remainder
    }

    fn encode(&self, event: &Event<M>) -> Result<Vec<u8>, SendError> {
        let entry = event
            .to_batch_entry()
            .map_err(|e| SendError::Encode(e.to_string()))?;
        if entry.data_size > self.max_event_size_bytes {
            warn!(
                "TRANSMISSION | Dropping event of {} bytes for dataset {}, over the {} byte limit",
                entry.data_size, event.dataset, self.max_event_size_bytes
            );
            return Err(SendError::EventTooLarge {
                max: self.max_event_size_bytes,
            });
        }
        Ok(entry.json)
    }
}

/// Number of leading entries whose JSON array (`[a,b,..]`) fits in
/// `max_batch_size_bytes`. The first entry always counts.
pub(crate) fn fitting_prefix(sizes: &[usize], max_batch_size_bytes: usize) -> usize {
    // brackets
    let mut total = 2;
    for (i, size) in sizes.iter().enumerate() {
        let added = size + usize::from(i > 0);
        if i > 0 && total + added > max_batch_size_bytes {
            return i;
        }
        total += added;
    }
    sizes.len()
}

/// Groups events by destination, keeping first-seen destination order and
/// the order of events within a destination. `deferred` goes first.
fn group_by_destination<M>(deferred: Groups<M>, events: Vec<Event<M>>) -> Groups<M> {
    let mut index: HashMap<DestinationKey, usize, FnvBuildHasher> =
        HashMap::with_hasher(FnvBuildHasher::default());
    let mut groups: Groups<M> = Vec::new();

    let mut insert = |key: DestinationKey, mut batch: Vec<Event<M>>| match index.get(&key) {
        Some(&i) => groups[i].1.append(&mut batch),
        None => {
            index.insert(key.clone(), groups.len());
            groups.push((key, batch));
        }
    };

    for (key, batch) in deferred {
        insert(key, batch);
    }
    for event in events {
        insert(event.destination_key(), vec![event]);
    }
    groups
}

/// Owns the overflow store and runs aggregation passes. Only the aggregator
/// task touches it, so no locking is needed.
#[derive(Debug)]
pub struct BatchAggregator<M> {
    sender: BatchSender<M>,
    overflow: OverflowStore<M>,
    max_concurrent_batches: usize,
}

impl<M: Send> BatchAggregator<M> {
    #[must_use]
    pub fn new(flusher: Flusher, responses: ResponseQueue<M>, config: &Config) -> Self {
        BatchAggregator {
            sender: BatchSender {
                flusher,
                responses,
                max_event_size_bytes: config.max_event_size_bytes,
                max_batch_size_bytes: config.max_batch_size_bytes,
            },
            overflow: OverflowStore::default(),
            max_concurrent_batches: config.max_concurrent_batches.max(1),
        }
    }

    /// Sends `events` together with everything deferred, looping until no
    /// destination has deferred events left.
    pub async fn run_pass(&mut self, events: Vec<Event<M>>) {
        let mut pending = group_by_destination(self.overflow.take_all(), events);
        let mut rounds = 0_usize;

        while !pending.is_empty() {
            rounds += 1;
            let sender = &self.sender;
            let remainders: Groups<M> = stream::iter(pending)
                .map(|(key, events)| async move {
                    let remainder = sender.build_and_send(&key, events).await;
                    (key, remainder)
                })
                .buffer_unordered(self.max_concurrent_batches)
                .collect()
                .await;

            for (key, remainder) in remainders {
                self.overflow.defer(key, remainder);
            }
            pending = self.overflow.take_all();
        }

        if rounds > 1 {
            debug!(
                "TRANSMISSION | Aggregation pass drained overflow in {} rounds",
                rounds
            );
        }
    }

    /// Sends one destination group once, leaving any remainder in the
    /// overflow store for the next pass.
    pub async fn send_destination(&mut self, key: DestinationKey, events: Vec<Event<M>>) {
        let remainder = self.sender.build_and_send(&key, events).await;
        self.overflow.defer(key, remainder);
    }

    #[must_use]
    pub fn overflow(&self) -> &OverflowStore<M> {
        &self.overflow
    }

    pub fn overflow_mut(&mut self) -> &mut OverflowStore<M> {
        &mut self.overflow
    }
}
