// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded pending-work queue between producers and the aggregator.
//!
//! ```text
//!   producers ──try_push / push──▶ ┌───────────┐ ──drain──▶ aggregator
//!                                  │ WorkQueue │
//!   (await room when blocking)  ◀──└───────────┘──▶ batch_ready (size trigger)
//! ```
//!
//! Producers either fail fast when the queue is full ([`WorkQueue::try_push`])
//! or wait for the aggregator to make room ([`WorkQueue::push`]). The
//! aggregator takes a snapshot of everything queued with [`WorkQueue::drain`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

/// Why an item could not be queued. The item is handed back.
#[derive(Debug, PartialEq, Eq)]
pub enum PushError<T> {
    Full(T),
    Closed(T),
}

impl<T> PushError<T> {
    pub fn into_inner(self) -> T {
        match self {
            PushError::Full(item) | PushError::Closed(item) => item,
        }
    }
}

#[derive(Debug)]
pub struct WorkQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    batch_trigger_size: usize,
    closed: AtomicBool,
    space_available: Notify,
    batch_ready: Notify,
}

impl<T> WorkQueue<T> {
    /// Creates a queue holding at most `capacity` items. Once
    /// `batch_trigger_size` items are pending, [`WorkQueue::batch_ready`]
    /// resolves.
    #[must_use]
    pub fn new(capacity: usize, batch_trigger_size: usize) -> Self {
        WorkQueue {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            batch_trigger_size: batch_trigger_size.max(1),
            closed: AtomicBool::new(false),
            space_available: Notify::new(),
            batch_ready: Notify::new(),
        }
    }

    /// Queues `item` if there is room, without waiting.
    ///
    /// A queue of capacity zero rejects every item.
    pub fn try_push(&self, item: T) -> Result<(), PushError<T>> {
        self.push_within(item, self.capacity)
    }

    /// Queues `item`, waiting for the aggregator to make room if needed.
    ///
    /// A zero-capacity queue accepts one item at a time here, so a waiting
    /// producer is released by the next drain instead of waiting forever.
    pub async fn push(&self, mut item: T) -> Result<(), PushError<T>> {
        let limit = self.capacity.max(1);
        loop {
            let notified = self.space_available.notified();
            tokio::pin!(notified);
            // Register before checking so a drain between the check and the
            // await still wakes us.
            notified.as_mut().enable();

            match self.push_within(item, limit) {
                Err(PushError::Full(rejected)) => {
                    item = rejected;
                    notified.await;
                }
                result => return result,
            }
        }
    }

    fn push_within(&self, item: T, limit: usize) -> Result<(), PushError<T>> {
        let pending = {
            #[allow(clippy::expect_used)]
            let mut items = self.items.lock().expect("lock poisoned");
            // Checked under the lock so nothing lands behind the final drain.
            if self.is_closed() {
                return Err(PushError::Closed(item));
            }
            if items.len() >= limit {
                return Err(PushError::Full(item));
            }
            items.push_back(item);
            items.len()
        };

        if pending >= self.batch_trigger_size {
            self.batch_ready.notify_one();
        }
        Ok(())
    }

    /// Takes everything currently queued, oldest first.
    pub fn drain(&self) -> Vec<T> {
        let drained: Vec<T> = {
            #[allow(clippy::expect_used)]
            let mut items = self.items.lock().expect("lock poisoned");
            items.drain(..).collect()
        };
        if !drained.is_empty() {
            self.space_available.notify_waiters();
        }
        drained
    }

    /// Resolves once enough items are pending to warrant an early pass.
    pub async fn batch_ready(&self) {
        self.batch_ready.notified().await;
    }

    /// Rejects all further pushes and releases producers waiting for room.
    pub fn close(&self) {
        {
            #[allow(clippy::expect_used)]
            let _items = self.items.lock().expect("lock poisoned");
            self.closed.store(true, Ordering::Release);
        }
        self.space_available.notify_waiters();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn len(&self) -> usize {
        self.items.lock().expect("lock poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
