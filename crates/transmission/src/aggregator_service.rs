// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::aggregator::BatchAggregator;
use crate::event::Event;
use crate::work_queue::WorkQueue;

/// The single task that runs aggregation passes.
///
/// A pass runs every `batch_timeout` and whenever the work queue reports
/// that enough events are pending. Passes never overlap. On cancellation
/// the queue is closed and one last pass flushes everything left.
pub struct AggregatorService<M> {
    aggregator: BatchAggregator<M>,
    work: Arc<WorkQueue<Event<M>>>,
    batch_timeout: Duration,
    cancel: CancellationToken,
}

impl<M: Send> AggregatorService<M> {
    #[must_use]
    pub fn new(
        aggregator: BatchAggregator<M>,
        work: Arc<WorkQueue<Event<M>>>,
        batch_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        AggregatorService {
            aggregator,
            work,
            batch_timeout,
            cancel,
        }
    }

    pub async fn run(mut self) {
        debug!("TRANSMISSION | Aggregator service started");

        let mut ticker = interval(self.batch_timeout);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await; // discard first tick

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    trace!("TRANSMISSION | Batch timeout elapsed");
                    self.pass().await;
                }
                () = self.work.batch_ready() => {
                    trace!("TRANSMISSION | Batch trigger size reached");
                    self.pass().await;
                }
            }
        }

        debug!("TRANSMISSION | Aggregator service shutting down");
        self.work.close();
        self.pass().await;
        debug!("TRANSMISSION | Aggregator service stopped");
    }

    async fn pass(&mut self) {
        let events = self.work.drain();
        if events.is_empty() && self.aggregator.overflow().is_empty() {
            return;
        }
        debug!("TRANSMISSION | Aggregation pass over {} events", events.len());
        self.aggregator.run_pass(events).await;
    }
}
