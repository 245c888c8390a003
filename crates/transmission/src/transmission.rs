// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The batching sender: producers call [`Transmission::add`], a background
//! [`AggregatorService`] batches and delivers, and outcomes come back on the
//! receiver from [`Transmission::take_responses`].

use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::aggregator::BatchAggregator;
use crate::aggregator_service::AggregatorService;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::errors::{SendError, TransmissionError};
use crate::event::{Event, Response};
use crate::flusher::Flusher;
use crate::http::get_client;
use crate::response_queue::{ResponseQueue, ResponseReceiver};
use crate::work_queue::{PushError, WorkQueue};

struct Running<M> {
    work: Arc<WorkQueue<Event<M>>>,
    responses: ResponseQueue<M>,
    cancel: CancellationToken,
    service: JoinHandle<()>,
}

/// Batching, compressing sender of [`Event`]s.
///
/// Independent instances share nothing; each owns its HTTP client, queues
/// and background task.
pub struct Transmission<M> {
    config: Config,
    clock: Arc<dyn Clock>,
    client: reqwest::Client,
    state: Mutex<Option<Running<M>>>,
    receiver: Mutex<Option<ResponseReceiver<M>>>,
}

impl<M> std::fmt::Debug for Transmission<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transmission")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl<M: Send + 'static> Transmission<M> {
    /// Validates `config` and builds the HTTP client. Nothing runs until
    /// [`Transmission::start`].
    pub fn new(config: Config) -> Result<Self, TransmissionError> {
        let config = config.normalized();
        config.validate()?;
        let client = get_client(&config);
        Ok(Transmission {
            config,
            clock: Arc::new(SystemClock),
            client,
            state: Mutex::new(None),
            receiver: Mutex::new(None),
        })
    }

    /// Replaces the clock used to time batch requests.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Allocates the queues and spawns the aggregator service on the
    /// current tokio runtime.
    pub fn start(&self) -> Result<(), TransmissionError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TransmissionError::NoRuntime(e.to_string()))?;

        #[allow(clippy::expect_used)]
        let mut state = self.state.lock().expect("lock poisoned");
        if state.is_some() {
            return Err(TransmissionError::AlreadyStarted);
        }

        let (responses, receiver) =
            ResponseQueue::channel(self.config.response_queue_size, self.config.block_on_response);
        let work = Arc::new(WorkQueue::new(
            self.config.pending_work_capacity,
            self.config.batch_trigger_size,
        ));
        let cancel = CancellationToken::new();

        let flusher = Flusher::new(
            self.client.clone(),
            self.config.user_agent(),
            Arc::clone(&self.clock),
        );
        let aggregator = BatchAggregator::new(flusher, responses.clone(), &self.config);
        let service = AggregatorService::new(
            aggregator,
            Arc::clone(&work),
            self.config.batch_timeout,
            cancel.clone(),
        );

        *state = Some(Running {
            work,
            responses,
            cancel,
            service: runtime.spawn(service.run()),
        });
        #[allow(clippy::expect_used)]
        let mut slot = self.receiver.lock().expect("lock poisoned");
        *slot = Some(receiver);

        info!(
            "TRANSMISSION | Started with queue capacity {} and response queue size {}",
            self.config.pending_work_capacity, self.config.response_queue_size
        );
        Ok(())
    }

    /// Queues `event` for batching. Never fails: if the event cannot be
    /// queued, an error [`Response`] is delivered instead.
    pub async fn add(&self, event: Event<M>) {
        let endpoints = {
            #[allow(clippy::expect_used)]
            let state = self.state.lock().expect("lock poisoned");
            state
                .as_ref()
                .map(|running| (Arc::clone(&running.work), running.responses.clone()))
        };
        let Some((work, responses)) = endpoints else {
            error!("TRANSMISSION | Event added while not running, dropping it");
            return;
        };
        submit(&work, &responses, self.config.block_on_send, event).await;
    }

    /// Hands out the response receiver, once per [`Transmission::start`].
    #[allow(clippy::expect_used)]
    pub fn take_responses(&self) -> Option<ResponseReceiver<M>> {
        self.receiver.lock().expect("lock poisoned").take()
    }

    /// Flushes everything queued or deferred, then stops the service. The
    /// response receiver sees end-of-stream once the last response is in.
    pub async fn stop(&self) -> Result<(), TransmissionError> {
        let running = {
            #[allow(clippy::expect_used)]
            let mut state = self.state.lock().expect("lock poisoned");
            state.take()
        };
        let Some(running) = running else {
            return Err(TransmissionError::NotRunning);
        };

        debug!("TRANSMISSION | Stopping, flushing pending events");
        running.cancel.cancel();
        running
            .service
            .await
            .map_err(|e| TransmissionError::Service(e.to_string()))?;
        info!("TRANSMISSION | Stopped");
        Ok(())
    }
}

/// Dropping a running transmission cancels its service without waiting.
/// The service still runs its final pass, then the receiver sees
/// end-of-stream.
impl<M> Drop for Transmission<M> {
    fn drop(&mut self) {
        let running = match self.state.get_mut() {
            Ok(state) => state.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(running) = running {
            debug!("TRANSMISSION | Dropped while running, cancelling service");
            running.cancel.cancel();
        }
    }
}

/// Places `event` on the work queue, or resolves it with an error response
/// if that is not possible.
pub(crate) async fn submit<M>(
    work: &WorkQueue<Event<M>>,
    responses: &ResponseQueue<M>,
    block_on_send: bool,
    event: Event<M>,
) {
    let result = if block_on_send {
        work.push(event).await
    } else {
        work.try_push(event)
    };

    let response = match result {
        Ok(()) => return,
        Err(PushError::Full(event)) => {
            debug!("TRANSMISSION | Work queue full, failing event");
            Response::failed(event.metadata, SendError::QueueOverflow)
        }
        Err(PushError::Closed(event)) => {
            debug!("TRANSMISSION | Work queue closed, failing event");
            Response::failed(event.metadata, SendError::Stopped)
        }
    };
    responses.deliver(response).await;
}
