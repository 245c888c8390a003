// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Unbatched output that writes every event as one JSON line.

use async_trait::async_trait;
use std::io::{self, Write};
use std::sync::Mutex;
use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, warn};

use crate::constants::DEFAULT_RESPONSE_QUEUE_SIZE;
use crate::errors::{SendError, TransmissionError};
use crate::event::{Event, Response};
use crate::response_queue::{ResponseQueue, ResponseReceiver};
use crate::sender::Sender;

/// Writes `{"data":..,"samplerate":..,"time":..,"dataset":..}` lines to `W`
/// and reports a status-less response per event.
///
/// Writes are synchronous. On a multi-threaded runtime they run under
/// [`tokio::task::block_in_place`]; on a current-thread runtime they stall
/// the runtime, so `W` should be fast there (a buffer, a local file, stdout).
#[derive(Debug)]
pub struct WriterSender<M, W> {
    writer: Mutex<W>,
    block_on_response: bool,
    response_queue_size: usize,
    responses: Mutex<Option<ResponseQueue<M>>>,
    receiver: Mutex<Option<ResponseReceiver<M>>>,
}

impl<M> WriterSender<M, io::Stdout> {
    #[must_use]
    pub fn stdout() -> Self {
        WriterSender::new(io::stdout())
    }
}

impl<M, W: Write> WriterSender<M, W> {
    #[must_use]
    pub fn new(writer: W) -> Self {
        WriterSender {
            writer: Mutex::new(writer),
            block_on_response: false,
            response_queue_size: DEFAULT_RESPONSE_QUEUE_SIZE,
            responses: Mutex::new(None),
            receiver: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_block_on_response(mut self, block_on_response: bool) -> Self {
        self.block_on_response = block_on_response;
        self
    }

    /// Zero means the default size.
    #[must_use]
    pub fn with_response_queue_size(mut self, size: usize) -> Self {
        self.response_queue_size = if size == 0 {
            DEFAULT_RESPONSE_QUEUE_SIZE
        } else {
            size
        };
        self
    }

    /// Gives back the underlying writer.
    pub fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_line(&self, event: &Event<M>) -> Result<(), SendError> {
        let mut line = event
            .to_line_json()
            .map_err(|e| SendError::Encode(e.to_string()))?;
        line.push(b'\n');

        #[allow(clippy::expect_used)]
        let mut writer = self.writer.lock().expect("lock poisoned");
        writer
            .write_all(&line)
            .and_then(|()| writer.flush())
            .map_err(|e| SendError::Write(e.to_string()))
    }

    fn write_off_runtime(&self, event: &Event<M>) -> Result<(), SendError> {
        match Handle::try_current().map(|handle| handle.runtime_flavor()) {
            Ok(RuntimeFlavor::MultiThread) => {
                tokio::task::block_in_place(|| self.write_line(event))
            }
            _ => self.write_line(event),
        }
    }
}

#[async_trait]
impl<M, W> Sender<M> for WriterSender<M, W>
where
    M: Send + 'static,
    W: Write + Send,
{
    async fn add(&self, event: Event<M>) {
        let err = self.write_off_runtime(&event).err();
        if let Some(e) = &err {
            warn!("TRANSMISSION | Failed to write event: {}", e);
        }

        let responses = {
            #[allow(clippy::expect_used)]
            let responses = self.responses.lock().expect("lock poisoned");
            responses.clone()
        };
        let Some(responses) = responses else {
            debug!("TRANSMISSION | Writer not started, discarding response");
            return;
        };
        responses
            .deliver(Response {
                status_code: None,
                body: None,
                duration: Duration::ZERO,
                metadata: event.metadata,
                err,
            })
            .await;
    }

    fn start(&self) -> Result<(), TransmissionError> {
        #[allow(clippy::expect_used)]
        let mut responses = self.responses.lock().expect("lock poisoned");
        if responses.is_some() {
            return Err(TransmissionError::AlreadyStarted);
        }
        let (queue, receiver) =
            ResponseQueue::channel(self.response_queue_size, self.block_on_response);
        *responses = Some(queue);
        #[allow(clippy::expect_used)]
        let mut slot = self.receiver.lock().expect("lock poisoned");
        *slot = Some(receiver);
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransmissionError> {
        #[allow(clippy::expect_used)]
        let stopped = self.responses.lock().expect("lock poisoned").take();
        match stopped {
            Some(_) => Ok(()),
            None => Err(TransmissionError::NotRunning),
        }
    }

    #[allow(clippy::expect_used)]
    fn take_responses(&self) -> Option<ResponseReceiver<M>> {
        self.receiver.lock().expect("lock poisoned").take()
    }
}
