// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded channel delivering [`Response`]s to the application.
//!
//! Delivery either waits for room (`block_on_response`) or drops the response
//! when the consumer is not keeping up. The pipeline never stalls on a slow
//! consumer unless it was configured to.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::event::Response;

/// Consumer side of the response channel.
pub type ResponseReceiver<M> = mpsc::Receiver<Response<M>>;

/// Producer side of the response channel. Cheap to clone.
#[derive(Debug)]
pub struct ResponseQueue<M> {
    tx: mpsc::Sender<Response<M>>,
    block_on_response: bool,
}

impl<M> Clone for ResponseQueue<M> {
    fn clone(&self) -> Self {
        ResponseQueue {
            tx: self.tx.clone(),
            block_on_response: self.block_on_response,
        }
    }
}

impl<M> ResponseQueue<M> {
    /// Creates a channel holding up to `capacity` undelivered responses.
    ///
    /// A zero capacity is raised to one; a channel must be able to hold at
    /// least one response.
    #[must_use]
    pub fn channel(capacity: usize, block_on_response: bool) -> (Self, ResponseReceiver<M>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            ResponseQueue {
                tx,
                block_on_response,
            },
            rx,
        )
    }

    /// Hands a response to the consumer.
    ///
    /// Returns `false` when the response was dropped, either because the
    /// channel was full in non-blocking mode or because the receiver is gone.
    pub async fn deliver(&self, response: Response<M>) -> bool {
        if self.block_on_response {
            if self.tx.send(response).await.is_err() {
                debug!("TRANSMISSION | Response receiver closed, dropping response");
                return false;
            }
            return true;
        }

        match self.tx.try_send(response) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("TRANSMISSION | Response queue full, dropping response");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("TRANSMISSION | Response receiver closed, dropping response");
                false
            }
        }
    }

    #[must_use]
    pub fn blocks(&self) -> bool {
        self.block_on_response
    }
}
