// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;

use crate::errors::TransmissionError;
use crate::event::Event;
use crate::response_queue::ResponseReceiver;
use crate::transmission::Transmission;

/// Common surface of every event output, so callers can swap the batching
/// engine for a plain writer.
#[async_trait]
pub trait Sender<M: Send + 'static>: Send + Sync {
    /// Hands over one event. Failures come back as responses.
    async fn add(&self, event: Event<M>);

    fn start(&self) -> Result<(), TransmissionError>;

    async fn stop(&self) -> Result<(), TransmissionError>;

    fn take_responses(&self) -> Option<ResponseReceiver<M>>;
}

#[async_trait]
impl<M: Send + 'static> Sender<M> for Transmission<M> {
    async fn add(&self, event: Event<M>) {
        Transmission::add(self, event).await;
    }

    fn start(&self) -> Result<(), TransmissionError> {
        Transmission::start(self)
    }

    async fn stop(&self) -> Result<(), TransmissionError> {
        Transmission::stop(self).await
    }

    fn take_responses(&self) -> Option<ResponseReceiver<M>> {
        Transmission::take_responses(self)
    }
}
