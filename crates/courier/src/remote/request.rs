/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Delivery of step execution requests from manager to workers.
//!
//! Exactly one of two deliveries is active on a node:
//!
//! - queue delivery: requests are JSON-encoded onto a point-to-point queue
//!   channel; the queue hands each message to exactly one worker.
//! - in-process delivery: requests go to a worker in the same process over a
//!   bounded `mpsc` channel.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::mpsc;

use crate::error::{TransportError, WorkerError};
use crate::models::StepExecutionRequest;
use crate::transport::{OrderedChannel, QueueMessage};

/// Header carrying the step name on queued requests.
pub const STEP_NAME_HEADER: &str = "courier-step-name";

/// Publishes step execution requests.
#[async_trait]
pub trait RequestPublisher: Send + Sync {
    fn name(&self) -> &'static str;

    async fn publish(&self, request: &StepExecutionRequest) -> Result<(), TransportError>;
}

/// Publishes requests onto the queue transport's request channel.
pub struct QueueRequestPublisher {
    channel: Box<dyn OrderedChannel>,
}

impl QueueRequestPublisher {
    pub fn new(channel: Box<dyn OrderedChannel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl RequestPublisher for QueueRequestPublisher {
    fn name(&self) -> &'static str {
        "queue"
    }

    async fn publish(&self, request: &StepExecutionRequest) -> Result<(), TransportError> {
        let body = request
            .to_wire()
            .map_err(|e| TransportError::Encoding(e.to_string()))?;

        self.channel
            .send(QueueMessage {
                key: request.step_execution_id.to_string(),
                headers: BTreeMap::from([(
                    STEP_NAME_HEADER.to_string(),
                    request.step_name.clone(),
                )]),
                body,
            })
            .await
    }
}

/// Hands requests to a worker in the same process.
#[derive(Clone)]
pub struct InProcessRequestPublisher {
    sender: mpsc::Sender<StepExecutionRequest>,
}

impl InProcessRequestPublisher {
    /// Creates the publisher and the request source a local worker pool
    /// consumes.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<StepExecutionRequest>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl RequestPublisher for InProcessRequestPublisher {
    fn name(&self) -> &'static str {
        "in-process"
    }

    async fn publish(&self, request: &StepExecutionRequest) -> Result<(), TransportError> {
        self.sender
            .send(request.clone())
            .await
            .map_err(|_| TransportError::ChannelClosed { bucket: 0 })
    }
}

/// Where a worker pool receives requests from.
///
/// `None` means the source is exhausted and the pool should drain.
#[async_trait]
pub trait RequestSource: Send {
    async fn next_request(&mut self) -> Option<Result<StepExecutionRequest, WorkerError>>;
}

#[async_trait]
impl RequestSource for mpsc::Receiver<StepExecutionRequest> {
    async fn next_request(&mut self) -> Option<Result<StepExecutionRequest, WorkerError>> {
        self.recv().await.map(Ok)
    }
}

#[async_trait]
impl RequestSource for Box<dyn RequestSource> {
    async fn next_request(&mut self) -> Option<Result<StepExecutionRequest, WorkerError>> {
        (**self).next_request().await
    }
}

/// Decodes JSON requests arriving on a queue channel.
pub struct QueueRequestSource {
    receiver: mpsc::Receiver<QueueMessage>,
}

impl QueueRequestSource {
    pub fn new(receiver: mpsc::Receiver<QueueMessage>) -> Self {
        Self { receiver }
    }
}

#[async_trait]
impl RequestSource for QueueRequestSource {
    async fn next_request(&mut self) -> Option<Result<StepExecutionRequest, WorkerError>> {
        let message = self.receiver.recv().await?;
        Some(
            StepExecutionRequest::from_wire(&message.body)
                .map_err(|e| WorkerError::Decode(e.to_string())),
        )
    }
}
