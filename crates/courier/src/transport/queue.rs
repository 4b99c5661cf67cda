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

//! Queue transport over a fixed pool of ordered channels.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::{Transport, TransportMessage};
use crate::error::TransportError;

/// A message as it sits on a queue channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Ordering key (routing key for events)
    pub key: String,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl From<&TransportMessage> for QueueMessage {
    fn from(message: &TransportMessage) -> Self {
        Self {
            key: message.routing_key.clone(),
            headers: message.headers(),
            body: message.payload.clone(),
        }
    }
}

/// A point-to-point channel that delivers messages in the order they are
/// sent, each to exactly one consumer.
///
/// Implementations need not be safe for concurrent sends; the queue
/// transport only ever has one send in flight per channel.
#[async_trait]
pub trait OrderedChannel: Send + Sync {
    /// Sends one message, returning once the broker has accepted it.
    async fn send(&self, message: QueueMessage) -> Result<(), TransportError>;
}

#[async_trait]
impl<T: OrderedChannel + ?Sized> OrderedChannel for Arc<T> {
    async fn send(&self, message: QueueMessage) -> Result<(), TransportError> {
        (**self).send(message).await
    }
}

/// Transport owning `channel_count` pre-opened ordered channels.
///
/// Channels are created once at startup and addressed by bucket index for the
/// lifetime of the process.
pub struct QueueTransport {
    channels: Vec<Box<dyn OrderedChannel>>,
}

impl QueueTransport {
    pub fn new(channels: Vec<Box<dyn OrderedChannel>>) -> Self {
        Self { channels }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

#[async_trait]
impl Transport for QueueTransport {
    fn name(&self) -> &'static str {
        "queue"
    }

    fn bucket_count(&self) -> usize {
        self.channels.len()
    }

    async fn send(
        &self,
        bucket: usize,
        messages: &[TransportMessage],
    ) -> Result<(), TransportError> {
        let channel = self
            .channels
            .get(bucket)
            .ok_or(TransportError::UnknownBucket {
                bucket,
                channel_count: self.channels.len(),
            })?;

        for message in messages {
            channel.send(QueueMessage::from(message)).await?;
        }

        debug!(bucket, message_count = messages.len(), "Queue channel accepted bucket");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::headers;
    use crate::transport::memory::InMemoryQueue;
    use uuid::Uuid;

    fn message(event_id: i64, routing_key: &str) -> TransportMessage {
        TransportMessage {
            event_id,
            routing_key: routing_key.to_string(),
            event_type: "LoanApprovedBusinessEvent".to_string(),
            idempotency_key: Uuid::new_v4(),
            payload: format!("event-{}", event_id).into_bytes(),
        }
    }

    #[tokio::test]
    async fn test_send_preserves_order_on_one_channel() {
        let (first, mut first_rx) = InMemoryQueue::bounded(0, 16);
        let (second, mut second_rx) = InMemoryQueue::bounded(1, 16);
        let transport = QueueTransport::new(vec![Box::new(first), Box::new(second)]);

        transport
            .send(1, &[message(1, "A"), message(2, "A"), message(5, "A")])
            .await
            .unwrap();

        let mut ids = Vec::new();
        while let Ok(received) = second_rx.try_recv() {
            ids.push(received.headers[headers::EVENT_ID].clone());
        }
        assert_eq!(ids, vec!["1", "2", "5"]);
        assert!(first_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_bucket_is_rejected() {
        let (only, _rx) = InMemoryQueue::bounded(0, 1);
        let transport = QueueTransport::new(vec![Box::new(only)]);

        let result = transport.send(3, &[message(1, "A")]).await;
        assert_eq!(
            result,
            Err(TransportError::UnknownBucket {
                bucket: 3,
                channel_count: 1
            })
        );
    }

    #[tokio::test]
    async fn test_failed_channel_stops_the_bucket() {
        let (channel, mut rx) = InMemoryQueue::bounded(0, 16);
        channel.fail_after(1);
        let transport = QueueTransport::new(vec![Box::new(channel)]);

        let result = transport
            .send(0, &[message(1, "A"), message(2, "A"), message(3, "A")])
            .await;

        assert!(matches!(result, Err(TransportError::SendFailed { bucket: 0, .. })));
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err(), "nothing after the failure is sent");
    }
}
