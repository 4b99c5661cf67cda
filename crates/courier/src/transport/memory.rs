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

//! In-process transport backends.
//!
//! Used by single-node deployments and tests. Both backends can be told to
//! fail or slow down so the dispatch path's failure handling can be exercised
//! without a broker.

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::log::{DeliveryFuture, LogClient};
use super::queue::{OrderedChannel, QueueMessage};
use super::TransportMessage;
use crate::error::TransportError;

/// Ordered channel backed by a bounded `tokio::sync::mpsc` queue.
///
/// A send completes once the message is buffered; a full queue applies
/// backpressure to the sender.
pub struct InMemoryQueue {
    bucket: usize,
    sender: mpsc::Sender<QueueMessage>,
    /// Sends left before the channel starts failing, `None` = never fails
    send_budget: Mutex<Option<usize>>,
    send_delay: Mutex<Option<Duration>>,
}

impl InMemoryQueue {
    /// Opens a channel for `bucket` and returns it with its consumer end.
    pub fn bounded(bucket: usize, capacity: usize) -> (Self, mpsc::Receiver<QueueMessage>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let queue = Self {
            bucket,
            sender,
            send_budget: Mutex::new(None),
            send_delay: Mutex::new(None),
        };
        (queue, receiver)
    }

    /// Lets the next `sends` sends through, then fails every send after.
    pub fn fail_after(&self, sends: usize) {
        *self.send_budget.lock() = Some(sends);
    }

    /// Fails every send until [`recover`](Self::recover) is called.
    pub fn set_failing(&self) {
        self.fail_after(0);
    }

    pub fn recover(&self) {
        *self.send_budget.lock() = None;
    }

    /// Delays every send by `delay` before it reaches the queue.
    pub fn set_send_delay(&self, delay: Option<Duration>) {
        *self.send_delay.lock() = delay;
    }
}

#[async_trait]
impl OrderedChannel for InMemoryQueue {
    async fn send(&self, message: QueueMessage) -> Result<(), TransportError> {
        let delay = *self.send_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        {
            let mut budget = self.send_budget.lock();
            match budget.as_mut() {
                Some(0) => {
                    return Err(TransportError::SendFailed {
                        bucket: self.bucket,
                        message: "channel rejected the message".to_string(),
                    })
                }
                Some(remaining) => *remaining -= 1,
                None => {}
            }
        }

        self.sender
            .send(message)
            .await
            .map_err(|_| TransportError::ChannelClosed {
                bucket: self.bucket,
            })
    }
}

#[derive(Default)]
struct LogState {
    partitions: Vec<Vec<TransportMessage>>,
    failing_events: HashSet<i64>,
}

/// Partitioned log kept in memory.
///
/// Records are appended at submit time; acknowledgements can be delayed to
/// simulate a broker round trip.
pub struct InMemoryLogClient {
    state: Mutex<LogState>,
    ack_delay: Mutex<Option<Duration>>,
    pending_acks: Arc<AtomicUsize>,
}

impl InMemoryLogClient {
    pub fn new(partition_count: usize) -> Self {
        Self {
            state: Mutex::new(LogState {
                partitions: vec![Vec::new(); partition_count],
                failing_events: HashSet::new(),
            }),
            ack_delay: Mutex::new(None),
            pending_acks: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Makes the delivery of `event_id` fail.
    pub fn fail_event(&self, event_id: i64) {
        self.state.lock().failing_events.insert(event_id);
    }

    pub fn clear_failures(&self) {
        self.state.lock().failing_events.clear();
    }

    pub fn set_ack_delay(&self, delay: Option<Duration>) {
        *self.ack_delay.lock() = delay;
    }

    /// Records appended to `partition`, in log order.
    pub fn partition(&self, partition: usize) -> Vec<TransportMessage> {
        self.state
            .lock()
            .partitions
            .get(partition)
            .cloned()
            .unwrap_or_default()
    }

    pub fn partition_event_ids(&self, partition: usize) -> Vec<i64> {
        self.partition(partition)
            .iter()
            .map(|message| message.event_id)
            .collect()
    }

    /// Acknowledgements submitted but not yet resolved.
    pub fn pending_acks(&self) -> usize {
        self.pending_acks.load(Ordering::SeqCst)
    }
}

impl LogClient for InMemoryLogClient {
    fn submit(
        &self,
        partition: usize,
        message: &TransportMessage,
    ) -> Result<DeliveryFuture, TransportError> {
        let mut state = self.state.lock();
        let partition_count = state.partitions.len();

        if state.failing_events.contains(&message.event_id) {
            let event_id = message.event_id;
            return Ok(async move {
                Err(TransportError::SendFailed {
                    bucket: partition,
                    message: format!("log rejected event {}", event_id),
                })
            }
            .boxed());
        }

        let log = state
            .partitions
            .get_mut(partition)
            .ok_or(TransportError::UnknownBucket {
                bucket: partition,
                channel_count: partition_count,
            })?;
        log.push(message.clone());

        let delay = *self.ack_delay.lock();
        let pending_acks = self.pending_acks.clone();
        pending_acks.fetch_add(1, Ordering::SeqCst);

        Ok(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            pending_acks.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
        .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn queue_message(key: &str) -> QueueMessage {
        QueueMessage {
            key: key.to_string(),
            headers: BTreeMap::new(),
            body: key.as_bytes().to_vec(),
        }
    }

    #[tokio::test]
    async fn test_queue_recover_after_failure() {
        let (queue, mut rx) = InMemoryQueue::bounded(4, 8);
        queue.set_failing();

        let err = queue.send(queue_message("A")).await.unwrap_err();
        assert!(matches!(err, TransportError::SendFailed { bucket: 4, .. }));

        queue.recover();
        queue.send(queue_message("B")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().key, "B");
    }

    #[tokio::test]
    async fn test_queue_reports_closed_consumer() {
        let (queue, rx) = InMemoryQueue::bounded(2, 8);
        drop(rx);

        let err = queue.send(queue_message("A")).await.unwrap_err();
        assert_eq!(err, TransportError::ChannelClosed { bucket: 2 });
    }

    #[tokio::test]
    async fn test_log_rejects_unknown_partition() {
        let client = InMemoryLogClient::new(1);
        let message = TransportMessage {
            event_id: 1,
            routing_key: "A".to_string(),
            event_type: "T".to_string(),
            idempotency_key: uuid::Uuid::new_v4(),
            payload: Vec::new(),
        };

        assert!(matches!(
            client.submit(5, &message),
            Err(TransportError::UnknownBucket { bucket: 5, .. })
        ));
        assert!(client.submit(0, &message).unwrap().await.is_ok());
        assert_eq!(client.partition_event_ids(0), vec![1]);
    }
}
