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

//! Concurrent per-bucket fan-out with a global timeout.
//!
//! Every bucket gets its own task. A task first takes the lease of its
//! channel index, then a worker slot, then sends. All tasks share one
//! deadline; a task still running when it passes is reported as timed out
//! and left to finish on its own. It is never aborted; a late completion is
//! at most a duplicate delivery.

use metrics::counter;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use super::lease::ChannelLeases;
use crate::error::TransportError;
use crate::transport::{Transport, TransportMessage};

/// Result of sending one bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketOutcome {
    /// The transport acknowledged every message of the bucket.
    Delivered,
    /// The send failed, or its task panicked.
    Failed(TransportError),
    /// The global timeout elapsed first. The send may still complete.
    TimedOut,
}

impl BucketOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, BucketOutcome::Delivered)
    }
}

/// Fans bucket sends out over a bounded pool of tasks.
pub struct DispatchCoordinator {
    transport: Arc<dyn Transport>,
    leases: ChannelLeases,
    workers: Arc<Semaphore>,
}

impl DispatchCoordinator {
    /// Creates a coordinator over `transport` running at most
    /// `worker_pool_size` sends at once.
    pub fn new(transport: Arc<dyn Transport>, worker_pool_size: usize) -> Self {
        let leases = ChannelLeases::new(transport.bucket_count());
        Self {
            transport,
            leases,
            workers: Arc::new(Semaphore::new(worker_pool_size.max(1))),
        }
    }

    pub fn channel_count(&self) -> usize {
        self.leases.channel_count()
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Sends every group and returns one outcome per bucket.
    ///
    /// Returns once all buckets finished or `timeout` elapsed, whichever is
    /// first. A failing bucket never affects its siblings.
    pub async fn send_all(
        &self,
        groups: BTreeMap<usize, Vec<TransportMessage>>,
        timeout: Duration,
    ) -> BTreeMap<usize, BucketOutcome> {
        let deadline = Instant::now() + timeout;

        let handles: Vec<(usize, JoinHandle<Result<(), TransportError>>)> = groups
            .into_iter()
            .map(|(bucket, messages)| (bucket, self.spawn_bucket(bucket, messages)))
            .collect();

        let mut outcomes = BTreeMap::new();
        for (bucket, mut handle) in handles {
            let outcome = match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(Ok(()))) => {
                    debug!(bucket, "Bucket delivered");
                    BucketOutcome::Delivered
                }
                Ok(Ok(Err(e))) => {
                    warn!(bucket, error = %e, "Bucket send failed, events stay pending");
                    counter!("courier_dispatch_bucket_failures_total").increment(1);
                    BucketOutcome::Failed(e)
                }
                Ok(Err(join_error)) => {
                    error!(bucket, error = %join_error, "Bucket task did not complete");
                    counter!("courier_dispatch_bucket_failures_total").increment(1);
                    BucketOutcome::Failed(TransportError::SendFailed {
                        bucket,
                        message: format!("bucket task failed: {}", join_error),
                    })
                }
                Err(_) => {
                    // Dropping the handle detaches the task; it keeps its lease
                    // until the send resolves.
                    warn!(
                        bucket,
                        timeout_ms = timeout.as_millis() as u64,
                        "Bucket send timed out, abandoning it"
                    );
                    counter!("courier_dispatch_bucket_timeouts_total").increment(1);
                    BucketOutcome::TimedOut
                }
            };
            outcomes.insert(bucket, outcome);
        }

        outcomes
    }

    fn spawn_bucket(
        &self,
        bucket: usize,
        messages: Vec<TransportMessage>,
    ) -> JoinHandle<Result<(), TransportError>> {
        let transport = self.transport.clone();
        let leases = self.leases.clone();
        let workers = self.workers.clone();

        tokio::spawn(async move {
            // Lease before worker slot: a task queued behind an abandoned
            // send must not hold a slot while it waits.
            let _lease = leases.acquire(bucket).await?;
            let _slot = workers
                .acquire_owned()
                .await
                .map_err(|_| TransportError::ChannelClosed { bucket })?;

            transport.send(bucket, &messages).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::headers;
    use crate::transport::{InMemoryQueue, QueueMessage, QueueTransport};
    use async_trait::async_trait;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn message(event_id: i64, routing_key: &str) -> TransportMessage {
        TransportMessage {
            event_id,
            routing_key: routing_key.to_string(),
            event_type: "T".to_string(),
            idempotency_key: Uuid::new_v4(),
            payload: Vec::new(),
        }
    }

    fn drain(rx: &mut mpsc::Receiver<QueueMessage>) -> Vec<String> {
        let mut ids = Vec::new();
        while let Ok(received) = rx.try_recv() {
            ids.push(received.headers[headers::EVENT_ID].clone());
        }
        ids
    }

    struct Channels {
        transport: Arc<QueueTransport>,
        queues: Vec<Arc<InMemoryQueue>>,
        receivers: Vec<mpsc::Receiver<QueueMessage>>,
    }

    fn channels(count: usize) -> Channels {
        let mut queues = Vec::new();
        let mut receivers = Vec::new();
        let mut boxed: Vec<Box<dyn crate::transport::OrderedChannel>> = Vec::new();
        for bucket in 0..count {
            let (queue, rx) = InMemoryQueue::bounded(bucket, 64);
            let queue = Arc::new(queue);
            boxed.push(Box::new(queue.clone()));
            queues.push(queue);
            receivers.push(rx);
        }
        Channels {
            transport: Arc::new(QueueTransport::new(boxed)),
            queues,
            receivers,
        }
    }

    #[tokio::test]
    async fn test_failed_bucket_does_not_affect_sibling() {
        let mut setup = channels(2);
        setup.queues[1].set_failing();
        let coordinator = DispatchCoordinator::new(setup.transport.clone(), 2);

        let groups = BTreeMap::from([
            (0, vec![message(1, "A"), message(2, "A")]),
            (1, vec![message(3, "B")]),
        ]);
        let outcomes = coordinator.send_all(groups, Duration::from_secs(5)).await;

        assert_eq!(outcomes[&0], BucketOutcome::Delivered);
        assert!(matches!(outcomes[&1], BucketOutcome::Failed(_)));
        assert_eq!(drain(&mut setup.receivers[0]), vec!["1", "2"]);
        assert!(drain(&mut setup.receivers[1]).is_empty());
    }

    #[tokio::test]
    async fn test_slow_bucket_times_out_and_completes_out_of_band() {
        let mut setup = channels(2);
        setup.queues[1].set_send_delay(Some(Duration::from_millis(200)));
        let coordinator = DispatchCoordinator::new(setup.transport.clone(), 2);

        let groups = BTreeMap::from([(0, vec![message(1, "A")]), (1, vec![message(2, "B")])]);
        let start = std::time::Instant::now();
        let outcomes = coordinator
            .send_all(groups, Duration::from_millis(50))
            .await;

        assert!(start.elapsed() < Duration::from_millis(190));
        assert_eq!(outcomes[&0], BucketOutcome::Delivered);
        assert_eq!(outcomes[&1], BucketOutcome::TimedOut);

        // The abandoned send was not cancelled
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(drain(&mut setup.receivers[1]), vec!["2"]);
    }

    #[tokio::test]
    async fn test_abandoned_send_keeps_channel_exclusive() {
        let mut setup = channels(1);
        setup.queues[0].set_send_delay(Some(Duration::from_millis(150)));
        let coordinator = DispatchCoordinator::new(setup.transport.clone(), 1);

        let first = coordinator
            .send_all(
                BTreeMap::from([(0, vec![message(1, "A")])]),
                Duration::from_millis(20),
            )
            .await;
        assert_eq!(first[&0], BucketOutcome::TimedOut);
        assert!(coordinator.leases.is_leased(0));

        let second = coordinator
            .send_all(
                BTreeMap::from([(0, vec![message(2, "A")])]),
                Duration::from_millis(20),
            )
            .await;
        assert_eq!(second[&0], BucketOutcome::TimedOut);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(drain(&mut setup.receivers[0]), vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_worker_pool_bounds_concurrent_sends() {
        let setup = channels(2);
        for queue in &setup.queues {
            queue.set_send_delay(Some(Duration::from_millis(100)));
        }
        let coordinator = DispatchCoordinator::new(setup.transport.clone(), 1);

        let groups = BTreeMap::from([(0, vec![message(1, "A")]), (1, vec![message(2, "B")])]);
        let outcomes = coordinator
            .send_all(groups, Duration::from_millis(160))
            .await;

        let delivered = outcomes.values().filter(|o| o.is_delivered()).count();
        let timed_out = outcomes
            .values()
            .filter(|o| **o == BucketOutcome::TimedOut)
            .count();
        assert_eq!((delivered, timed_out), (1, 1));
    }

    struct PanickingTransport;

    #[async_trait]
    impl Transport for PanickingTransport {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn bucket_count(&self) -> usize {
            2
        }

        async fn send(
            &self,
            bucket: usize,
            _messages: &[TransportMessage],
        ) -> Result<(), TransportError> {
            if bucket == 0 {
                panic!("broken channel");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_panicking_bucket_is_a_failure() {
        let coordinator = DispatchCoordinator::new(Arc::new(PanickingTransport), 2);

        let groups = BTreeMap::from([(0, vec![message(1, "A")]), (1, vec![message(2, "B")])]);
        let outcomes = coordinator.send_all(groups, Duration::from_secs(1)).await;

        assert!(matches!(outcomes[&0], BucketOutcome::Failed(_)));
        assert_eq!(outcomes[&1], BucketOutcome::Delivered);
    }

    #[tokio::test]
    async fn test_empty_groups() {
        let setup = channels(1);
        let coordinator = DispatchCoordinator::new(setup.transport.clone(), 1);
        let outcomes = coordinator
            .send_all(BTreeMap::new(), Duration::from_millis(10))
            .await;
        assert!(outcomes.is_empty());
    }
}
