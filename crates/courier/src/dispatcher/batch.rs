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

//! Batch dispatch of pending outbox events.
//!
//! One cycle reads the oldest pending events, routes every routing key to a
//! bucket, sends all buckets through the [`DispatchCoordinator`] and marks
//! each delivered bucket sent on its own. Dispatch is bucket-atomic: a
//! failed or timed-out bucket leaves its events pending for the next cycle
//! without touching any other bucket.

use chrono::Utc;
use metrics::counter;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::config::DispatchConfig;
use super::coordinator::{BucketOutcome, DispatchCoordinator};
use super::trigger::DispatchTrigger;
use crate::error::DispatchError;
use crate::models::OutboxEvent;
use crate::outbox::EventOutboxStore;
use crate::routing::PartitionRouter;
use crate::transport::{Transport, TransportMessage};

/// What happened to one bucket in a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketReport {
    pub bucket: usize,
    /// Events of the bucket, in send order
    pub event_ids: Vec<i64>,
    pub outcome: BucketOutcome,
    /// Whether the events were flipped to sent in the store
    pub marked_sent: bool,
}

/// Summary of one dispatch cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Number of pending events read
    pub fetched: usize,
    pub buckets: Vec<BucketReport>,
}

impl DispatchOutcome {
    /// True when there was nothing to dispatch.
    pub fn is_empty(&self) -> bool {
        self.fetched == 0
    }

    /// Ids of the events marked sent in this cycle.
    pub fn sent_event_ids(&self) -> Vec<i64> {
        self.buckets
            .iter()
            .filter(|report| report.marked_sent)
            .flat_map(|report| report.event_ids.iter().copied())
            .collect()
    }

    pub fn sent_count(&self) -> usize {
        self.buckets
            .iter()
            .filter(|report| report.marked_sent)
            .map(|report| report.event_ids.len())
            .sum()
    }

    /// Buckets whose events stay pending.
    pub fn unsent_buckets(&self) -> impl Iterator<Item = &BucketReport> {
        self.buckets.iter().filter(|report| !report.marked_sent)
    }

    pub fn is_complete(&self) -> bool {
        self.unsent_buckets().next().is_none()
    }
}

/// Reads pending events and drives them through the transport.
pub struct EventBatchDispatcher {
    store: Arc<dyn EventOutboxStore>,
    coordinator: DispatchCoordinator,
    config: DispatchConfig,
}

impl EventBatchDispatcher {
    pub fn new(
        store: Arc<dyn EventOutboxStore>,
        transport: Arc<dyn Transport>,
        config: DispatchConfig,
    ) -> Self {
        let worker_pool_size = config.worker_pool_size(transport.bucket_count());
        Self {
            store,
            coordinator: DispatchCoordinator::new(transport, worker_pool_size),
            config,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Number of buckets events are routed over.
    pub fn channel_count(&self) -> usize {
        self.coordinator.channel_count()
    }

    /// Runs one dispatch cycle over at most `max_batch_size` events.
    ///
    /// # Errors
    ///
    /// Only a failure to read from the outbox aborts the cycle. Bucket
    /// failures, timeouts and failures to mark a bucket sent are reported in
    /// the returned [`DispatchOutcome`].
    pub async fn dispatch_next_batch(
        &self,
        max_batch_size: usize,
    ) -> Result<DispatchOutcome, DispatchError> {
        let events = self.store.fetch_pending(max_batch_size).await?;
        if events.is_empty() {
            return Ok(DispatchOutcome::default());
        }

        let fetched = events.len();
        let (groups, event_ids) = self.group_by_bucket(&events);
        debug!(
            event_count = fetched,
            bucket_count = groups.len(),
            "Dispatching outbox batch"
        );

        let outcomes = self
            .coordinator
            .send_all(groups, self.config.global_timeout())
            .await;

        let mut buckets = Vec::with_capacity(outcomes.len());
        for (bucket, outcome) in outcomes {
            let ids = event_ids.get(&bucket).cloned().unwrap_or_default();
            let marked_sent = outcome.is_delivered() && self.mark_bucket_sent(bucket, &ids).await;
            buckets.push(BucketReport {
                bucket,
                event_ids: ids,
                outcome,
                marked_sent,
            });
        }

        let outcome = DispatchOutcome { fetched, buckets };
        if outcome.is_complete() {
            debug!(sent = outcome.sent_count(), "Outbox batch dispatched");
        } else {
            warn!(
                sent = outcome.sent_count(),
                pending = fetched - outcome.sent_count(),
                "Outbox batch partially dispatched, remaining events retry next cycle"
            );
        }
        Ok(outcome)
    }

    /// Dispatches until the trigger shuts down.
    ///
    /// A full, fully delivered batch is followed by another cycle right away;
    /// otherwise the loop waits on the trigger. Failed buckets are never
    /// retried within a cycle.
    pub async fn run(&self, trigger: &dyn DispatchTrigger) {
        info!(
            channel_count = self.channel_count(),
            batch_size = self.config.batch_size(),
            "Event dispatcher started"
        );

        let mut backlog = false;
        loop {
            if !backlog {
                trigger.wait_for_work().await;
            }
            if trigger.is_shutdown() {
                break;
            }

            backlog = match self.dispatch_next_batch(self.config.batch_size()).await {
                Ok(outcome) => outcome.fetched >= self.config.batch_size() && outcome.is_complete(),
                Err(e) => {
                    error!(error = %e, "Dispatch cycle aborted, retrying next cycle");
                    false
                }
            };
        }

        info!("Event dispatcher stopped");
    }

    /// Pending events in the outbox.
    pub async fn pending_count(&self) -> Result<i64, DispatchError> {
        Ok(self.store.count_pending().await?)
    }

    /// Routes events to buckets.
    ///
    /// Events arrive in id order and are appended in that order, so every
    /// routing key keeps its order inside its bucket.
    fn group_by_bucket(
        &self,
        events: &[OutboxEvent],
    ) -> (
        BTreeMap<usize, Vec<TransportMessage>>,
        BTreeMap<usize, Vec<i64>>,
    ) {
        let channel_count = self.channel_count();
        let mut routes: HashMap<&str, usize> = HashMap::new();
        let mut groups: BTreeMap<usize, Vec<TransportMessage>> = BTreeMap::new();
        let mut event_ids: BTreeMap<usize, Vec<i64>> = BTreeMap::new();

        for event in events {
            let bucket = *routes
                .entry(event.routing_key.as_str())
                .or_insert_with(|| PartitionRouter::route(&event.routing_key, channel_count));
            groups
                .entry(bucket)
                .or_default()
                .push(TransportMessage::from(event));
            event_ids.entry(bucket).or_default().push(event.id);
        }

        (groups, event_ids)
    }

    async fn mark_bucket_sent(&self, bucket: usize, ids: &[i64]) -> bool {
        match self.store.mark_sent(ids, Utc::now()).await {
            Ok(()) => {
                counter!("courier_outbox_events_sent_total").increment(ids.len() as u64);
                true
            }
            Err(e) => {
                // Delivered but still pending: the bucket is sent again next
                // cycle and consumers see a duplicate.
                error!(
                    bucket,
                    event_count = ids.len(),
                    error = %e,
                    "Failed to mark delivered bucket sent"
                );
                false
            }
        }
    }
}
