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

//! # Transports
//!
//! A transport delivers the ordered events of one bucket to the outside
//! world. Two backends are provided:
//!
//! - [`QueueTransport`]: a fixed pool of pre-opened ordered channels, one per
//!   bucket. Ordering comes from sending sequentially on a dedicated channel.
//! - [`LogTransport`]: a single shared partitioned-log client. Each send names
//!   a partition index and yields a delivery future.
//!
//! Both expose the same contract through the [`Transport`] trait. A
//! transport never sees two concurrent sends for the same bucket; the
//! [`DispatchCoordinator`](crate::dispatcher::DispatchCoordinator) enforces
//! that with one lease per bucket index.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::TransportError;
use crate::models::OutboxEvent;

pub mod log;
pub mod memory;
pub mod queue;

#[cfg(feature = "kafka")]
pub mod kafka;

pub use log::{DeliveryFuture, LogClient, LogTransport};
pub use memory::{InMemoryLogClient, InMemoryQueue};
pub use queue::{OrderedChannel, QueueMessage, QueueTransport};

#[cfg(feature = "kafka")]
pub use kafka::KafkaLogClient;

/// Header names carried alongside every event.
pub mod headers {
    pub const EVENT_ID: &str = "courier-event-id";
    pub const EVENT_TYPE: &str = "courier-event-type";
    pub const IDEMPOTENCY_KEY: &str = "courier-idempotency-key";
}

/// The envelope an outbox event travels in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportMessage {
    pub event_id: i64,
    pub routing_key: String,
    pub event_type: String,
    /// Consumers deduplicate redeliveries on this key
    pub idempotency_key: Uuid,
    pub payload: Vec<u8>,
}

impl TransportMessage {
    /// Headers a backend attaches to the record it sends.
    pub fn headers(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (headers::EVENT_ID.to_string(), self.event_id.to_string()),
            (headers::EVENT_TYPE.to_string(), self.event_type.clone()),
            (
                headers::IDEMPOTENCY_KEY.to_string(),
                self.idempotency_key.to_string(),
            ),
        ])
    }
}

impl From<&OutboxEvent> for TransportMessage {
    fn from(event: &OutboxEvent) -> Self {
        Self {
            event_id: event.id,
            routing_key: event.routing_key.clone(),
            event_type: event.event_type.clone(),
            idempotency_key: event.idempotency_key,
            payload: event.payload.clone(),
        }
    }
}

/// Delivers the ordered messages of one bucket.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &'static str;

    /// Number of buckets (channels or partitions) this transport serves.
    ///
    /// The dispatcher routes routing keys over exactly this many buckets.
    fn bucket_count(&self) -> usize;

    /// Sends `messages` for `bucket` in order.
    ///
    /// Returns success only once every message is acknowledged. On failure
    /// nothing after the failed message is sent.
    async fn send(&self, bucket: usize, messages: &[TransportMessage])
        -> Result<(), TransportError>;
}
