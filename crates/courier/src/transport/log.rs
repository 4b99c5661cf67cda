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

//! Log transport over a single shared partitioned-log client.
//!
//! Sends to one partition from one process keep their order at the log, so a
//! bucket may have several sends in flight. How many is bounded by
//! `max_in_flight_per_bucket`; with the default of one every send waits for
//! its acknowledgement before the next is submitted.

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::{FuturesOrdered, StreamExt};
use futures::FutureExt;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{Transport, TransportMessage};
use crate::error::TransportError;

/// Completion of a single submitted record.
pub type DeliveryFuture = BoxFuture<'static, Result<(), TransportError>>;

/// Client of a partitioned log.
pub trait LogClient: Send + Sync {
    /// Submits a record to `partition`, returning a future resolving once the
    /// log acknowledged it.
    ///
    /// An `Err` means the record was never enqueued.
    fn submit(
        &self,
        partition: usize,
        message: &TransportMessage,
    ) -> Result<DeliveryFuture, TransportError>;
}

/// Transport sending each bucket to the log partition of the same index.
pub struct LogTransport {
    client: Arc<dyn LogClient>,
    partition_count: usize,
    max_in_flight: usize,
}

impl LogTransport {
    pub fn new(client: Arc<dyn LogClient>, partition_count: usize) -> Self {
        Self {
            client,
            partition_count,
            max_in_flight: 1,
        }
    }

    /// Allows up to `max_in_flight` unacknowledged sends per bucket.
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }
}

#[async_trait]
impl Transport for LogTransport {
    fn name(&self) -> &'static str {
        "log"
    }

    fn bucket_count(&self) -> usize {
        self.partition_count
    }

    async fn send(
        &self,
        bucket: usize,
        messages: &[TransportMessage],
    ) -> Result<(), TransportError> {
        if bucket >= self.partition_count {
            return Err(TransportError::UnknownBucket {
                bucket,
                channel_count: self.partition_count,
            });
        }

        let mut inflight: FuturesOrdered<DeliveryFuture> = FuturesOrdered::new();

        for message in messages {
            while inflight.len() >= self.max_in_flight {
                if let Some(result) = inflight.next().await {
                    result.inspect_err(|e| warn!(bucket, error = %e, "Log delivery failed"))?;
                }
            }

            // The first failed acknowledgement ends the bucket, even when it
            // arrived while the window still had room.
            while let Some(Some(result)) = inflight.next().now_or_never() {
                result.inspect_err(|e| warn!(bucket, error = %e, "Log delivery failed"))?;
            }

            inflight.push_back(self.client.submit(bucket, message)?);
        }

        while let Some(result) = inflight.next().await {
            result.inspect_err(|e| warn!(bucket, error = %e, "Log delivery failed"))?;
        }

        debug!(bucket, message_count = messages.len(), "Log partition acknowledged bucket");
        Ok(())
    }
}
