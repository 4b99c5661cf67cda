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

//! Exclusive per-channel leases.
//!
//! Transport channels are not safe for concurrent sends. Every bucket index
//! has a single-permit semaphore; a bucket task holds the `ChannelLease` for
//! its index for as long as it sends. A task abandoned by a timed-out cycle
//! keeps its lease until its send resolves, so the next cycle's task for the
//! same channel waits instead of interleaving with it.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::TransportError;

/// Exclusive right to send on one channel index.
///
/// Dropping the lease frees the channel.
#[derive(Debug)]
pub struct ChannelLease {
    bucket: usize,
    _permit: OwnedSemaphorePermit,
}

impl ChannelLease {
    pub fn bucket(&self) -> usize {
        self.bucket
    }
}

/// One lease slot per channel index, shared across dispatch cycles.
#[derive(Debug, Clone)]
pub struct ChannelLeases {
    slots: Arc<Vec<Arc<Semaphore>>>,
}

impl ChannelLeases {
    pub fn new(channel_count: usize) -> Self {
        let slots = (0..channel_count)
            .map(|_| Arc::new(Semaphore::new(1)))
            .collect();
        Self {
            slots: Arc::new(slots),
        }
    }

    pub fn channel_count(&self) -> usize {
        self.slots.len()
    }

    /// Waits until `bucket` is free and takes it.
    ///
    /// # Errors
    ///
    /// `UnknownBucket` for an index outside the pool, `ChannelClosed` if the
    /// pool was closed.
    pub async fn acquire(&self, bucket: usize) -> Result<ChannelLease, TransportError> {
        let slot = self
            .slots
            .get(bucket)
            .ok_or(TransportError::UnknownBucket {
                bucket,
                channel_count: self.slots.len(),
            })?;

        let permit = slot
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TransportError::ChannelClosed { bucket })?;

        Ok(ChannelLease {
            bucket,
            _permit: permit,
        })
    }

    /// Whether a task currently holds `bucket`.
    pub fn is_leased(&self, bucket: usize) -> bool {
        self.slots
            .get(bucket)
            .map(|slot| slot.available_permits() == 0)
            .unwrap_or(false)
    }

    /// Closes every slot; pending and future acquisitions fail.
    pub fn close(&self) {
        for slot in self.slots.iter() {
            slot.close();
        }
    }
}
