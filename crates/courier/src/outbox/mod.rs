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

//! Event outbox storage contract.
//!
//! The durable table behind this trait is owned by the host application.
//! Domain code appends events in its own transaction; the dispatcher reads
//! pending events in id order and flips them to sent one bucket at a time.
//! Events are never deleted here, retention is the host's policy.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::models::{NewOutboxEvent, OutboxEvent};

pub mod memory;
pub mod recorder;

pub use memory::InMemoryOutboxStore;
pub use recorder::OutboxRecorder;

/// Durable store of outbox events.
#[async_trait]
pub trait EventOutboxStore: Send + Sync {
    /// Persists a new event as pending and assigns its id.
    ///
    /// Ids are strictly increasing in append order.
    async fn append(&self, event: NewOutboxEvent) -> Result<OutboxEvent, StoreError>;

    /// Up to `limit` pending events, ordered by id ascending (oldest first).
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<OutboxEvent>, StoreError>;

    /// Marks the given events sent in a single local transaction.
    async fn mark_sent(&self, ids: &[i64], sent_at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Number of pending events (for monitoring).
    async fn count_pending(&self) -> Result<i64, StoreError>;
}
