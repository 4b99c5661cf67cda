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

//! In-memory outbox store for tests and single-node deployments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;

use super::EventOutboxStore;
use crate::error::StoreError;
use crate::models::{NewOutboxEvent, OutboxEvent, OutboxStatus};

#[derive(Default)]
struct Inner {
    next_id: i64,
    events: BTreeMap<i64, OutboxEvent>,
}

/// Outbox store keeping every event in a map ordered by id.
#[derive(Default)]
pub struct InMemoryOutboxStore {
    inner: Mutex<Inner>,
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a single event.
    pub fn get(&self, id: i64) -> Option<OutboxEvent> {
        self.inner.lock().events.get(&id).cloned()
    }

    /// Snapshot of every event in id order.
    pub fn events(&self) -> Vec<OutboxEvent> {
        self.inner.lock().events.values().cloned().collect()
    }
}

#[async_trait]
impl EventOutboxStore for InMemoryOutboxStore {
    async fn append(&self, event: NewOutboxEvent) -> Result<OutboxEvent, StoreError> {
        let mut inner = self.inner.lock();
        inner.next_id += 1;

        let stored = OutboxEvent {
            id: inner.next_id,
            routing_key: event.routing_key,
            event_type: event.event_type,
            idempotency_key: event.idempotency_key,
            payload: event.payload,
            status: OutboxStatus::Pending,
            created_at: Utc::now(),
            sent_at: None,
        };
        inner.events.insert(stored.id, stored.clone());

        Ok(stored)
    }

    async fn fetch_pending(&self, limit: usize) -> Result<Vec<OutboxEvent>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .events
            .values()
            .filter(|event| event.is_pending())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_sent(&self, ids: &[i64], sent_at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        for id in ids {
            if let Some(event) = inner.events.get_mut(id) {
                // A redelivered event keeps its first sent_at.
                if event.is_pending() {
                    event.status = OutboxStatus::Sent;
                    event.sent_at = Some(sent_at);
                }
            }
        }
        Ok(())
    }

    async fn count_pending(&self) -> Result<i64, StoreError> {
        let inner = self.inner.lock();
        Ok(inner.events.values().filter(|e| e.is_pending()).count() as i64)
    }
}
