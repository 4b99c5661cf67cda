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

//! Outbox Event Model
//!
//! This module defines the domain structures for the event outbox. Domain
//! code appends events in the same transaction as its own state change; the
//! dispatcher later delivers them and flips them to `Sent`.
//!
//! The outbox provides:
//! - Durable recording of events before any delivery attempt
//! - Per-routing-key FIFO ordering via the monotonically increasing `id`
//! - At-least-once delivery: events stay `Pending` until a transport confirms

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delivery status of an outbox event.
///
/// There is no in-flight status: a crash mid-send leaves the event `Pending`
/// and it is delivered again on the next cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    Pending,
    Sent,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "PENDING",
            OutboxStatus::Sent => "SENT",
        }
    }
}

/// Represents an outbox event (domain type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxEvent {
    /// Assigned at persist time, defines FIFO order within a routing key
    pub id: i64,
    /// Identifies the logical stream (entity or tenant identifier)
    pub routing_key: String,
    /// Name of the business event type, used for enablement and by consumers
    pub event_type: String,
    /// Stable identifier consumers use to discard redeliveries
    pub idempotency_key: Uuid,
    /// Opaque encoded event body
    pub payload: Vec<u8>,
    pub status: OutboxStatus,
    pub created_at: DateTime<Utc>,
    /// Set when the event is marked sent
    pub sent_at: Option<DateTime<Utc>>,
}

impl OutboxEvent {
    pub fn is_pending(&self) -> bool {
        self.status == OutboxStatus::Pending
    }
}

/// Structure for appending new outbox events (domain type).
///
/// The store assigns `id`, `status` and timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOutboxEvent {
    pub routing_key: String,
    pub event_type: String,
    pub idempotency_key: Uuid,
    pub payload: Vec<u8>,
}

impl NewOutboxEvent {
    /// Creates a new event with a fresh idempotency key.
    pub fn new(
        event_type: impl Into<String>,
        routing_key: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            routing_key: routing_key.into(),
            event_type: event_type.into(),
            idempotency_key: Uuid::new_v4(),
            payload: payload.into(),
        }
    }
}
