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

//! Producer-side entry point of the outbox.

use metrics::counter;
use std::sync::Arc;
use tracing::debug;

use super::EventOutboxStore;
use crate::config::EventSettings;
use crate::dispatcher::WorkSignal;
use crate::error::StoreError;
use crate::models::{NewOutboxEvent, OutboxEvent};

/// Records business events into the outbox.
///
/// Event types disabled in [`EventSettings`] are dropped before they reach
/// the store.
#[derive(Clone)]
pub struct OutboxRecorder {
    store: Arc<dyn EventOutboxStore>,
    settings: EventSettings,
    signal: Option<WorkSignal>,
}

impl OutboxRecorder {
    pub fn new(store: Arc<dyn EventOutboxStore>, settings: EventSettings) -> Self {
        Self {
            store,
            settings,
            signal: None,
        }
    }

    /// Wakes the given dispatch trigger after every recorded event.
    pub fn with_work_signal(mut self, signal: WorkSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Records an event, returning `None` when its type is disabled.
    pub async fn record(
        &self,
        event_type: &str,
        routing_key: &str,
        payload: Vec<u8>,
    ) -> Result<Option<OutboxEvent>, StoreError> {
        if !self.settings.is_enabled(event_type) {
            debug!(event_type, routing_key, "Event type disabled, not recording");
            counter!("courier_outbox_events_dropped_total", "event_type" => event_type.to_string())
                .increment(1);
            return Ok(None);
        }

        let event = self
            .store
            .append(NewOutboxEvent::new(event_type, routing_key, payload))
            .await?;

        debug!(
            event_id = event.id,
            event_type,
            routing_key,
            "Recorded outbox event"
        );
        counter!("courier_outbox_events_recorded_total").increment(1);

        if let Some(signal) = &self.signal {
            signal.notify();
        }

        Ok(Some(event))
    }
}
