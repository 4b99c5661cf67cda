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

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    pub dispatch: DispatchSettings,
    pub transport: TransportSettings,
    pub partitioning: PartitioningSettings,
    pub jobs: Vec<JobPartitionConfig>,
    pub events: EventSettings,
}

impl CourierConfig {
    /// Looks up a configured job by name.
    pub fn job(&self, job_name: &str) -> Option<&JobPartitionConfig> {
        self.jobs.iter().find(|job| job.job_name == job_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    pub enabled: bool,
    pub channel_count: usize,
    pub batch_size: usize,
    pub global_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub max_in_flight_per_bucket: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            channel_count: 4,
            batch_size: 100,
            global_timeout_ms: 30_000,
            poll_interval_ms: 1_000,
            max_in_flight_per_bucket: 1,
        }
    }
}

impl DispatchSettings {
    pub fn global_timeout(&self) -> Duration {
        Duration::from_millis(self.global_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    pub queue: QueueTransportSettings,
    pub log: LogTransportSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueTransportSettings {
    pub enabled: bool,
    /// Prefix for the ordered event channels (`<prefix>.<index>`)
    pub channel_prefix: String,
    /// Queue carrying step execution requests to workers
    pub request_channel: String,
}

impl Default for QueueTransportSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            channel_prefix: "courier.events".to_string(),
            request_channel: "courier.step-requests".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogTransportSettings {
    pub enabled: bool,
    pub brokers: String,
    pub topic: String,
    pub message_timeout_ms: u64,
}

impl Default for LogTransportSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            brokers: "localhost:9092".to_string(),
            topic: "courier.events".to_string(),
            message_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitioningSettings {
    pub in_process_enabled: bool,
    pub queue_enabled: bool,
    pub manager_enabled: bool,
    pub worker_enabled: bool,
}

impl PartitioningSettings {
    pub fn is_active(&self) -> bool {
        self.manager_enabled || self.worker_enabled
    }
}

/// Sizing of a partitioned job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPartitionConfig {
    pub job_name: String,
    /// Units of work per partition
    pub partition_size: usize,
    /// Units processed per transactional chunk inside a partition
    pub chunk_size: usize,
    pub thread_pool_core_size: usize,
    pub thread_pool_max_size: usize,
    pub thread_pool_queue_capacity: usize,
}

/// Per-event-type enablement.
///
/// Types missing from `types` fall back to `default_enabled`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSettings {
    pub default_enabled: bool,
    pub types: BTreeMap<String, bool>,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            default_enabled: true,
            types: BTreeMap::new(),
        }
    }
}

impl EventSettings {
    pub fn is_enabled(&self, event_type: &str) -> bool {
        self.types
            .get(event_type)
            .copied()
            .unwrap_or(self.default_enabled)
    }
}
