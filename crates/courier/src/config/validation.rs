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

//! Startup validation of a [`CourierConfig`].
//!
//! Validation is a pure function over the typed configuration. It is run
//! once when a node is assembled; the node refuses to start a component
//! whose violations are non-empty.

use std::collections::HashSet;

use crate::config::{types::*, ConfigViolation};

pub trait Validate {
    /// Every rule the value breaks, empty when valid.
    fn violations(&self) -> Vec<ConfigViolation>;
}

impl Validate for CourierConfig {
    fn violations(&self) -> Vec<ConfigViolation> {
        let mut violations = Vec::new();

        if self.dispatch.enabled {
            violations.extend(self.dispatch.violations());
        }
        violations.extend(transport_violations(self));
        violations.extend(partitioning_violations(self));

        let mut seen = HashSet::new();
        for job in &self.jobs {
            if !job.job_name.is_empty() && !seen.insert(job.job_name.as_str()) {
                violations.push(ConfigViolation::DuplicateJob {
                    job_name: job.job_name.clone(),
                });
            }
            violations.extend(job.violations());
        }

        violations
    }
}

impl Validate for DispatchSettings {
    fn violations(&self) -> Vec<ConfigViolation> {
        let checks: [(&'static str, bool); 4] = [
            ("channel_count", self.channel_count > 0),
            ("batch_size", self.batch_size > 0),
            ("global_timeout_ms", self.global_timeout_ms > 0),
            ("max_in_flight_per_bucket", self.max_in_flight_per_bucket > 0),
        ];

        checks
            .into_iter()
            .filter(|(_, ok)| !ok)
            .map(|(field, _)| ConfigViolation::NonPositiveDispatchSetting { field })
            .collect()
    }
}

impl Validate for JobPartitionConfig {
    fn violations(&self) -> Vec<ConfigViolation> {
        if self.job_name.is_empty() {
            return vec![ConfigViolation::EmptyJobName];
        }

        let checks: [(&'static str, usize); 5] = [
            ("partition_size", self.partition_size),
            ("chunk_size", self.chunk_size),
            ("thread_pool_core_size", self.thread_pool_core_size),
            ("thread_pool_max_size", self.thread_pool_max_size),
            ("thread_pool_queue_capacity", self.thread_pool_queue_capacity),
        ];

        let mut violations: Vec<ConfigViolation> = checks
            .into_iter()
            .filter(|(_, value)| *value == 0)
            .map(|(field, _)| ConfigViolation::NonPositiveJobSetting {
                job_name: self.job_name.clone(),
                field,
            })
            .collect();

        // The sizing rules below are meaningless once a field is zero.
        if !violations.is_empty() {
            return violations;
        }

        if self.thread_pool_max_size < self.thread_pool_core_size {
            violations.push(ConfigViolation::PoolMaxBelowCore {
                job_name: self.job_name.clone(),
                core: self.thread_pool_core_size,
                max: self.thread_pool_max_size,
            });
        }

        let capacity = self.chunk_size.saturating_mul(self.thread_pool_max_size);
        if self.partition_size > capacity {
            violations.push(ConfigViolation::PartitionExceedsPoolCapacity {
                job_name: self.job_name.clone(),
                partition_size: self.partition_size,
                chunk_size: self.chunk_size,
                thread_pool_max_size: self.thread_pool_max_size,
            });
        }

        violations
    }
}

fn transport_violations(config: &CourierConfig) -> Vec<ConfigViolation> {
    let transport = &config.transport;
    match (transport.queue.enabled, transport.log.enabled) {
        (true, true) => vec![ConfigViolation::MultipleTransportsEnabled],
        (false, false) if config.dispatch.enabled => vec![ConfigViolation::NoTransportEnabled],
        _ => Vec::new(),
    }
}

fn partitioning_violations(config: &CourierConfig) -> Vec<ConfigViolation> {
    let partitioning = &config.partitioning;
    let mut violations = Vec::new();

    if partitioning.in_process_enabled && partitioning.queue_enabled {
        violations.push(ConfigViolation::MultipleRequestDeliveriesEnabled);
        return violations;
    }

    if !partitioning.is_active() {
        return violations;
    }

    if partitioning.in_process_enabled {
        if !(partitioning.manager_enabled && partitioning.worker_enabled) {
            violations.push(ConfigViolation::InProcessRequiresManagerAndWorker);
        }
    } else if partitioning.queue_enabled {
        if !config.transport.queue.enabled {
            violations.push(ConfigViolation::QueueDeliveryRequiresQueueTransport);
        }
    } else {
        violations.push(ConfigViolation::NoRequestDeliveryEnabled);
    }

    violations
}
