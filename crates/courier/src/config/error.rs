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

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found in any search location")]
    ConfigNotFound,

    #[error("Failed to read configuration file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("Environment variable substitution failed: {0}")]
    EnvSubstitutionError(String),

    #[error("Unsupported configuration file format: {extension}")]
    UnsupportedFormat { extension: String },

    #[error("Configuration is invalid: {violations:?}")]
    Invalid { violations: Vec<ConfigViolation> },
}

/// A single rule broken by a configuration.
///
/// Job-scoped violations disable only the affected job. Every other
/// violation is fatal to startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigViolation {
    #[error("job name must not be empty")]
    EmptyJobName,

    #[error("job '{job_name}' is configured more than once")]
    DuplicateJob { job_name: String },

    #[error("job '{job_name}': {field} must be greater than zero")]
    NonPositiveJobSetting {
        job_name: String,
        field: &'static str,
    },

    #[error("job '{job_name}': thread_pool_max_size ({max}) is below thread_pool_core_size ({core})")]
    PoolMaxBelowCore {
        job_name: String,
        core: usize,
        max: usize,
    },

    #[error(
        "job '{job_name}': partition_size ({partition_size}) exceeds chunk_size ({chunk_size}) x \
         thread_pool_max_size ({thread_pool_max_size})"
    )]
    PartitionExceedsPoolCapacity {
        job_name: String,
        partition_size: usize,
        chunk_size: usize,
        thread_pool_max_size: usize,
    },

    #[error("dispatch: {field} must be greater than zero")]
    NonPositiveDispatchSetting { field: &'static str },

    #[error("transport: queue and log transports are both enabled, exactly one is allowed")]
    MultipleTransportsEnabled,

    #[error("transport: event dispatch is enabled but no transport is")]
    NoTransportEnabled,

    #[error("partitioning: in-process and queue request delivery are both enabled, exactly one is allowed")]
    MultipleRequestDeliveriesEnabled,

    #[error("partitioning: manager or worker role is enabled but no request delivery is")]
    NoRequestDeliveryEnabled,

    #[error("partitioning: in-process request delivery requires this node to be both manager and worker")]
    InProcessRequiresManagerAndWorker,

    #[error("partitioning: queue request delivery requires the queue transport to be enabled")]
    QueueDeliveryRequiresQueueTransport,
}

impl ConfigViolation {
    /// The job a violation is scoped to, if any.
    pub fn job_name(&self) -> Option<&str> {
        match self {
            ConfigViolation::DuplicateJob { job_name }
            | ConfigViolation::NonPositiveJobSetting { job_name, .. }
            | ConfigViolation::PoolMaxBelowCore { job_name, .. }
            | ConfigViolation::PartitionExceedsPoolCapacity { job_name, .. } => Some(job_name),
            _ => None,
        }
    }

    /// Whether the violation prevents the node from starting at all.
    pub fn is_startup_fatal(&self) -> bool {
        !matches!(
            self,
            ConfigViolation::NonPositiveJobSetting { .. }
                | ConfigViolation::PoolMaxBelowCore { .. }
                | ConfigViolation::PartitionExceedsPoolCapacity { .. }
        )
    }
}
