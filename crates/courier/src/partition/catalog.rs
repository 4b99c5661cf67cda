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

//! The set of partitioned jobs a node knows about, split into enabled jobs
//! and jobs disabled by invalid configuration.

use std::collections::BTreeMap;
use tracing::{error, info};

use super::{JobPartitionPlanner, Partition};
use crate::config::{ConfigViolation, JobPartitionConfig, Validate};
use crate::error::CoordinatorError;

/// Jobs validated once at startup.
///
/// An invalid job is disabled for the lifetime of the process; it never
/// produces partitions at run time.
#[derive(Debug, Clone, Default)]
pub struct JobCatalog {
    enabled: BTreeMap<String, JobPartitionConfig>,
    disabled: BTreeMap<String, Vec<ConfigViolation>>,
}

impl JobCatalog {
    /// Validates every job and sorts it into the enabled or disabled set.
    pub fn from_configs<'a>(jobs: impl IntoIterator<Item = &'a JobPartitionConfig>) -> Self {
        let mut catalog = Self::default();

        for job in jobs {
            let violations = job.violations();
            if violations.is_empty() {
                info!(job_name = %job.job_name, partition_size = job.partition_size, "Partitioned job enabled");
                catalog.enabled.insert(job.job_name.clone(), job.clone());
            } else {
                for violation in &violations {
                    error!(job_name = %job.job_name, "Partitioned job disabled: {}", violation);
                }
                catalog.disabled.insert(job.job_name.clone(), violations);
            }
        }

        catalog
    }

    /// Configuration of an enabled job.
    pub fn job(&self, job_name: &str) -> Result<&JobPartitionConfig, CoordinatorError> {
        if let Some(config) = self.enabled.get(job_name) {
            return Ok(config);
        }
        match self.disabled.get(job_name) {
            Some(violations) => Err(CoordinatorError::JobDisabled {
                job_name: job_name.to_string(),
                violations: violations.clone(),
            }),
            None => Err(CoordinatorError::UnknownJob(job_name.to_string())),
        }
    }

    /// Plans partitions for a run of an enabled job.
    pub fn plan(&self, job_name: &str, total_units: u64) -> Result<Vec<Partition>, CoordinatorError> {
        let config = self.job(job_name)?;
        Ok(JobPartitionPlanner::plan(total_units, config))
    }

    pub fn is_enabled(&self, job_name: &str) -> bool {
        self.enabled.contains_key(job_name)
    }

    pub fn enabled_jobs(&self) -> impl Iterator<Item = &JobPartitionConfig> {
        self.enabled.values()
    }

    pub fn disabled_jobs(&self) -> impl Iterator<Item = (&str, &[ConfigViolation])> {
        self.disabled
            .iter()
            .map(|(name, violations)| (name.as_str(), violations.as_slice()))
    }
}
