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

//! Manager side of remote partitioning.

use metrics::counter;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::request::RequestPublisher;
use super::store::{JobStateStore, UpdateOutcome};
use crate::error::{CoordinatorError, TransportError};
use crate::models::{
    NewStepExecution, StepExecutionRecord, StepExecutionRequest, StepExecutionStatus,
};
use crate::partition::JobCatalog;

/// A run of a partitioned job to fan out to workers.
#[derive(Debug, Clone)]
pub struct PartitionLaunch {
    /// Job execution the step executions belong to, owned by the job-state store
    pub job_execution_id: i64,
    pub job_name: String,
    /// Step every partition runs on the worker
    pub step_name: String,
    pub total_units: u64,
    /// Tenant/security context propagated to every request
    pub execution_context: Vec<u8>,
}

/// Result of launching a job's partitions.
#[derive(Debug, Clone, Default)]
pub struct LaunchReport {
    pub job_execution_id: i64,
    /// Step executions whose request was published
    pub published: Vec<StepExecutionRecord>,
    /// Step executions marked FAILED because their request could not be published
    pub failed: Vec<(StepExecutionRecord, TransportError)>,
}

impl LaunchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn partition_count(&self) -> usize {
        self.published.len() + self.failed.len()
    }
}

/// Creates one step execution per planned partition and publishes a request
/// for each.
pub struct RemoteStepCoordinator {
    catalog: Arc<JobCatalog>,
    store: Arc<dyn JobStateStore>,
    publisher: Arc<dyn RequestPublisher>,
}

impl RemoteStepCoordinator {
    pub fn new(
        catalog: Arc<JobCatalog>,
        store: Arc<dyn JobStateStore>,
        publisher: Arc<dyn RequestPublisher>,
    ) -> Self {
        Self {
            catalog,
            store,
            publisher,
        }
    }

    pub fn catalog(&self) -> &JobCatalog {
        &self.catalog
    }

    /// Plans the job and publishes a request for every partition.
    ///
    /// A partition whose request cannot be published is marked FAILED and the
    /// remaining partitions are still published.
    ///
    /// # Errors
    ///
    /// `UnknownJob` / `JobDisabled` before anything is created, `Store` when
    /// a step execution cannot be created (partitions published so far stay
    /// published).
    pub async fn launch(&self, launch: PartitionLaunch) -> Result<LaunchReport, CoordinatorError> {
        let partitions = self.catalog.plan(&launch.job_name, launch.total_units)?;
        info!(
            job_name = %launch.job_name,
            job_execution_id = launch.job_execution_id,
            partition_count = partitions.len(),
            delivery = self.publisher.name(),
            "Launching partitioned job"
        );

        let mut report = LaunchReport {
            job_execution_id: launch.job_execution_id,
            ..LaunchReport::default()
        };

        for partition in partitions {
            let record = self
                .store
                .create_step_execution(NewStepExecution {
                    job_execution_id: launch.job_execution_id,
                    step_name: launch.step_name.clone(),
                    partition,
                })
                .await?;

            let request = StepExecutionRequest {
                job_execution_id: record.job_execution_id,
                step_execution_id: record.step_execution_id,
                step_name: record.step_name.clone(),
                execution_context: launch.execution_context.clone(),
            };

            match self.publisher.publish(&request).await {
                Ok(()) => {
                    counter!("courier_partition_requests_published_total").increment(1);
                    report.published.push(record);
                }
                Err(e) => {
                    error!(
                        job_execution_id = record.job_execution_id,
                        step_execution_id = record.step_execution_id,
                        partition = partition.index,
                        error = %e,
                        "Failed to publish step execution request"
                    );
                    let record = self.mark_unpublished(record, &e).await;
                    report.failed.push((record, e));
                }
            }
        }

        if report.is_complete() {
            info!(
                job_execution_id = report.job_execution_id,
                published = report.published.len(),
                "All partition requests published"
            );
        } else {
            warn!(
                job_execution_id = report.job_execution_id,
                published = report.published.len(),
                failed = report.failed.len(),
                "Some partition requests could not be published"
            );
        }
        Ok(report)
    }

    async fn mark_unpublished(
        &self,
        record: StepExecutionRecord,
        cause: &TransportError,
    ) -> StepExecutionRecord {
        let failed = record.with_outcome(
            StepExecutionStatus::Failed,
            Some(format!("request not published: {}", cause)),
        );

        match self.store.update(&failed).await {
            Ok(UpdateOutcome::Updated(updated)) => updated,
            Ok(UpdateOutcome::Conflict) => {
                warn!(
                    step_execution_id = record.step_execution_id,
                    "Unpublished step execution changed concurrently, leaving it as is"
                );
                record
            }
            Err(e) => {
                error!(
                    step_execution_id = record.step_execution_id,
                    error = %e,
                    "Failed to mark unpublished step execution failed"
                );
                record
            }
        }
    }
}
