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

//! Bounded pool running a worker over a stream of requests.
//!
//! Sized from a job's thread pool settings: at most `thread_pool_max_size`
//! requests execute at once and at most `thread_pool_queue_capacity` wait
//! in the intake queue. A full intake stops reading from the source, which
//! leaves further requests with the transport.

use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info};

use super::request::RequestSource;
use super::worker::{RemoteStepWorker, WorkerOutcome};
use crate::config::JobPartitionConfig;
use crate::error::WorkerError;

/// Tally of a pool run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolReport {
    pub completed: usize,
    pub stopped: usize,
    pub failed: usize,
    pub duplicates: usize,
    pub already_finished: usize,
    /// Requests that could not be handled at all
    pub errors: usize,
}

impl PoolReport {
    fn record(&mut self, result: Result<Result<WorkerOutcome, WorkerError>, JoinError>) {
        match result {
            Ok(Ok(WorkerOutcome::Completed)) => self.completed += 1,
            Ok(Ok(WorkerOutcome::Stopped)) => self.stopped += 1,
            Ok(Ok(WorkerOutcome::Failed)) => self.failed += 1,
            Ok(Ok(WorkerOutcome::DuplicateDiscarded)) => self.duplicates += 1,
            Ok(Ok(WorkerOutcome::AlreadyFinished)) => self.already_finished += 1,
            Ok(Err(e)) => {
                error!(error = %e, "Step execution request rejected");
                self.errors += 1;
            }
            Err(e) => {
                error!(error = %e, "Step execution task did not complete");
                self.errors += 1;
            }
        }
    }

    pub fn handled(&self) -> usize {
        self.completed
            + self.stopped
            + self.failed
            + self.duplicates
            + self.already_finished
            + self.errors
    }
}

pub struct StepWorkerPool {
    worker: Arc<RemoteStepWorker>,
    max_concurrency: usize,
    queue_capacity: usize,
}

impl StepWorkerPool {
    pub fn new(worker: Arc<RemoteStepWorker>, max_concurrency: usize, queue_capacity: usize) -> Self {
        Self {
            worker,
            max_concurrency: max_concurrency.max(1),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Pool sized from a job's thread pool settings.
    pub fn for_job(worker: Arc<RemoteStepWorker>, job: &JobPartitionConfig) -> Self {
        Self::new(worker, job.thread_pool_max_size, job.thread_pool_queue_capacity)
    }

    /// Handles requests until `source` is exhausted, then waits for the
    /// running ones.
    pub async fn run<S>(&self, mut source: S) -> PoolReport
    where
        S: RequestSource + 'static,
    {
        info!(
            max_concurrency = self.max_concurrency,
            queue_capacity = self.queue_capacity,
            "Step worker pool started"
        );

        let (intake_tx, mut intake_rx) = mpsc::channel(self.queue_capacity);
        let intake = tokio::spawn(async move {
            while let Some(item) = source.next_request().await {
                if intake_tx.send(item).await.is_err() {
                    break;
                }
            }
        });

        let permits = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();
        let mut report = PoolReport::default();

        while let Some(item) = intake_rx.recv().await {
            let request = match item {
                Ok(request) => request,
                Err(e) => {
                    report.record(Ok(Err(e)));
                    continue;
                }
            };

            let permit = match permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let worker = self.worker.clone();
            tasks.spawn(async move {
                let _permit = permit;
                worker.handle(&request).await
            });

            while let Some(done) = tasks.try_join_next() {
                report.record(done);
            }
        }

        while let Some(done) = tasks.join_next().await {
            report.record(done);
        }
        if let Err(e) = intake.await {
            error!(error = %e, "Request intake task did not complete");
        }

        info!(handled = report.handled(), "Step worker pool drained");
        report
    }
}
