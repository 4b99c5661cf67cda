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

//! Worker side of remote partitioning.
//!
//! A request moves through `RECEIVED -> RUNNING -> {COMPLETED | STOPPED | FAILED}`.
//! Whatever final status is reached is written back with the version read
//! before the step ran. Losing that write to another worker is the normal
//! result of duplicate delivery and is reported as
//! [`WorkerOutcome::DuplicateDiscarded`], not as an error.

use futures::FutureExt;
use metrics::counter;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::step::{StepContext, StepError, StepRegistry};
use super::store::{JobStateStore, UpdateOutcome};
use crate::error::WorkerError;
use crate::models::{StepExecutionRecord, StepExecutionRequest, StepExecutionStatus};

/// How a request was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    Completed,
    /// Interrupted; the partition can be retried later.
    Stopped,
    /// Terminal failure, needs operator action.
    Failed,
    /// Another worker updated the record first; this result was dropped.
    DuplicateDiscarded,
    /// The record was already terminal, so the step was not run again.
    AlreadyFinished,
}

/// Executes step execution requests against the job-state store.
pub struct RemoteStepWorker {
    registry: Arc<StepRegistry>,
    store: Arc<dyn JobStateStore>,
    interrupt: watch::Receiver<bool>,
    chunk_sizes: HashMap<String, usize>,
}

impl RemoteStepWorker {
    pub fn new(registry: Arc<StepRegistry>, store: Arc<dyn JobStateStore>) -> Self {
        // Without an interrupt sender the signal never fires.
        let (_, interrupt) = watch::channel(false);
        Self {
            registry,
            store,
            interrupt,
            chunk_sizes: HashMap::new(),
        }
    }

    /// Interrupts running steps when `true` is sent on the channel.
    pub fn with_interrupt(mut self, interrupt: watch::Receiver<bool>) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Chunk size handed to `step_name` through its context.
    pub fn with_chunk_size(mut self, step_name: impl Into<String>, chunk_size: usize) -> Self {
        self.chunk_sizes.insert(step_name.into(), chunk_size);
        self
    }

    /// Decodes a wire request and handles it.
    pub async fn handle_wire(&self, bytes: &[u8]) -> Result<WorkerOutcome, WorkerError> {
        let request = StepExecutionRequest::from_wire(bytes)
            .map_err(|e| WorkerError::Decode(e.to_string()))?;
        self.handle(&request).await
    }

    /// Runs one request to a final, persisted status.
    ///
    /// # Errors
    ///
    /// - `UnknownStep`: no step with the request's name is registered; the
    ///   record is left untouched.
    /// - `MissingStepExecution`: the store has no such step execution.
    /// - `Store`: the store failed while reading or writing.
    pub async fn handle(
        &self,
        request: &StepExecutionRequest,
    ) -> Result<WorkerOutcome, WorkerError> {
        let step = self.registry.get(&request.step_name).ok_or_else(|| {
            error!(step_name = %request.step_name, "No step registered for request");
            WorkerError::UnknownStep {
                step_name: request.step_name.clone(),
            }
        })?;

        let record = self
            .store
            .get(request.job_execution_id, request.step_execution_id)
            .await?
            .ok_or_else(|| {
                error!(
                    job_execution_id = request.job_execution_id,
                    step_execution_id = request.step_execution_id,
                    "Step execution does not exist"
                );
                WorkerError::MissingStepExecution {
                    job_execution_id: request.job_execution_id,
                    step_execution_id: request.step_execution_id,
                }
            })?;

        if record.status.is_terminal() {
            info!(
                job_execution_id = record.job_execution_id,
                step_execution_id = record.step_execution_id,
                status = record.status.as_str(),
                "Step execution already finished, discarding request"
            );
            return Ok(WorkerOutcome::AlreadyFinished);
        }

        debug!(
            job_execution_id = record.job_execution_id,
            step_execution_id = record.step_execution_id,
            step_name = %record.step_name,
            offset = record.partition.offset,
            len = record.partition.len,
            "Running step execution"
        );

        let mut ctx = StepContext::new(
            record.clone(),
            request.execution_context.clone(),
            self.interrupt.clone(),
        );
        if let Some(&chunk_size) = self.chunk_sizes.get(&record.step_name) {
            ctx = ctx.with_chunk_size(chunk_size);
        }

        let mut interrupt = self.interrupt.clone();
        let result = tokio::select! {
            result = AssertUnwindSafe(step.execute(ctx)).catch_unwind() => {
                result.unwrap_or_else(|panic| {
                    Err(StepError::Failed(format!("step panicked: {}", panic_message(&*panic))))
                })
            }
            _ = wait_for_interrupt(&mut interrupt) => Err(StepError::Interrupted),
        };

        let (status, exit_message) = match result {
            Ok(()) => (StepExecutionStatus::Completed, None),
            Err(StepError::Interrupted) => (
                StepExecutionStatus::Stopped,
                Some(StepError::Interrupted.to_string()),
            ),
            Err(e @ StepError::Failed(_)) => (StepExecutionStatus::Failed, Some(e.to_string())),
        };

        self.persist(&record, status, exit_message).await
    }

    async fn persist(
        &self,
        record: &StepExecutionRecord,
        status: StepExecutionStatus,
        exit_message: Option<String>,
    ) -> Result<WorkerOutcome, WorkerError> {
        let finished = record.with_outcome(status, exit_message);

        match self.store.update(&finished).await? {
            UpdateOutcome::Updated(updated) => {
                counter!("courier_step_executions_total", "status" => status.as_str())
                    .increment(1);
                match status {
                    StepExecutionStatus::Failed => error!(
                        job_execution_id = updated.job_execution_id,
                        step_execution_id = updated.step_execution_id,
                        exit_message = ?updated.exit_message,
                        "Step execution failed"
                    ),
                    StepExecutionStatus::Stopped => warn!(
                        job_execution_id = updated.job_execution_id,
                        step_execution_id = updated.step_execution_id,
                        "Step execution stopped, partition can be retried"
                    ),
                    _ => info!(
                        job_execution_id = updated.job_execution_id,
                        step_execution_id = updated.step_execution_id,
                        "Step execution completed"
                    ),
                }
                Ok(match status {
                    StepExecutionStatus::Completed => WorkerOutcome::Completed,
                    StepExecutionStatus::Stopped => WorkerOutcome::Stopped,
                    _ => WorkerOutcome::Failed,
                })
            }
            UpdateOutcome::Conflict => {
                warn!(
                    job_execution_id = record.job_execution_id,
                    step_execution_id = record.step_execution_id,
                    discarded_status = status.as_str(),
                    "Step execution updated by another worker, discarding duplicate result"
                );
                counter!("courier_step_version_conflicts_total").increment(1);
                Ok(WorkerOutcome::DuplicateDiscarded)
            }
        }
    }
}

/// Best-effort text of a panic payload.
fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Resolves once `true` is observed; never resolves if the sender is gone.
async fn wait_for_interrupt(interrupt: &mut watch::Receiver<bool>) {
    if interrupt.wait_for(|interrupted| *interrupted).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewStepExecution;
    use crate::partition::Partition;
    use crate::remote::step::RemoteStep;
    use crate::remote::store::InMemoryJobStateStore;
    use async_trait::async_trait;
    use std::time::Duration;
    use tracing_test::traced_test;

    struct Succeeds;

    #[async_trait]
    impl RemoteStep for Succeeds {
        async fn execute(&self, _ctx: StepContext) -> Result<(), StepError> {
            Ok(())
        }
    }

    struct Fails;

    #[async_trait]
    impl RemoteStep for Fails {
        async fn execute(&self, _ctx: StepContext) -> Result<(), StepError> {
            Err(StepError::Failed("ledger out of balance".to_string()))
        }
    }

    struct Hangs;

    #[async_trait]
    impl RemoteStep for Hangs {
        async fn execute(&self, _ctx: StepContext) -> Result<(), StepError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    struct Panics;

    #[async_trait]
    impl RemoteStep for Panics {
        async fn execute(&self, ctx: StepContext) -> Result<(), StepError> {
            let chunks = ctx.chunks();
            let _ = &chunks[chunks.len()];
            Ok(())
        }
    }

    async fn setup() -> (Arc<StepRegistry>, Arc<InMemoryJobStateStore>, StepExecutionRequest) {
        let registry = Arc::new(StepRegistry::new());
        registry.register("ok", Arc::new(Succeeds));
        registry.register("fail", Arc::new(Fails));
        registry.register("hang", Arc::new(Hangs));
        registry.register("panic", Arc::new(Panics));

        let store = Arc::new(InMemoryJobStateStore::new());
        let record = store
            .create_step_execution(NewStepExecution {
                job_execution_id: 1,
                step_name: "ok".to_string(),
                partition: Partition {
                    index: 0,
                    offset: 0,
                    len: 4,
                },
            })
            .await
            .unwrap();

        let request = StepExecutionRequest {
            job_execution_id: 1,
            step_execution_id: record.step_execution_id,
            step_name: "ok".to_string(),
            execution_context: Vec::new(),
        };
        (registry, store, request)
    }

    async fn status(store: &InMemoryJobStateStore, request: &StepExecutionRequest) -> StepExecutionStatus {
        store
            .get(request.job_execution_id, request.step_execution_id)
            .await
            .unwrap()
            .unwrap()
            .status
    }

    #[tokio::test]
    async fn test_successful_step_completes() {
        let (registry, store, request) = setup().await;
        let worker = RemoteStepWorker::new(registry, store.clone());

        assert_eq!(worker.handle(&request).await.unwrap(), WorkerOutcome::Completed);
        assert_eq!(status(&store, &request).await, StepExecutionStatus::Completed);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failing_step_records_failed() {
        let (registry, store, mut request) = setup().await;
        request.step_name = "fail".to_string();
        let worker = RemoteStepWorker::new(registry, store.clone());

        assert_eq!(worker.handle(&request).await.unwrap(), WorkerOutcome::Failed);

        let record = store
            .get(request.job_execution_id, request.step_execution_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, StepExecutionStatus::Failed);
        assert!(record.exit_message.unwrap().contains("ledger out of balance"));
        assert!(record.ended_at.is_some());
        assert!(logs_contain("Step execution failed"));
    }

    #[tokio::test]
    async fn test_panicking_step_records_failed() {
        let (registry, store, mut request) = setup().await;
        request.step_name = "panic".to_string();
        let worker = RemoteStepWorker::new(registry, store.clone());

        assert_eq!(worker.handle(&request).await.unwrap(), WorkerOutcome::Failed);

        let record = store
            .get(request.job_execution_id, request.step_execution_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, StepExecutionStatus::Failed);
        let exit_message = record.exit_message.unwrap();
        assert!(exit_message.contains("step panicked"));
        assert!(exit_message.contains("index out of bounds"));
        assert!(record.ended_at.is_some());
    }

    #[tokio::test]
    async fn test_interrupted_step_records_stopped() {
        let (registry, store, mut request) = setup().await;
        request.step_name = "hang".to_string();
        let (interrupt_tx, interrupt_rx) = watch::channel(false);
        let worker = RemoteStepWorker::new(registry, store.clone()).with_interrupt(interrupt_rx);

        let sent = request.clone();
        let handle = tokio::spawn(async move { worker.handle(&sent).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        interrupt_tx.send(true).unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(outcome, WorkerOutcome::Stopped);
        assert_eq!(status(&store, &request).await, StepExecutionStatus::Stopped);
    }

    #[tokio::test]
    async fn test_unknown_step_leaves_record_untouched() {
        let (registry, store, mut request) = setup().await;
        request.step_name = "not-registered".to_string();
        let worker = RemoteStepWorker::new(registry, store.clone());

        let err = worker.handle(&request).await.unwrap_err();
        assert!(matches!(err, WorkerError::UnknownStep { .. }));
        assert_eq!(status(&store, &request).await, StepExecutionStatus::Started);
    }

    #[tokio::test]
    async fn test_missing_step_execution() {
        let (registry, store, mut request) = setup().await;
        request.step_execution_id = 999;
        let worker = RemoteStepWorker::new(registry, store);

        let err = worker.handle(&request).await.unwrap_err();
        assert!(matches!(
            err,
            WorkerError::MissingStepExecution {
                job_execution_id: 1,
                step_execution_id: 999
            }
        ));
    }

    #[tokio::test]
    async fn test_redelivered_request_is_not_rerun() {
        let (registry, store, request) = setup().await;
        let worker = RemoteStepWorker::new(registry, store.clone());

        assert_eq!(worker.handle(&request).await.unwrap(), WorkerOutcome::Completed);
        assert_eq!(
            worker.handle(&request).await.unwrap(),
            WorkerOutcome::AlreadyFinished
        );
    }

    #[tokio::test]
    async fn test_handle_wire_rejects_garbage() {
        let (registry, store, _) = setup().await;
        let worker = RemoteStepWorker::new(registry, store);

        let err = worker.handle_wire(b"{\"jobExecutionId\":").await.unwrap_err();
        assert!(matches!(err, WorkerError::Decode(_)));
    }
}
