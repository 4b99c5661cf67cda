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

//! Remote partitioning end to end: manager, request delivery, worker pool
//! and the job-state store.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Barrier};

use courier::config::CourierConfig;
use courier::models::{NewStepExecution, StepExecutionRequest};
use courier::remote::InMemoryJobStateStore;
use courier::transport::InMemoryQueue;
use courier::{
    JobStateStore, NodeBuilder, Partition, PartitionLaunch, RemoteStep, RemoteStepWorker,
    StepContext, StepError, StepExecutionStatus, StepRegistry, WorkerOutcome,
};

use crate::fixtures::job;

const JOB: &str = "LOAN_CLOSE_OF_BUSINESS";
const STEP: &str = "loan-cob-partition";

/// Records the chunks it was asked to process.
#[derive(Default)]
struct ChunkRecorder {
    chunks: Mutex<Vec<Range<u64>>>,
    contexts: Mutex<Vec<Vec<u8>>>,
}

#[async_trait]
impl RemoteStep for ChunkRecorder {
    async fn execute(&self, ctx: StepContext) -> Result<(), StepError> {
        self.chunks.lock().extend(ctx.chunks());
        self.contexts.lock().push(ctx.execution_context().to_vec());
        Ok(())
    }
}

/// Never finishes on its own.
struct Endless;

#[async_trait]
impl RemoteStep for Endless {
    async fn execute(&self, _ctx: StepContext) -> Result<(), StepError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }
}

/// Waits for a peer at the barrier, then settles after `delay`.
struct Rendezvous {
    barrier: Arc<Barrier>,
    delay: Duration,
    result: Result<(), StepError>,
}

#[async_trait]
impl RemoteStep for Rendezvous {
    async fn execute(&self, _ctx: StepContext) -> Result<(), StepError> {
        self.barrier.wait().await;
        tokio::time::sleep(self.delay).await;
        self.result.clone()
    }
}

fn launch(total_units: u64) -> PartitionLaunch {
    PartitionLaunch {
        job_execution_id: 1,
        job_name: JOB.to_string(),
        step_name: STEP.to_string(),
        total_units,
        execution_context: b"tenant=default".to_vec(),
    }
}

fn in_process_config() -> CourierConfig {
    let mut config = CourierConfig::default();
    config.dispatch.enabled = false;
    config.partitioning.in_process_enabled = true;
    config.partitioning.manager_enabled = true;
    config.partitioning.worker_enabled = true;
    config.jobs = vec![job(JOB)];
    config
}

fn sorted_chunks(step: &ChunkRecorder) -> Vec<Range<u64>> {
    let mut chunks = step.chunks.lock().clone();
    chunks.sort_by_key(|range| range.start);
    chunks
}

#[tokio::test]
async fn test_in_process_partitions_run_to_completion() {
    let store = Arc::new(InMemoryJobStateStore::new());
    let step = Arc::new(ChunkRecorder::default());
    let mut node = NodeBuilder::new(in_process_config())
        .job_state_store(store.clone())
        .step(JOB, STEP, step.clone())
        .build()
        .unwrap();

    let worker = tokio::spawn(node.take_worker().unwrap().run());
    let report = node.coordinator().unwrap().launch(launch(10)).await.unwrap();
    assert!(report.is_complete());
    assert_eq!(report.partition_count(), 3);

    // Dropping the node closes the request channel and drains the pool.
    drop(node);
    let pool = worker.await.unwrap();
    assert_eq!(pool.completed, 3);

    assert!(store
        .records_for(1)
        .iter()
        .all(|r| r.status == StepExecutionStatus::Completed && r.ended_at.is_some()));
    assert_eq!(
        sorted_chunks(&step),
        vec![0..2, 2..4, 4..6, 6..8, 8..10]
    );
    assert!(step
        .contexts
        .lock()
        .iter()
        .all(|ctx| ctx.as_slice() == b"tenant=default"));
}

#[tokio::test]
async fn test_queue_delivery_between_manager_and_worker() {
    let mut config = in_process_config();
    config.partitioning.in_process_enabled = false;
    config.partitioning.queue_enabled = true;
    config.transport.queue.enabled = true;

    let (request_queue, requests) = InMemoryQueue::bounded(0, 16);
    let store = Arc::new(InMemoryJobStateStore::new());
    let step = Arc::new(ChunkRecorder::default());
    let mut node = NodeBuilder::new(config)
        .job_state_store(store.clone())
        .request_channel(Box::new(request_queue))
        .request_receiver(requests)
        .step(JOB, STEP, step.clone())
        .build()
        .unwrap();

    let worker = tokio::spawn(node.take_worker().unwrap().run());
    let report = node.coordinator().unwrap().launch(launch(8)).await.unwrap();
    assert_eq!(report.published.len(), 2);

    drop(node);
    let pool = worker.await.unwrap();
    assert_eq!(pool.completed, 2);
    assert_eq!(sorted_chunks(&step), vec![0..2, 2..4, 4..6, 6..8]);
}

#[tokio::test]
async fn test_interrupt_stops_running_partitions() {
    let (interrupt_tx, interrupt_rx) = watch::channel(false);
    let store = Arc::new(InMemoryJobStateStore::new());
    let mut node = NodeBuilder::new(in_process_config())
        .job_state_store(store.clone())
        .step(JOB, STEP, Arc::new(Endless))
        .interrupt(interrupt_rx)
        .build()
        .unwrap();

    let worker = tokio::spawn(node.take_worker().unwrap().run());
    node.coordinator().unwrap().launch(launch(8)).await.unwrap();
    drop(node);

    tokio::time::sleep(Duration::from_millis(20)).await;
    interrupt_tx.send(true).unwrap();

    let pool = tokio::time::timeout(Duration::from_secs(5), worker)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pool.stopped, 2);
    assert!(store
        .records_for(1)
        .iter()
        .all(|r| r.status == StepExecutionStatus::Stopped));
}

#[tokio::test]
async fn test_concurrent_duplicate_delivery_commits_once() {
    let store = Arc::new(InMemoryJobStateStore::new());
    let record = store
        .create_step_execution(NewStepExecution {
            job_execution_id: 1,
            step_name: STEP.to_string(),
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
        step_name: STEP.to_string(),
        execution_context: Vec::new(),
    };

    // Both workers read the STARTED record before either writes.
    let barrier = Arc::new(Barrier::new(2));
    let worker = |delay: Duration, result: Result<(), StepError>| {
        let registry = Arc::new(StepRegistry::new());
        registry.register(
            STEP,
            Arc::new(Rendezvous {
                barrier: barrier.clone(),
                delay,
                result,
            }),
        );
        RemoteStepWorker::new(registry, store.clone())
    };
    let fast = worker(Duration::ZERO, Ok(()));
    let slow = worker(
        Duration::from_millis(50),
        Err(StepError::Failed("late duplicate".to_string())),
    );

    let (first, second) = tokio::join!(fast.handle(&request), slow.handle(&request));
    assert_eq!(first.unwrap(), WorkerOutcome::Completed);
    assert_eq!(second.unwrap(), WorkerOutcome::DuplicateDiscarded);

    let stored = store
        .get(1, record.step_execution_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, StepExecutionStatus::Completed);
    assert_eq!(stored.version, record.version + 1);
    assert!(stored.exit_message.is_none());

    // A later redelivery does not run the step again.
    assert_eq!(
        fast.handle(&request).await.unwrap(),
        WorkerOutcome::AlreadyFinished
    );
}
