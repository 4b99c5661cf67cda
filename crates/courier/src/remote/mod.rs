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

//! # Remote Partitioning
//!
//! Splits a job run into partitions and executes them on worker processes.
//!
//! ```text
//!  manager                                   worker(s)
//!  ───────                                   ─────────
//!  JobCatalog::plan                          RequestSource
//!       │                                         │
//!  RemoteStepCoordinator ──RequestPublisher──▶ StepWorkerPool
//!       │                                         │
//!       ▼                                    RemoteStepWorker
//!  JobStateStore (STARTED) ◀──── update (optimistic) ──┘
//! ```
//!
//! The only coordination between workers is the transport's single delivery
//! and the version check on the shared step execution record.

pub mod coordinator;
pub mod pool;
pub mod request;
pub mod step;
pub mod store;
pub mod worker;

pub use coordinator::{LaunchReport, PartitionLaunch, RemoteStepCoordinator};
pub use pool::{PoolReport, StepWorkerPool};
pub use request::{
    InProcessRequestPublisher, QueueRequestPublisher, QueueRequestSource, RequestPublisher,
    RequestSource, STEP_NAME_HEADER,
};
pub use step::{RemoteStep, StepContext, StepError, StepRegistry};
pub use store::{InMemoryJobStateStore, JobStateStore, UpdateOutcome};
pub use worker::{RemoteStepWorker, WorkerOutcome};
