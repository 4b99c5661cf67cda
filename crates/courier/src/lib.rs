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

//! # Courier
//!
//! Reliable delivery for a transactional core: domain events are written to
//! an outbox in the same transaction as the business change and dispatched
//! to a message transport afterwards, and long batch jobs are split into
//! partitions executed on worker processes.
//!
//! ## Event dispatch
//!
//! - Events sharing a routing key always land on the same channel, chosen
//!   by [`PartitionRouter`] (SHA-256 fed into Jump consistent hashing).
//! - Each dispatch cycle groups pending events by channel and sends every
//!   group concurrently; one slow or failing channel never blocks another.
//! - A group is marked sent only after the transport acknowledged all of
//!   it. Anything else stays pending and is delivered again, so delivery
//!   is at-least-once and consumers deduplicate on the event id.
//!
//! ## Remote partitioning
//!
//! - [`JobPartitionPlanner`] splits a run into contiguous partitions.
//! - [`RemoteStepCoordinator`] records one step execution per partition and
//!   publishes a request for each.
//! - [`RemoteStepWorker`] executes a request and persists the outcome under
//!   an optimistic version check, discarding duplicate deliveries.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use courier::{ConfigLoader, NodeBuilder};
//!
//! let config = ConfigLoader::new().load_config(None)?;
//! let node = NodeBuilder::new(config)
//!     .outbox_store(outbox)
//!     .log_client(client)
//!     .build()?;
//!
//! if let Some(recorder) = node.recorder() {
//!     recorder.record("LoanApprovedBusinessEvent", "loan-42", payload).await?;
//! }
//! let dispatch = node.spawn_dispatcher();
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod models;
pub mod node;
pub mod outbox;
pub mod partition;
pub mod remote;
pub mod routing;
pub mod transport;

pub use config::{ConfigLoader, ConfigViolation, CourierConfig, JobPartitionConfig, Validate};
pub use dispatcher::{
    BucketOutcome, DispatchConfig, DispatchCoordinator, DispatchOutcome, DispatchTrigger,
    EventBatchDispatcher, NotifyTrigger,
};
pub use error::{
    CoordinatorError, DispatchError, StartupError, StoreError, TransportError, WorkerError,
};
pub use models::{
    NewOutboxEvent, NewStepExecution, OutboxEvent, OutboxStatus, StepExecutionRecord,
    StepExecutionRequest, StepExecutionStatus,
};
pub use node::{Node, NodeBuilder, WorkerRole};
pub use outbox::{EventOutboxStore, InMemoryOutboxStore, OutboxRecorder};
pub use partition::{JobCatalog, JobPartitionPlanner, Partition};
pub use remote::{
    JobStateStore, PartitionLaunch, RemoteStep, RemoteStepCoordinator, RemoteStepWorker,
    StepContext, StepError, StepRegistry, WorkerOutcome,
};
pub use routing::PartitionRouter;
pub use transport::{LogTransport, QueueTransport, Transport, TransportMessage};
