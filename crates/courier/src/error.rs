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

//! Error types shared across the dispatch and partitioning layers.
//!
//! Failures that are expected parts of normal operation (a bucket that could
//! not be delivered, an optimistic-concurrency conflict) are modeled as
//! values elsewhere. The types here cover conditions a caller has to react to.

use thiserror::Error;

use crate::config::ConfigViolation;

/// Errors raised by a transport while sending a bucket.
///
/// A transport error is always scoped to the bucket being sent; the events of
/// that bucket stay pending and are picked up again on the next cycle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("send failed on bucket {bucket}: {message}")]
    SendFailed { bucket: usize, message: String },

    #[error("channel {bucket} is closed")]
    ChannelClosed { bucket: usize },

    #[error("bucket {bucket} is outside the transport's {channel_count} channels")]
    UnknownBucket { bucket: usize, channel_count: usize },

    #[error("failed to encode message: {0}")]
    Encoding(String),
}

/// Errors raised by the external outbox and job-state stores.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("record not found: {0}")]
    NotFound(String),
}

/// Errors that abort a whole dispatch cycle.
///
/// Per-bucket failures never surface here; they are reported in the
/// cycle's [`DispatchOutcome`](crate::dispatcher::DispatchOutcome).
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("outbox store failed: {0}")]
    Store(#[from] StoreError),
}

/// Errors raised while handling a single step execution request on a worker.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("no step named '{step_name}' is registered on this worker")]
    UnknownStep { step_name: String },

    #[error("step execution {step_execution_id} of job execution {job_execution_id} does not exist")]
    MissingStepExecution {
        job_execution_id: i64,
        step_execution_id: i64,
    },

    #[error("job-state store failed: {0}")]
    Store(#[from] StoreError),

    #[error("failed to decode step execution request: {0}")]
    Decode(String),
}

/// Errors raised by the manager-side partition coordinator.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("no job named '{0}' is configured")]
    UnknownJob(String),

    #[error("job '{job_name}' is disabled by invalid configuration: {violations:?}")]
    JobDisabled {
        job_name: String,
        violations: Vec<ConfigViolation>,
    },

    #[error("job-state store failed: {0}")]
    Store(#[from] StoreError),
}

/// Errors that prevent a node from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration rejected: {violations:?}")]
    InvalidConfiguration { violations: Vec<ConfigViolation> },

    #[error("{role} role requires {requirement}")]
    MissingComponent {
        role: &'static str,
        requirement: &'static str,
    },

    #[error("dispatch is configured for {configured} channels but the transport provides {provided}")]
    ChannelCountMismatch { configured: usize, provided: usize },

    #[error("transport initialization failed: {0}")]
    Transport(#[from] TransportError),
}
