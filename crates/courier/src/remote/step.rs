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

//! # Remote Steps
//!
//! A remote step is the job logic a worker runs for one partition. The
//! logic itself belongs to the host application; this module defines the
//! contract and the name-based registry a worker resolves requests against.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

use crate::models::StepExecutionRecord;
use crate::partition::Partition;

/// How a step run ended, other than successfully.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StepError {
    /// The execution environment asked the step to stop. Recorded as
    /// STOPPED; the partition can be retried later.
    #[error("step execution was interrupted")]
    Interrupted,

    /// Any other failure. Recorded as FAILED.
    #[error("step execution failed: {0}")]
    Failed(String),
}

/// Everything a step needs to process its partition.
#[derive(Debug, Clone)]
pub struct StepContext {
    record: StepExecutionRecord,
    execution_context: Vec<u8>,
    chunk_size: Option<usize>,
    interrupt: watch::Receiver<bool>,
}

impl StepContext {
    pub fn new(
        record: StepExecutionRecord,
        execution_context: Vec<u8>,
        interrupt: watch::Receiver<bool>,
    ) -> Self {
        Self {
            record,
            execution_context,
            chunk_size: None,
            interrupt,
        }
    }

    /// Sets the chunk size the partition is processed in.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    /// Snapshot of the step execution as read before the step started.
    pub fn record(&self) -> &StepExecutionRecord {
        &self.record
    }

    pub fn partition(&self) -> Partition {
        self.record.partition
    }

    /// Transactional chunks of the partition, the whole partition as one
    /// chunk when no chunk size is known.
    pub fn chunks(&self) -> Vec<Range<u64>> {
        match self.chunk_size {
            Some(chunk_size) => self.record.partition.chunks(chunk_size).collect(),
            None => vec![self.record.partition.range()],
        }
    }

    /// Opaque tenant/security context propagated from the manager.
    pub fn execution_context(&self) -> &[u8] {
        &self.execution_context
    }

    /// Whether an interruption was requested. Long-running steps should
    /// check this between chunks and return [`StepError::Interrupted`].
    pub fn is_interrupted(&self) -> bool {
        *self.interrupt.borrow()
    }
}

/// Executable logic for one partition of a job.
#[async_trait]
pub trait RemoteStep: Send + Sync {
    async fn execute(&self, ctx: StepContext) -> Result<(), StepError>;
}

/// Name-to-step lookup used by workers.
#[derive(Default)]
pub struct StepRegistry {
    steps: RwLock<HashMap<String, Arc<dyn RemoteStep>>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `step` under `name`, replacing any previous step.
    pub fn register(&self, name: impl Into<String>, step: Arc<dyn RemoteStep>) {
        let name = name.into();
        self.steps.write().insert(name.clone(), step);
        tracing::debug!("Registered remote step: {}", name);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn RemoteStep>> {
        self.steps.read().get(name).cloned()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.steps.read().contains_key(name)
    }

    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.steps.read().keys().cloned().collect();
        names.sort();
        names
    }
}
