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

//! Job-state store contract with optimistic concurrency.
//!
//! Every mutation of a step execution goes through [`JobStateStore::update`],
//! which only applies when the record's version still matches the stored
//! one. A stale write is not an error: it comes back as
//! [`UpdateOutcome::Conflict`] and the caller treats it as "someone else
//! already handled this".

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::BTreeMap;

use crate::error::StoreError;
use crate::models::{NewStepExecution, StepExecutionRecord, StepExecutionStatus};

/// Result of a conditional update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The write committed; carries the record with its new version.
    Updated(StepExecutionRecord),
    /// The record changed since it was read. Nothing was written.
    Conflict,
}

/// External store of step executions.
#[async_trait]
pub trait JobStateStore: Send + Sync {
    /// Creates a step execution in STARTED state and assigns its id.
    async fn create_step_execution(
        &self,
        new: NewStepExecution,
    ) -> Result<StepExecutionRecord, StoreError>;

    async fn get(
        &self,
        job_execution_id: i64,
        step_execution_id: i64,
    ) -> Result<Option<StepExecutionRecord>, StoreError>;

    /// Writes `record` if its version equals the stored version, bumping the
    /// version by one.
    async fn update(&self, record: &StepExecutionRecord) -> Result<UpdateOutcome, StoreError>;
}

#[derive(Default)]
struct Inner {
    next_step_execution_id: i64,
    records: BTreeMap<(i64, i64), StepExecutionRecord>,
}

/// Versioned job-state store kept in memory.
#[derive(Default)]
pub struct InMemoryJobStateStore {
    inner: Mutex<Inner>,
}

impl InMemoryJobStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every step execution of a job execution, ordered by step execution id.
    pub fn records_for(&self, job_execution_id: i64) -> Vec<StepExecutionRecord> {
        self.inner
            .lock()
            .records
            .values()
            .filter(|record| record.job_execution_id == job_execution_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl JobStateStore for InMemoryJobStateStore {
    async fn create_step_execution(
        &self,
        new: NewStepExecution,
    ) -> Result<StepExecutionRecord, StoreError> {
        let mut inner = self.inner.lock();
        inner.next_step_execution_id += 1;

        let now = Utc::now();
        let record = StepExecutionRecord {
            job_execution_id: new.job_execution_id,
            step_execution_id: inner.next_step_execution_id,
            step_name: new.step_name,
            partition: new.partition,
            status: StepExecutionStatus::Started,
            version: 0,
            exit_message: None,
            created_at: now,
            updated_at: now,
            ended_at: None,
        };
        inner.records.insert(
            (record.job_execution_id, record.step_execution_id),
            record.clone(),
        );

        Ok(record)
    }

    async fn get(
        &self,
        job_execution_id: i64,
        step_execution_id: i64,
    ) -> Result<Option<StepExecutionRecord>, StoreError> {
        Ok(self
            .inner
            .lock()
            .records
            .get(&(job_execution_id, step_execution_id))
            .cloned())
    }

    async fn update(&self, record: &StepExecutionRecord) -> Result<UpdateOutcome, StoreError> {
        let mut inner = self.inner.lock();
        let key = (record.job_execution_id, record.step_execution_id);

        let stored = inner.records.get_mut(&key).ok_or_else(|| {
            StoreError::NotFound(format!(
                "step execution {} of job execution {}",
                record.step_execution_id, record.job_execution_id
            ))
        })?;

        if stored.version != record.version {
            return Ok(UpdateOutcome::Conflict);
        }

        let mut updated = record.clone();
        updated.version += 1;
        *stored = updated.clone();

        Ok(UpdateOutcome::Updated(updated))
    }
}
