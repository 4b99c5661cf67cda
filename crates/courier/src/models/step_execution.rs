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

//! Step Execution Models
//!
//! A partitioned job run is tracked by the external job-state store as one
//! [`StepExecutionRecord`] per partition. The manager creates each record as
//! `Started` and publishes a [`StepExecutionRequest`] pointing at it; a
//! worker resolves the record, executes the step, and writes back the final
//! status under optimistic concurrency.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::partition::Partition;

/// Status of a step execution as stored by the job-state store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepExecutionStatus {
    Started,
    Completed,
    /// Interrupted; the slice can be re-partitioned and retried later
    Stopped,
    /// Terminal; requires operator intervention
    Failed,
}

impl StepExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepExecutionStatus::Started => "STARTED",
            StepExecutionStatus::Completed => "COMPLETED",
            StepExecutionStatus::Stopped => "STOPPED",
            StepExecutionStatus::Failed => "FAILED",
        }
    }

    /// Whether a worker already reached a final status for the record.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StepExecutionStatus::Started)
    }
}

/// A step execution tracked by the job-state store (domain type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepExecutionRecord {
    pub job_execution_id: i64,
    pub step_execution_id: i64,
    pub step_name: String,
    /// Slice of the job's units this step covers
    pub partition: Partition,
    pub status: StepExecutionStatus,
    /// Optimistic-concurrency stamp, bumped on every successful update
    pub version: i64,
    pub exit_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl StepExecutionRecord {
    /// Returns a copy transitioned to `status`, keeping the version the
    /// record was read at so the store can detect concurrent writers.
    pub fn with_outcome(&self, status: StepExecutionStatus, exit_message: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            status,
            exit_message,
            updated_at: now,
            ended_at: status.is_terminal().then_some(now),
            ..self.clone()
        }
    }
}

/// Structure for creating new step execution records (domain type).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStepExecution {
    pub job_execution_id: i64,
    pub step_name: String,
    pub partition: Partition,
}

/// Message asking a worker to run one partition of a job.
///
/// Wire form (JSON):
/// `{"jobExecutionId": 1, "stepExecutionId": 2, "stepName": "...", "executionContext": "<base64>"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepExecutionRequest {
    pub job_execution_id: i64,
    pub step_execution_id: i64,
    pub step_name: String,
    /// Tenant/security context propagated to the worker, opaque to this layer
    #[serde(with = "opaque_bytes")]
    pub execution_context: Vec<u8>,
}

impl StepExecutionRequest {
    pub fn to_wire(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_wire(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

mod opaque_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
