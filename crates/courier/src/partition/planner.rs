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

//! Splitting a job's units of work into independently executable partitions.

use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::config::JobPartitionConfig;

/// A contiguous slice of a job's units of work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Partition {
    /// Position of the partition within its plan, starting at zero
    pub index: usize,
    /// First unit covered
    pub offset: u64,
    /// Number of units covered, never zero
    pub len: u64,
}

impl Partition {
    /// Units covered, as a half-open range.
    pub fn range(&self) -> Range<u64> {
        self.offset..self.offset + self.len
    }

    /// Contiguous chunk ranges of at most `chunk_size` units.
    ///
    /// Each chunk is processed in its own transaction by the worker.
    pub fn chunks(&self, chunk_size: usize) -> impl Iterator<Item = Range<u64>> {
        let step = chunk_size.max(1) as u64;
        let end = self.offset + self.len;
        (self.offset..end)
            .step_by(step as usize)
            .map(move |start| start..(start + step).min(end))
    }
}

/// Computes partition plans for validated job configurations.
#[derive(Debug, Clone, Copy, Default)]
pub struct JobPartitionPlanner;

impl JobPartitionPlanner {
    /// Splits `total_units` into partitions of `partition_size` units.
    ///
    /// The last partition may be smaller. `config` is expected to have
    /// passed startup validation; a zero partition size yields no partitions.
    pub fn plan(total_units: u64, config: &JobPartitionConfig) -> Vec<Partition> {
        let size = config.partition_size as u64;
        if size == 0 || total_units == 0 {
            return Vec::new();
        }

        (0..total_units)
            .step_by(config.partition_size)
            .enumerate()
            .map(|(index, offset)| Partition {
                index,
                offset,
                len: size.min(total_units - offset),
            })
            .collect()
    }
}
