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

//! Implementation of the `plan` command.

use anyhow::{Context, Result};
use courier::{CourierConfig, JobCatalog};

/// Prints the partitions of a run of `job_name` over `total_units`.
pub fn run(config: &CourierConfig, job_name: &str, total_units: u64) -> Result<()> {
    let catalog = JobCatalog::from_configs(&config.jobs);
    let job = catalog
        .job(job_name)
        .with_context(|| format!("Cannot plan job '{}'", job_name))?;
    let partitions = catalog.plan(job_name, total_units)?;

    println!(
        "{} units of '{}' -> {} partition(s)",
        total_units,
        job_name,
        partitions.len()
    );
    for partition in &partitions {
        let range = partition.range();
        println!(
            "  #{:<4} units {}..{} ({} chunk(s) of up to {})",
            partition.index,
            range.start,
            range.end,
            partition.chunks(job.chunk_size).count(),
            job.chunk_size
        );
    }
    Ok(())
}
