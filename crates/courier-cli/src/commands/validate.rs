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

//! Implementation of the `validate` command.
//!
//! Prints every rule the configuration breaks. Job-scoped violations only
//! disable their job; anything else would stop a node from starting and
//! makes the command fail.

use anyhow::{bail, Result};
use courier::{ConfigViolation, CourierConfig, JobCatalog, Validate};

pub fn run(config: &CourierConfig) -> Result<()> {
    let violations = config.violations();
    let (fatal, scoped): (Vec<&ConfigViolation>, Vec<&ConfigViolation>) =
        violations.iter().partition(|v| v.is_startup_fatal());

    for violation in &scoped {
        println!("disabled  {}", violation);
    }
    for violation in &fatal {
        println!("fatal     {}", violation);
    }

    let catalog = JobCatalog::from_configs(&config.jobs);
    for job in catalog.enabled_jobs() {
        println!(
            "enabled   job '{}' (partition_size {}, chunk_size {})",
            job.job_name, job.partition_size, job.chunk_size
        );
    }

    if !fatal.is_empty() {
        bail!(
            "{} violation(s) would prevent the node from starting",
            fatal.len()
        );
    }

    println!("configuration is valid");
    Ok(())
}
