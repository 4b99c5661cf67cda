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

//! Subcommand implementations.

pub mod plan;
pub mod validate;

use anyhow::{Context, Result};
use courier::{ConfigLoader, CourierConfig};
use std::path::Path;
use tracing::debug;

/// Loads the explicit file, or the first file found on the default search path.
pub fn load(config_file: Option<&Path>) -> Result<CourierConfig> {
    let loader = ConfigLoader::new();
    let config = loader.load_config(config_file).with_context(|| match config_file {
        Some(path) => format!("Failed to load configuration from {}", path.display()),
        None => format!(
            "No configuration found. Searched: {:?}",
            loader.get_search_paths()
        ),
    })?;
    debug!(jobs = config.jobs.len(), "Configuration loaded");
    Ok(config)
}
