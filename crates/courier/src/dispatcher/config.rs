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

//! Runtime configuration for the event dispatcher.

use std::time::Duration;

use crate::config::DispatchSettings;

/// Configuration for the event batch dispatcher
///
/// # Construction
///
/// ```rust,ignore
/// let config = DispatchConfig::builder()
///     .batch_size(500)
///     .global_timeout(Duration::from_secs(10))
///     .build();
/// ```
///
/// Or from the loaded `[dispatch]` settings:
///
/// ```rust,ignore
/// let config = DispatchConfig::from(&courier_config.dispatch);
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct DispatchConfig {
    batch_size: usize,
    global_timeout: Duration,
    poll_interval: Duration,
    worker_pool_size: Option<usize>,
}

impl DispatchConfig {
    /// Creates a new configuration builder with default values.
    pub fn builder() -> DispatchConfigBuilder {
        DispatchConfigBuilder::default()
    }

    /// Maximum number of pending events read per cycle.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Time a cycle waits for all of its buckets.
    pub fn global_timeout(&self) -> Duration {
        self.global_timeout
    }

    /// Interval between cycles when driven by an interval trigger.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Number of bucket tasks allowed to send at once.
    ///
    /// Defaults to the transport's channel count.
    pub fn worker_pool_size(&self, channel_count: usize) -> usize {
        self.worker_pool_size.unwrap_or(channel_count).max(1)
    }
}

/// Builder for [`DispatchConfig`].
#[derive(Debug, Clone)]
pub struct DispatchConfigBuilder {
    config: DispatchConfig,
}

impl Default for DispatchConfigBuilder {
    fn default() -> Self {
        Self {
            config: DispatchConfig {
                batch_size: 100,
                global_timeout: Duration::from_secs(30),
                poll_interval: Duration::from_secs(1),
                worker_pool_size: None,
            },
        }
    }
}

impl DispatchConfigBuilder {
    pub fn batch_size(mut self, value: usize) -> Self {
        self.config.batch_size = value;
        self
    }

    pub fn global_timeout(mut self, value: Duration) -> Self {
        self.config.global_timeout = value;
        self
    }

    pub fn poll_interval(mut self, value: Duration) -> Self {
        self.config.poll_interval = value;
        self
    }

    /// Overrides the worker pool size (defaults to the channel count).
    pub fn worker_pool_size(mut self, value: Option<usize>) -> Self {
        self.config.worker_pool_size = value;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> DispatchConfig {
        self.config
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfigBuilder::default().build()
    }
}

impl From<&DispatchSettings> for DispatchConfig {
    fn from(settings: &DispatchSettings) -> Self {
        DispatchConfig::builder()
            .batch_size(settings.batch_size)
            .global_timeout(settings.global_timeout())
            .poll_interval(settings.poll_interval())
            .build()
    }
}
