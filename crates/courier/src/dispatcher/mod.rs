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

//! # Event Dispatch
//!
//! Moves pending outbox events to a [`Transport`](crate::transport::Transport).
//!
//! ## Architecture
//!
//! ```text
//! DispatchTrigger ──▶ EventBatchDispatcher ──▶ DispatchCoordinator ──▶ Transport
//!                          │    ▲                  (one task per bucket,
//!                          ▼    │                   one lease per channel)
//!                     EventOutboxStore
//! ```
//!
//! - **EventBatchDispatcher** reads a batch, routes keys to buckets and marks
//!   delivered buckets sent.
//! - **DispatchCoordinator** sends buckets concurrently under a global timeout.
//! - **ChannelLeases** keep a channel exclusive to one bucket task.
//! - **DispatchTrigger** decides when the next cycle runs.

mod batch;
mod config;
mod coordinator;
mod lease;
mod trigger;

pub use batch::{BucketReport, DispatchOutcome, EventBatchDispatcher};
pub use config::{DispatchConfig, DispatchConfigBuilder};
pub use coordinator::{BucketOutcome, DispatchCoordinator};
pub use lease::{ChannelLease, ChannelLeases};
pub use trigger::{DispatchTrigger, IntervalTrigger, NotifyTrigger, WorkSignal};
