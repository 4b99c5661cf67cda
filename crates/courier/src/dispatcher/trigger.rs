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

//! Triggers deciding when the next dispatch cycle runs.
//!
//! This module provides the `DispatchTrigger` trait that abstracts how the
//! dispatch loop waits for pending events. Two mechanisms are provided:
//!
//! - `IntervalTrigger`: periodic polling, for stores written by other processes
//! - `NotifyTrigger`: woken by the local [`OutboxRecorder`](crate::outbox::OutboxRecorder)
//!   whenever an event is appended, with a poll fallback
//!
//! # Example
//!
//! ```rust,ignore
//! use courier::dispatcher::{DispatchTrigger, IntervalTrigger};
//!
//! let trigger = IntervalTrigger::new(Duration::from_secs(1));
//!
//! loop {
//!     trigger.wait_for_work().await;
//!     if trigger.is_shutdown() {
//!         break;
//!     }
//!     dispatcher.dispatch_next_batch().await?;
//! }
//! ```

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

/// Trait for abstracting when a dispatch cycle should run.
#[async_trait]
pub trait DispatchTrigger: Send + Sync {
    /// Wait until pending events might be available, or timeout.
    ///
    /// The caller should run a dispatch cycle after this returns, handling
    /// the case where nothing is pending.
    async fn wait_for_work(&self);

    /// Signals that the trigger should stop waiting and shutdown.
    ///
    /// After calling this, `wait_for_work` returns promptly.
    fn shutdown(&self);

    /// Whether `shutdown` has been called.
    fn is_shutdown(&self) -> bool;
}

/// Handle used by producers to wake a [`NotifyTrigger`].
#[derive(Clone, Debug)]
pub struct WorkSignal {
    notify: Arc<Notify>,
}

impl WorkSignal {
    /// Wakes the dispatch loop.
    ///
    /// A signal raised while no cycle is waiting is remembered, so an event
    /// appended during a running cycle is picked up by the next one.
    pub fn notify(&self) {
        self.notify.notify_one();
    }
}

/// Periodic polling trigger.
pub struct IntervalTrigger {
    poll_interval: Duration,
    shutdown: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl IntervalTrigger {
    /// Default poll interval
    const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

    /// Creates a trigger firing every `poll_interval`.
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            shutdown: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }
}

impl Default for IntervalTrigger {
    fn default() -> Self {
        Self::new(Self::DEFAULT_POLL_INTERVAL)
    }
}

#[async_trait]
impl DispatchTrigger for IntervalTrigger {
    async fn wait_for_work(&self) {
        if self.is_shutdown() {
            return;
        }

        tokio::select! {
            _ = tokio::time::sleep(self.poll_interval) => {
                debug!("Dispatch poll interval elapsed");
            }
            _ = self.notify.notified() => {
                debug!("Dispatch trigger shutdown signal received");
            }
        }
    }

    fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.notify.notify_one();
        self.notify.notify_waiters();
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

/// Trigger woken by local producers, falling back to periodic polling in
/// case events are written by another process.
pub struct NotifyTrigger {
    poll_fallback: Duration,
    shutdown: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl NotifyTrigger {
    /// Fallback poll interval when no signal is received
    const DEFAULT_POLL_FALLBACK: Duration = Duration::from_secs(30);

    pub fn new() -> Self {
        Self::with_poll_fallback(Self::DEFAULT_POLL_FALLBACK)
    }

    pub fn with_poll_fallback(poll_fallback: Duration) -> Self {
        Self {
            poll_fallback,
            shutdown: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Handle producers use to wake this trigger.
    pub fn signal(&self) -> WorkSignal {
        WorkSignal {
            notify: self.notify.clone(),
        }
    }
}

impl Default for NotifyTrigger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DispatchTrigger for NotifyTrigger {
    async fn wait_for_work(&self) {
        if self.is_shutdown() {
            return;
        }

        tokio::select! {
            _ = self.notify.notified() => {
                debug!("Woke from outbox append signal");
            }
            _ = tokio::time::sleep(self.poll_fallback) => {
                debug!("Woke from fallback poll timeout");
            }
        }
    }

    fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // notify_one leaves a permit for a loop that is not waiting yet
        self.notify.notify_one();
        self.notify.notify_waiters();
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}
