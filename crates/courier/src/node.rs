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

//! Node assembly.
//!
//! A [`NodeBuilder`] validates the configuration once, refuses to start on
//! any startup-fatal violation, disables misconfigured jobs and wires the
//! roles the configuration enables: event dispatch, partition manager and
//! partition worker.
//!
//! ```rust,ignore
//! let node = NodeBuilder::new(config)
//!     .outbox_store(outbox)
//!     .queue_channels(channels)
//!     .job_state_store(job_state)
//!     .step("LOAN_CLOSE_OF_BUSINESS", "loan-cob-partition", Arc::new(LoanCobStep))
//!     .build()?;
//! ```

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::{CourierConfig, Validate};
use crate::dispatcher::{DispatchConfig, DispatchTrigger, EventBatchDispatcher, NotifyTrigger};
use crate::error::StartupError;
use crate::outbox::{EventOutboxStore, OutboxRecorder};
use crate::partition::JobCatalog;
use crate::remote::{
    InProcessRequestPublisher, JobStateStore, PoolReport, QueueRequestPublisher,
    QueueRequestSource, RemoteStep, RemoteStepCoordinator, RemoteStepWorker, RequestPublisher,
    RequestSource, StepRegistry, StepWorkerPool,
};
use crate::transport::{LogClient, LogTransport, OrderedChannel, QueueMessage, QueueTransport, Transport};

/// In-process request queue size when no enabled job sets one.
const DEFAULT_REQUEST_QUEUE_CAPACITY: usize = 16;

struct StepBinding {
    job_name: String,
    step_name: String,
    step: Arc<dyn RemoteStep>,
}

/// Builder for a [`Node`].
pub struct NodeBuilder {
    config: CourierConfig,
    outbox_store: Option<Arc<dyn EventOutboxStore>>,
    transport: Option<Arc<dyn Transport>>,
    queue_channels: Option<Vec<Box<dyn OrderedChannel>>>,
    log_client: Option<Arc<dyn LogClient>>,
    job_state_store: Option<Arc<dyn JobStateStore>>,
    request_channel: Option<Box<dyn OrderedChannel>>,
    request_receiver: Option<mpsc::Receiver<QueueMessage>>,
    steps: Vec<StepBinding>,
    interrupt: Option<watch::Receiver<bool>>,
}

impl NodeBuilder {
    pub fn new(config: CourierConfig) -> Self {
        Self {
            config,
            outbox_store: None,
            transport: None,
            queue_channels: None,
            log_client: None,
            job_state_store: None,
            request_channel: None,
            request_receiver: None,
            steps: Vec::new(),
            interrupt: None,
        }
    }

    pub fn outbox_store(mut self, store: Arc<dyn EventOutboxStore>) -> Self {
        self.outbox_store = Some(store);
        self
    }

    /// Uses a ready-made transport instead of building one from the
    /// `[transport]` settings.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Pre-opened event channels for the queue transport, one per bucket.
    pub fn queue_channels(mut self, channels: Vec<Box<dyn OrderedChannel>>) -> Self {
        self.queue_channels = Some(channels);
        self
    }

    /// Client for the log transport.
    pub fn log_client(mut self, client: Arc<dyn LogClient>) -> Self {
        self.log_client = Some(client);
        self
    }

    pub fn job_state_store(mut self, store: Arc<dyn JobStateStore>) -> Self {
        self.job_state_store = Some(store);
        self
    }

    /// Queue channel partition requests are published on (manager role,
    /// queue delivery).
    pub fn request_channel(mut self, channel: Box<dyn OrderedChannel>) -> Self {
        self.request_channel = Some(channel);
        self
    }

    /// Consumer end of the request channel (worker role, queue delivery).
    pub fn request_receiver(mut self, receiver: mpsc::Receiver<QueueMessage>) -> Self {
        self.request_receiver = Some(receiver);
        self
    }

    /// Registers the step running the partitions of `job_name`.
    pub fn step(
        mut self,
        job_name: impl Into<String>,
        step_name: impl Into<String>,
        step: Arc<dyn RemoteStep>,
    ) -> Self {
        self.steps.push(StepBinding {
            job_name: job_name.into(),
            step_name: step_name.into(),
            step,
        });
        self
    }

    /// Interrupts running steps when `true` is sent.
    pub fn interrupt(mut self, interrupt: watch::Receiver<bool>) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    /// Validates the configuration and assembles the node.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` with every startup-fatal violation,
    /// `MissingComponent` when an enabled role lacks a collaborator, or
    /// `ChannelCountMismatch` when the event channels cannot serve the
    /// configured channel count.
    pub fn build(mut self) -> Result<Node, StartupError> {
        let fatal: Vec<_> = self
            .config
            .violations()
            .into_iter()
            .filter(|violation| violation.is_startup_fatal())
            .collect();
        if !fatal.is_empty() {
            for violation in &fatal {
                error!("Configuration rejected: {}", violation);
            }
            return Err(StartupError::InvalidConfiguration { violations: fatal });
        }

        let catalog = Arc::new(JobCatalog::from_configs(&self.config.jobs));
        let trigger = Arc::new(NotifyTrigger::with_poll_fallback(
            self.config.dispatch.poll_interval(),
        ));

        let (dispatcher, recorder) = self.build_dispatch(&trigger)?;
        let (coordinator, worker) = self.build_partitioning(&catalog)?;

        info!(
            dispatch = dispatcher.is_some(),
            manager = coordinator.is_some(),
            worker = worker.is_some(),
            enabled_jobs = catalog.enabled_jobs().count(),
            "Courier node assembled"
        );

        Ok(Node {
            catalog,
            trigger,
            dispatcher,
            recorder,
            coordinator,
            worker,
        })
    }

    fn build_dispatch(
        &mut self,
        trigger: &NotifyTrigger,
    ) -> Result<(Option<Arc<EventBatchDispatcher>>, Option<OutboxRecorder>), StartupError> {
        if !self.config.dispatch.enabled {
            return Ok((None, None));
        }

        let store = self.outbox_store.clone().ok_or(StartupError::MissingComponent {
            role: "dispatch",
            requirement: "an outbox store",
        })?;
        let transport = self.event_transport()?;

        let dispatcher = EventBatchDispatcher::new(
            store.clone(),
            transport,
            DispatchConfig::from(&self.config.dispatch),
        );
        let recorder = OutboxRecorder::new(store, self.config.events.clone())
            .with_work_signal(trigger.signal());

        Ok((Some(Arc::new(dispatcher)), Some(recorder)))
    }

    fn event_transport(&mut self) -> Result<Arc<dyn Transport>, StartupError> {
        if let Some(transport) = self.transport.take() {
            if transport.bucket_count() == 0 {
                return Err(StartupError::ChannelCountMismatch {
                    configured: self.config.dispatch.channel_count,
                    provided: 0,
                });
            }
            return Ok(transport);
        }

        let settings = &self.config.dispatch;
        if self.config.transport.queue.enabled {
            let channels = self.queue_channels.take().ok_or(StartupError::MissingComponent {
                role: "dispatch",
                requirement: "pre-opened queue channels",
            })?;
            if channels.len() != settings.channel_count {
                error!(
                    configured = settings.channel_count,
                    provided = channels.len(),
                    "Queue channel count differs from configuration"
                );
                return Err(StartupError::ChannelCountMismatch {
                    configured: settings.channel_count,
                    provided: channels.len(),
                });
            }
            return Ok(Arc::new(QueueTransport::new(channels)));
        }

        let client = match self.log_client.take() {
            Some(client) => client,
            None => default_log_client(&self.config)?,
        };
        Ok(Arc::new(
            LogTransport::new(client, settings.channel_count)
                .with_max_in_flight(settings.max_in_flight_per_bucket),
        ))
    }

    #[allow(clippy::type_complexity)]
    fn build_partitioning(
        &mut self,
        catalog: &Arc<JobCatalog>,
    ) -> Result<(Option<RemoteStepCoordinator>, Option<WorkerRole>), StartupError> {
        let partitioning = self.config.partitioning.clone();
        if !partitioning.is_active() {
            return Ok((None, None));
        }

        let store = self.job_state_store.clone().ok_or(StartupError::MissingComponent {
            role: "partitioning",
            requirement: "a job-state store",
        })?;

        let (publisher, source): (Option<Arc<dyn RequestPublisher>>, Option<Box<dyn RequestSource>>) =
            if partitioning.in_process_enabled {
                let capacity = catalog
                    .enabled_jobs()
                    .map(|job| job.thread_pool_queue_capacity)
                    .max()
                    .unwrap_or(DEFAULT_REQUEST_QUEUE_CAPACITY);
                let (publisher, receiver) = InProcessRequestPublisher::channel(capacity);
                (
                    Some(Arc::new(publisher) as Arc<dyn RequestPublisher>),
                    Some(Box::new(receiver) as Box<dyn RequestSource>),
                )
            } else {
                let publisher = match (partitioning.manager_enabled, self.request_channel.take()) {
                    (true, Some(channel)) => {
                        Some(Arc::new(QueueRequestPublisher::new(channel)) as Arc<dyn RequestPublisher>)
                    }
                    (true, None) => {
                        return Err(StartupError::MissingComponent {
                            role: "manager",
                            requirement: "a request channel",
                        })
                    }
                    (false, _) => None,
                };
                let source = match (partitioning.worker_enabled, self.request_receiver.take()) {
                    (true, Some(receiver)) => {
                        Some(Box::new(QueueRequestSource::new(receiver)) as Box<dyn RequestSource>)
                    }
                    (true, None) => {
                        return Err(StartupError::MissingComponent {
                            role: "worker",
                            requirement: "a request receiver",
                        })
                    }
                    (false, _) => None,
                };
                (publisher, source)
            };

        let coordinator = match publisher {
            Some(publisher) if partitioning.manager_enabled => Some(RemoteStepCoordinator::new(
                catalog.clone(),
                store.clone(),
                publisher,
            )),
            _ => None,
        };

        let worker = match source {
            Some(source) if partitioning.worker_enabled => {
                Some(self.build_worker(catalog, store, source))
            }
            _ => None,
        };

        Ok((coordinator, worker))
    }

    fn build_worker(
        &mut self,
        catalog: &JobCatalog,
        store: Arc<dyn JobStateStore>,
        source: Box<dyn RequestSource>,
    ) -> WorkerRole {
        let registry = Arc::new(StepRegistry::new());
        let mut worker = RemoteStepWorker::new(registry.clone(), store);

        for binding in self.steps.drain(..) {
            match catalog.job(&binding.job_name) {
                Ok(job) => {
                    worker = worker.with_chunk_size(binding.step_name.clone(), job.chunk_size);
                }
                Err(e) => warn!(
                    step_name = %binding.step_name,
                    error = %e,
                    "Step registered for a job that cannot run"
                ),
            }
            registry.register(binding.step_name, binding.step);
        }

        if let Some(interrupt) = self.interrupt.take() {
            worker = worker.with_interrupt(interrupt);
        }

        let max_concurrency = catalog
            .enabled_jobs()
            .map(|job| job.thread_pool_max_size)
            .max()
            .unwrap_or(1);
        let queue_capacity = catalog
            .enabled_jobs()
            .map(|job| job.thread_pool_queue_capacity)
            .max()
            .unwrap_or(DEFAULT_REQUEST_QUEUE_CAPACITY);

        WorkerRole {
            pool: StepWorkerPool::new(Arc::new(worker), max_concurrency, queue_capacity),
            source,
        }
    }
}

#[cfg(feature = "kafka")]
fn default_log_client(config: &CourierConfig) -> Result<Arc<dyn LogClient>, StartupError> {
    Ok(Arc::new(crate::transport::KafkaLogClient::new(
        &config.transport.log,
    )?))
}

#[cfg(not(feature = "kafka"))]
fn default_log_client(_config: &CourierConfig) -> Result<Arc<dyn LogClient>, StartupError> {
    Err(StartupError::MissingComponent {
        role: "dispatch",
        requirement: "a log client (or the `kafka` feature)",
    })
}

/// The worker role of a node: a pool and the source it consumes.
pub struct WorkerRole {
    pool: StepWorkerPool,
    source: Box<dyn RequestSource>,
}

impl WorkerRole {
    /// Handles requests until the source is exhausted.
    pub async fn run(self) -> PoolReport {
        self.pool.run(self.source).await
    }
}

/// An assembled node.
pub struct Node {
    catalog: Arc<JobCatalog>,
    trigger: Arc<NotifyTrigger>,
    dispatcher: Option<Arc<EventBatchDispatcher>>,
    recorder: Option<OutboxRecorder>,
    coordinator: Option<RemoteStepCoordinator>,
    worker: Option<WorkerRole>,
}

impl Node {
    pub fn catalog(&self) -> &JobCatalog {
        &self.catalog
    }

    /// Producer entry point, present when dispatch is enabled.
    pub fn recorder(&self) -> Option<&OutboxRecorder> {
        self.recorder.as_ref()
    }

    pub fn dispatcher(&self) -> Option<&Arc<EventBatchDispatcher>> {
        self.dispatcher.as_ref()
    }

    /// Partition manager, present on manager nodes.
    pub fn coordinator(&self) -> Option<&RemoteStepCoordinator> {
        self.coordinator.as_ref()
    }

    /// Takes the worker role so it can be run on its own task.
    pub fn take_worker(&mut self) -> Option<WorkerRole> {
        self.worker.take()
    }

    /// Starts the dispatch loop on a background task.
    pub fn spawn_dispatcher(&self) -> Option<JoinHandle<()>> {
        let dispatcher = self.dispatcher.clone()?;
        let trigger = self.trigger.clone();
        Some(tokio::spawn(async move {
            dispatcher.run(trigger.as_ref()).await;
        }))
    }

    /// Stops the dispatch loop after its current cycle.
    pub fn shutdown(&self) {
        self.trigger.shutdown();
    }
}
