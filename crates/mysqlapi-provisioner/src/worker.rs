// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Provisioning worker for dedicated instances.
//!
//! A single background task drains the coordinator's queue. For each
//! delivered instance it polls the compute provider until the instance has an
//! address, opens network access, creates the database and marks the
//! instance running:
//!
//! ```text
//! queued -> polling -> authorizing -> creating -> running
//!              |            |             |
//!              v            +------+------+
//!          requeued                v
//!         (delayed)        unauthorize, terminate, error
//! ```
//!
//! Failures after acceptance are never returned to a caller; they end up in
//! the instance's `reason`.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::compute::{self, ComputeClient, ComputeError};
use crate::coordinator::ProvisioningCoordinator;
use crate::engine::{self, EngineError, EngineFactory, ServerTarget};
use crate::error::Result;
use crate::models::{Instance, InstanceState};
use crate::persistence::InstanceStore;

/// Reason recorded when network access cannot be opened.
pub const AUTHORIZE_FAILED: &str = "Failed to authorize access to the instance.";

/// Reason recorded when a ready instance reports no address.
pub const MISSING_HOST: &str = "Compute instance became ready without an address.";

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How long a queue read blocks before shutdown is re-checked.
    pub poll_timeout: Duration,
    /// Delay before a not-ready instance is polled again.
    pub poll_interval: Duration,
    /// Deadline for each compute and engine call.
    pub call_timeout: Duration,
    /// Admin user on dedicated servers.
    pub admin_user: String,
    /// Admin password on dedicated servers.
    pub admin_password: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_secs(10),
            call_timeout: Duration::from_secs(60),
            admin_user: "root".to_string(),
            admin_password: String::new(),
        }
    }
}

/// Counters updated by the worker.
#[derive(Debug, Default)]
pub struct WorkerStats {
    processed: AtomicU64,
    requeued: AtomicU64,
    provisioned: AtomicU64,
    failed: AtomicU64,
    orphaned: AtomicU64,
}

/// Point-in-time copy of [`WorkerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStatsSnapshot {
    /// Queue deliveries handled.
    pub processed: u64,
    /// Not-ready instances pushed back onto the queue.
    pub requeued: u64,
    /// Instances that reached `running`.
    pub provisioned: u64,
    /// Instances that ended in `error`.
    pub failed: u64,
    /// Failed instances whose compute instance could not be terminated.
    pub orphaned: u64,
}

impl WorkerStats {
    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
            provisioned: self.provisioned.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            orphaned: self.orphaned.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// What happened to one delivered instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The instance is gone or no longer pending.
    Skipped,
    /// Not ready yet; queued again.
    Requeued,
    /// Not ready and the queue is closed; left pending for the next start.
    Deferred,
    /// Database created, instance running.
    Provisioned,
    /// Compensated and marked `error`.
    Failed {
        /// Reason stored on the instance.
        reason: String,
        /// Whether the compute instance is still alive.
        orphaned: bool,
    },
}

/// Result of polling the compute provider.
enum Poll {
    Ready,
    NotReady,
}

/// Result of a fallible step after the instance is reachable.
enum Step {
    Done,
    Failed(String),
}

/// Provisioning worker.
pub struct ProvisioningWorker {
    coordinator: Arc<ProvisioningCoordinator>,
    store: Arc<dyn InstanceStore>,
    compute: Arc<dyn ComputeClient>,
    engines: Arc<dyn EngineFactory>,
    config: WorkerConfig,
    stats: Arc<WorkerStats>,
}

impl ProvisioningWorker {
    /// Create a new worker.
    pub fn new(
        coordinator: Arc<ProvisioningCoordinator>,
        store: Arc<dyn InstanceStore>,
        compute: Arc<dyn ComputeClient>,
        engines: Arc<dyn EngineFactory>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            coordinator,
            store,
            compute,
            engines,
            config,
            stats: Arc::new(WorkerStats::default()),
        }
    }

    /// Shared handle to the worker's counters.
    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Run until the queue is closed and drained.
    pub async fn run(self) {
        info!(
            compute = self.compute.client_type(),
            poll_timeout_ms = self.config.poll_timeout.as_millis() as u64,
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "Provisioning worker started"
        );

        loop {
            let queue = self.coordinator.queue();
            match queue.get(self.config.poll_timeout).await {
                Some(name) => {
                    if let Err(e) = self.process_instance(&name).await {
                        error!(instance = %name, error = %e, "Failed to process instance");
                        self.requeue(&name);
                    }
                    if queue.is_closed() && queue.is_empty() {
                        break;
                    }
                }
                None if queue.is_closed() => break,
                None => {}
            }
        }

        info!(stats = ?self.stats.snapshot(), "Provisioning worker stopped");
    }

    /// Drive one delivered instance as far as it can go.
    pub async fn process_instance(&self, name: &str) -> Result<Outcome> {
        WorkerStats::bump(&self.stats.processed);

        let Some(mut instance) = self.store.get_instance(name).await? else {
            debug!(instance = %name, "Instance no longer exists, skipping");
            return Ok(Outcome::Skipped);
        };
        if instance.state != InstanceState::Pending {
            debug!(instance = %name, state = %instance.state, "Instance not pending, skipping");
            return Ok(Outcome::Skipped);
        }

        if let Poll::NotReady = self.poll(&mut instance).await {
            return Ok(self.requeue(name));
        }

        if let Step::Failed(reason) = self.authorize(&instance).await {
            return self.compensate(instance, reason).await;
        }

        if let Step::Failed(reason) = self.create_database(&instance).await {
            return self.compensate(instance, reason).await;
        }

        instance.state = InstanceState::Running;
        instance.reason = None;
        self.store.update_instance(&instance).await?;
        WorkerStats::bump(&self.stats.provisioned);
        info!(
            instance = %instance.name,
            host = instance.host.as_deref().unwrap_or_default(),
            port = instance.port,
            "Instance running"
        );
        Ok(Outcome::Provisioned)
    }

    async fn poll(&self, instance: &mut Instance) -> Poll {
        let name = instance.name.clone();
        match self.compute_call(self.compute.get(instance)).await {
            Ok(true) => Poll::Ready,
            Ok(false) => {
                debug!(instance = %name, "Compute instance not ready");
                Poll::NotReady
            }
            Err(e) => {
                warn!(instance = %name, error = %e, "Polling compute instance failed");
                Poll::NotReady
            }
        }
    }

    async fn authorize(&self, instance: &Instance) -> Step {
        match self.compute_call(self.compute.authorize(instance)).await {
            Ok(true) => Step::Done,
            Ok(false) => {
                warn!(instance = %instance.name, "Authorize refused");
                Step::Failed(AUTHORIZE_FAILED.to_string())
            }
            Err(e) => {
                warn!(instance = %instance.name, error = %e, "Authorize failed");
                Step::Failed(AUTHORIZE_FAILED.to_string())
            }
        }
    }

    async fn create_database(&self, instance: &Instance) -> Step {
        let Some(host) = instance.host.as_deref() else {
            return Step::Failed(MISSING_HOST.to_string());
        };
        let target = ServerTarget::new(
            host,
            instance.port,
            &self.config.admin_user,
            &self.config.admin_password,
        );
        let engine = self.engines.engine(&instance.name, &target);

        match self.engine_call(engine.create_database()).await {
            Ok(()) => Step::Done,
            // A dedicated server only ever holds this database; an earlier
            // attempt created it but never recorded `running`.
            Err(EngineError::DatabaseExists(_)) => {
                info!(instance = %instance.name, "Database already exists, resuming");
                Step::Done
            }
            Err(e) => {
                warn!(instance = %instance.name, error = %e, "Database creation failed");
                Step::Failed(e.to_string())
            }
        }
    }

    /// Roll back a partially provisioned instance and mark it failed.
    ///
    /// Unauthorize always precedes terminate. A refused terminate keeps the
    /// compute id on the row so the instance shows up as orphaned.
    async fn compensate(&self, mut instance: Instance, reason: String) -> Result<Outcome> {
        match self.compute_call(self.compute.unauthorize(&instance)).await {
            Ok(true) => {}
            Ok(false) => warn!(instance = %instance.name, "Unauthorize refused"),
            Err(e) => warn!(instance = %instance.name, error = %e, "Unauthorize failed"),
        }

        let terminated = match self.compute_call(self.compute.terminate(&instance)).await {
            Ok(terminated) => terminated,
            Err(e) => {
                warn!(instance = %instance.name, error = %e, "Terminate failed");
                false
            }
        };

        if terminated {
            instance.compute_id = None;
        } else {
            WorkerStats::bump(&self.stats.orphaned);
            error!(
                instance = %instance.name,
                compute_id = instance.compute_id.as_deref().unwrap_or_default(),
                "Compute instance could not be terminated and is orphaned"
            );
        }

        instance.fail(reason.clone());
        self.store.update_instance(&instance).await?;
        WorkerStats::bump(&self.stats.failed);
        warn!(instance = %instance.name, reason = %reason, "Instance failed");

        Ok(Outcome::Failed {
            reason,
            orphaned: !terminated,
        })
    }

    /// Push `name` back with the poll delay, unless the queue is closed.
    fn requeue(&self, name: &str) -> Outcome {
        let queue = self.coordinator.queue();
        if queue.is_closed() {
            debug!(instance = %name, "Queue closed, leaving instance pending");
            return Outcome::Deferred;
        }
        queue.put_delayed(name, self.config.poll_interval);
        WorkerStats::bump(&self.stats.requeued);
        debug!(
            instance = %name,
            delay_secs = self.config.poll_interval.as_secs_f64(),
            "Instance requeued"
        );
        Outcome::Requeued
    }

    async fn compute_call<F>(&self, call: F) -> compute::Result<bool>
    where
        F: Future<Output = compute::Result<bool>>,
    {
        tokio::time::timeout(self.config.call_timeout, call)
            .await
            .unwrap_or(Err(ComputeError::Timeout))
    }

    async fn engine_call<F>(&self, call: F) -> engine::Result<()>
    where
        F: Future<Output = engine::Result<()>>,
    {
        tokio::time::timeout(self.config.call_timeout, call)
            .await
            .unwrap_or(Err(EngineError::Timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_config_default() {
        let config = WorkerConfig::default();
        assert_eq!(config.poll_timeout, Duration::from_secs(2));
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.call_timeout, Duration::from_secs(60));
        assert_eq!(config.admin_user, "root");
        assert!(config.admin_password.is_empty());
    }

    #[test]
    fn test_stats_snapshot() {
        let stats = WorkerStats::default();
        WorkerStats::bump(&stats.processed);
        WorkerStats::bump(&stats.processed);
        WorkerStats::bump(&stats.orphaned);

        assert_eq!(
            stats.snapshot(),
            WorkerStatsSnapshot {
                processed: 2,
                orphaned: 1,
                ..Default::default()
            }
        );
    }
}
