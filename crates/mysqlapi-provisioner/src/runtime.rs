// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable provisioner runtime.
//!
//! [`ProvisionerRuntime`] wires the store, compute client and engine factory
//! into a coordinator, a request-path service and the background worker.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mysqlapi_provisioner::compute::HttpComputeClient;
//! use mysqlapi_provisioner::engine::MySqlEngineFactory;
//! use mysqlapi_provisioner::runtime::ProvisionerRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = mysqlapi_provisioner::Config::from_env()?;
//!     let store = mysqlapi_provisioner::persistence::connect(&config.database_url).await?;
//!
//!     let runtime = ProvisionerRuntime::builder()
//!         .store(store)
//!         .compute(Arc::new(HttpComputeClient::new(&compute_config, config.call_timeout)?))
//!         .engines(Arc::new(MySqlEngineFactory::new(&config.salt)))
//!         .config(&config)
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     runtime.service().create_instance("my-app").await?;
//!
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::compute::ComputeClient;
use crate::config::Config;
use crate::coordinator::ProvisioningCoordinator;
use crate::engine::EngineFactory;
use crate::persistence::InstanceStore;
use crate::service::{InstanceService, ServiceSettings};
use crate::worker::{ProvisioningWorker, WorkerConfig, WorkerStats, WorkerStatsSnapshot};

/// Builder for creating a [`ProvisionerRuntime`].
#[derive(Default)]
pub struct ProvisionerRuntimeBuilder {
    store: Option<Arc<dyn InstanceStore>>,
    compute: Option<Arc<dyn ComputeClient>>,
    engines: Option<Arc<dyn EngineFactory>>,
    settings: ServiceSettings,
    worker_config: WorkerConfig,
}

impl ProvisionerRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the metadata store (required).
    pub fn store(mut self, store: Arc<dyn InstanceStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the compute client (required).
    pub fn compute(mut self, compute: Arc<dyn ComputeClient>) -> Self {
        self.compute = Some(compute);
        self
    }

    /// Set the database engine factory (required).
    pub fn engines(mut self, engines: Arc<dyn EngineFactory>) -> Self {
        self.engines = Some(engines);
        self
    }

    /// Take routing, credentials and timings from a loaded configuration.
    pub fn config(mut self, config: &Config) -> Self {
        self.settings = ServiceSettings::from_config(config);
        self.worker_config = WorkerConfig {
            poll_timeout: config.queue_poll_timeout,
            poll_interval: config.poll_interval,
            call_timeout: config.call_timeout,
            admin_user: config.admin_user.clone(),
            admin_password: config.admin_password.clone(),
        };
        self
    }

    /// Set request-path settings.
    ///
    /// Default: dedicated routing, default reserved names, `root` admin
    pub fn settings(mut self, settings: ServiceSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Set the worker configuration.
    ///
    /// Default: [`WorkerConfig::default()`]
    pub fn worker_config(mut self, config: WorkerConfig) -> Self {
        self.worker_config = config;
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> Result<ProvisionerRuntimeConfig> {
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("store is required"))?;
        let compute = self
            .compute
            .ok_or_else(|| anyhow::anyhow!("compute is required"))?;
        let engines = self
            .engines
            .ok_or_else(|| anyhow::anyhow!("engines is required"))?;

        Ok(ProvisionerRuntimeConfig {
            store,
            compute,
            engines,
            settings: self.settings,
            worker_config: self.worker_config,
        })
    }
}

/// Configuration for a [`ProvisionerRuntime`].
pub struct ProvisionerRuntimeConfig {
    store: Arc<dyn InstanceStore>,
    compute: Arc<dyn ComputeClient>,
    engines: Arc<dyn EngineFactory>,
    settings: ServiceSettings,
    worker_config: WorkerConfig,
}

impl ProvisionerRuntimeConfig {
    /// Rebuild the queue from the store and spawn the worker.
    pub async fn start(self) -> Result<ProvisionerRuntime> {
        let coordinator = Arc::new(ProvisioningCoordinator::new(self.store.clone()));

        // Pending instances from a previous run go back on the queue
        let recovered = coordinator.build_queue().await?;

        let orphaned = self.store.list_orphaned().await?;
        for instance in &orphaned {
            error!(
                instance = %instance.name,
                compute_id = instance.compute_id.as_deref().unwrap_or_default(),
                "Errored instance still holds a compute instance"
            );
        }

        let service = Arc::new(InstanceService::new(
            self.store.clone(),
            self.compute.clone(),
            self.engines.clone(),
            coordinator.clone(),
            self.settings.clone(),
        ));

        let worker = ProvisioningWorker::new(
            coordinator.clone(),
            self.store,
            self.compute,
            self.engines,
            self.worker_config,
        );
        let stats = worker.stats();
        let worker_handle = tokio::spawn(worker.run());

        info!(
            routing = self.settings.routing.as_str(),
            recovered = recovered,
            orphaned = orphaned.len(),
            "ProvisionerRuntime started"
        );

        Ok(ProvisionerRuntime {
            worker_handle,
            coordinator,
            service,
            stats,
        })
    }
}

/// A running provisioner.
///
/// Call [`shutdown`](Self::shutdown) for graceful termination.
pub struct ProvisionerRuntime {
    worker_handle: JoinHandle<()>,
    coordinator: Arc<ProvisioningCoordinator>,
    service: Arc<InstanceService>,
    stats: Arc<WorkerStats>,
}

impl ProvisionerRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> ProvisionerRuntimeBuilder {
        ProvisionerRuntimeBuilder::new()
    }

    /// Request-path operations.
    pub fn service(&self) -> &Arc<InstanceService> {
        &self.service
    }

    /// The queue coordinator.
    pub fn coordinator(&self) -> &Arc<ProvisioningCoordinator> {
        &self.coordinator
    }

    /// Current worker counters.
    pub fn stats(&self) -> WorkerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Reset the queue and rebuild it from the store.
    pub async fn reload(&self) -> Result<usize> {
        Ok(self.coordinator.reset_queue().await?)
    }

    /// Close the queue and wait for the worker to drain it.
    pub async fn shutdown(self) -> Result<()> {
        info!("ProvisionerRuntime shutting down...");
        self.coordinator.close();

        if let Err(e) = self.worker_handle.await {
            error!("Provisioning worker task panicked: {}", e);
            return Err(anyhow::anyhow!("worker task panicked: {}", e));
        }

        info!(stats = ?self.stats.snapshot(), "ProvisionerRuntime shutdown complete");
        Ok(())
    }

    /// Check if the worker is still running.
    pub fn is_running(&self) -> bool {
        !self.worker_handle.is_finished()
    }
}
