// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for mysqlapi-provisioner integration tests.
//!
//! Provides a TestContext wiring an in-memory SQLite store, the mock compute
//! client and the mock engine factory into a coordinator, worker and service.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use mysqlapi_provisioner::compute::{ActionLog, ComputeClient, MockComputeClient};
use mysqlapi_provisioner::config::{Routing, SharedServer};
use mysqlapi_provisioner::coordinator::ProvisioningCoordinator;
use mysqlapi_provisioner::engine::{EngineFactory, MockEngineFactory};
use mysqlapi_provisioner::persistence::{self, InstanceStore};
use mysqlapi_provisioner::service::{InstanceService, ServiceSettings};
use mysqlapi_provisioner::worker::{ProvisioningWorker, WorkerConfig};

/// Salt used by every test engine.
pub const SALT: &str = "salt";

/// Connect to a fresh in-memory SQLite store with migrations applied.
pub async fn memory_store() -> Arc<dyn InstanceStore> {
    persistence::connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory store")
}

/// Worker timings short enough for real-time tests.
pub fn fast_worker_config() -> WorkerConfig {
    WorkerConfig {
        poll_timeout: Duration::from_millis(20),
        poll_interval: Duration::from_millis(10),
        call_timeout: Duration::from_millis(500),
        ..WorkerConfig::default()
    }
}

/// Settings for a shared server at `shared.example` / `public.example`.
pub fn shared_settings() -> ServiceSettings {
    ServiceSettings {
        routing: Routing::Shared(SharedServer {
            host: "shared.example".to_string(),
            public_host: "public.example".to_string(),
            user: "root".to_string(),
            password: "secret".to_string(),
        }),
        ..ServiceSettings::default()
    }
}

/// Settings that allocate from the pool.
pub fn pool_settings() -> ServiceSettings {
    ServiceSettings {
        routing: Routing::Pool,
        ..ServiceSettings::default()
    }
}

/// Everything a provisioning test needs, sharing one action log.
pub struct TestContext {
    pub store: Arc<dyn InstanceStore>,
    pub coordinator: Arc<ProvisioningCoordinator>,
    pub compute: Arc<MockComputeClient>,
    pub engines: Arc<MockEngineFactory>,
    pub log: ActionLog,
}

impl TestContext {
    /// Context with default mocks.
    pub async fn new() -> Self {
        Self::with_mocks(|c| c, |e| e).await
    }

    /// Context whose mocks are customized by the given builders.
    pub async fn with_mocks(
        compute: impl FnOnce(MockComputeClient) -> MockComputeClient,
        engines: impl FnOnce(MockEngineFactory) -> MockEngineFactory,
    ) -> Self {
        let log = ActionLog::new();
        let store = memory_store().await;
        let coordinator = Arc::new(ProvisioningCoordinator::new(store.clone()));
        let compute = Arc::new(compute(MockComputeClient::new(log.clone())));
        let engines = Arc::new(engines(MockEngineFactory::new(log.clone()).with_salt(SALT)));

        Self {
            store,
            coordinator,
            compute,
            engines,
            log,
        }
    }

    pub fn compute_client(&self) -> Arc<dyn ComputeClient> {
        self.compute.clone()
    }

    pub fn engine_factory(&self) -> Arc<dyn EngineFactory> {
        self.engines.clone()
    }

    /// A worker over this context with fast timings.
    pub fn worker(&self) -> ProvisioningWorker {
        self.worker_with(fast_worker_config())
    }

    pub fn worker_with(&self, config: WorkerConfig) -> ProvisioningWorker {
        ProvisioningWorker::new(
            self.coordinator.clone(),
            self.store.clone(),
            self.compute_client(),
            self.engine_factory(),
            config,
        )
    }

    /// A service over this context.
    pub fn service(&self, settings: ServiceSettings) -> InstanceService {
        InstanceService::new(
            self.store.clone(),
            self.compute_client(),
            self.engine_factory(),
            self.coordinator.clone(),
            settings,
        )
    }
}
