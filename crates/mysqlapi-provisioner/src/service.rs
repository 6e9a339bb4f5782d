// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Request-path operations, independent of any transport.
//!
//! Creation validates and reserves the canonical name, then either completes
//! inline (shared server, pool) or boots a compute instance and hands it to
//! the worker (dedicated). Everything else here is synchronous bookkeeping
//! around the instance rows.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::compute::ComputeClient;
use crate::config::{
    Config, ConfigError, DEFAULT_MYSQL_PORT, DEFAULT_RESERVED_NAMES, Routing, SharedServer,
};
use crate::coordinator::ProvisioningCoordinator;
use crate::engine::{EngineError, EngineFactory, ServerTarget};
use crate::error::{Error, Result};
use crate::models::{Instance, InstanceState, ProvisionedInstance};
use crate::naming::canonicalize;
use crate::persistence::InstanceStore;

/// Reason returned when the compute provider refuses a boot.
pub const BOOT_FAILED: &str = "Failed to create compute instance.";

/// Reason returned when the pool has no free entry.
pub const POOL_EXHAUSTED: &str = "No free pool entry available.";

/// Request-path settings.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Placement policy for new databases.
    pub routing: Routing,
    /// Names rejected on creation.
    pub reserved_names: Vec<String>,
    /// Admin user on dedicated servers.
    pub admin_user: String,
    /// Admin password on dedicated servers.
    pub admin_password: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            routing: Routing::Dedicated,
            reserved_names: DEFAULT_RESERVED_NAMES.iter().map(|n| n.to_string()).collect(),
            admin_user: "root".to_string(),
            admin_password: String::new(),
        }
    }
}

impl ServiceSettings {
    /// Settings taken from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            routing: config.routing.clone(),
            reserved_names: config.reserved_names.clone(),
            admin_user: config.admin_user.clone(),
            admin_password: config.admin_password.clone(),
        }
    }

    fn shared_server(&self) -> Option<&SharedServer> {
        match &self.routing {
            Routing::Shared(server) => Some(server),
            _ => None,
        }
    }
}

/// Credentials handed to a bound application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindCredentials {
    /// Host the application connects to.
    pub host: String,
    /// Port the application connects to.
    pub port: u16,
    /// Database name.
    pub database: String,
    /// Generated user.
    pub user: String,
    /// Generated password.
    pub password: String,
}

impl BindCredentials {
    /// Environment variables exported to the application.
    pub fn to_env(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("MYSQL_HOST".to_string(), self.host.clone()),
            ("MYSQL_PORT".to_string(), self.port.to_string()),
            ("MYSQL_DATABASE_NAME".to_string(), self.database.clone()),
            ("MYSQL_USER".to_string(), self.user.clone()),
            ("MYSQL_PASSWORD".to_string(), self.password.clone()),
        ])
    }
}

/// Health of an instance as seen by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceHealth {
    /// Still being provisioned.
    Pending,
    /// Running and answering.
    Up,
    /// Failed, stopped, or not answering.
    Down,
}

/// Request-path operations over instances.
pub struct InstanceService {
    store: Arc<dyn InstanceStore>,
    compute: Arc<dyn ComputeClient>,
    engines: Arc<dyn EngineFactory>,
    coordinator: Arc<ProvisioningCoordinator>,
    settings: ServiceSettings,
}

impl InstanceService {
    /// Create a new service.
    pub fn new(
        store: Arc<dyn InstanceStore>,
        compute: Arc<dyn ComputeClient>,
        engines: Arc<dyn EngineFactory>,
        coordinator: Arc<ProvisioningCoordinator>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            store,
            compute,
            engines,
            coordinator,
            settings,
        }
    }

    /// Active settings.
    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Create a database for `name`.
    ///
    /// Shared and pool placements return a running instance. Dedicated
    /// placement returns a pending instance that the worker completes.
    pub async fn create_instance(&self, name: &str) -> Result<Instance> {
        let name = canonicalize(name);
        if self.settings.reserved_names.iter().any(|r| *r == name) {
            return Err(Error::InvalidInstanceName(name));
        }
        if self.store.get_instance(&name).await?.is_some() {
            return Err(Error::InstanceAlreadyExists(name));
        }

        debug!(instance = %name, routing = self.settings.routing.as_str(), "Creating instance");
        match &self.settings.routing {
            Routing::Shared(server) => self.create_shared(name, server).await,
            Routing::Pool => self.create_from_pool(name).await,
            Routing::Dedicated => self.create_dedicated(name).await,
        }
    }

    async fn create_shared(&self, name: String, server: &SharedServer) -> Result<Instance> {
        let engine = self.engines.engine(&name, &shared_target(server));
        match engine.create_database().await {
            Ok(()) => {}
            Err(EngineError::DatabaseExists(_)) => return Err(Error::InstanceAlreadyExists(name)),
            Err(e) => return Err(e.into()),
        }

        let mut instance = Instance::new(name);
        instance.state = InstanceState::Running;
        instance.shared = true;
        instance.host = Some(server.host.clone());
        self.store.insert_instance(&instance).await?;

        info!(instance = %instance.name, host = %server.host, "Instance created on shared server");
        Ok(instance)
    }

    async fn create_from_pool(&self, name: String) -> Result<Instance> {
        let Some(entry) = self.store.claim_provisioned(&name).await? else {
            warn!(instance = %name, "Pool exhausted");
            return Err(Error::DatabaseCreation(POOL_EXHAUSTED.to_string()));
        };

        let engine = self.engines.engine(&name, &pool_target(&entry));
        if let Err(e) = engine.create_database().await {
            self.release_entry(&entry).await;
            return Err(Error::DatabaseCreation(e.to_string()));
        }

        let mut instance = Instance::new(name);
        instance.state = InstanceState::Running;
        instance.host = Some(entry.host.clone());
        instance.port = entry.port;

        if let Err(e) = self.store.insert_instance(&instance).await {
            if let Err(drop_err) = engine.drop_database().await {
                warn!(instance = %instance.name, error = %drop_err, "Failed to drop database after lost insert");
            }
            self.release_entry(&entry).await;
            return Err(e);
        }

        info!(instance = %instance.name, host = %entry.host, pool_entry = entry.id, "Instance allocated from pool");
        Ok(instance)
    }

    async fn create_dedicated(&self, name: String) -> Result<Instance> {
        let mut instance = Instance::new(name);
        let booted = match self.compute.run(&mut instance).await {
            Ok(booted) => booted,
            Err(e) => {
                warn!(instance = %instance.name, error = %e, "Compute boot request failed");
                false
            }
        };
        if !booted {
            warn!(instance = %instance.name, "Compute instance was not created");
            return Err(Error::DatabaseCreation(BOOT_FAILED.to_string()));
        }

        if let Err(e) = self.store.insert_instance(&instance).await {
            match self.compute.terminate(&instance).await {
                Ok(true) => {}
                Ok(false) | Err(_) => error!(
                    instance = %instance.name,
                    compute_id = instance.compute_id.as_deref().unwrap_or_default(),
                    "Compute instance could not be terminated after lost insert"
                ),
            }
            return Err(e);
        }

        self.coordinator.enqueue(&instance.name);
        info!(
            instance = %instance.name,
            compute_id = instance.compute_id.as_deref().unwrap_or_default(),
            "Instance submitted for provisioning"
        );
        Ok(instance)
    }

    /// Look up an instance by (uncanonicalized) name.
    pub async fn get_instance(&self, name: &str) -> Result<Instance> {
        let name = canonicalize(name);
        let found = self.store.get_instance(&name).await?;
        found.ok_or(Error::InstanceNotFound(name))
    }

    /// Tear down an instance and delete its row.
    pub async fn drop_instance(&self, name: &str) -> Result<()> {
        let instance = self.get_instance(name).await?;

        if instance.shared {
            let server = self.require_shared_server()?;
            self.engines
                .engine(&instance.name, &shared_target(server))
                .drop_database()
                .await?;
        } else if instance.compute_id.is_some() {
            if !self.compute.unauthorize(&instance).await.unwrap_or(false) {
                warn!(instance = %instance.name, "Unauthorize failed while dropping instance");
            }
            if !self.compute.terminate(&instance).await.unwrap_or(false) {
                return Err(Error::TerminateFailed(instance.name));
            }
        } else if let Some(entry) = self.store.get_provisioned_for(&instance.name).await? {
            self.dealloc(&instance, &entry).await?;
        } else {
            debug!(instance = %instance.name, state = %instance.state, "No backing resources to release");
        }

        self.store.delete_instance(&instance.name).await?;
        info!(instance = %instance.name, "Instance dropped");
        Ok(())
    }

    /// Drop the database on a pool entry and free the entry.
    async fn dealloc(&self, instance: &Instance, entry: &ProvisionedInstance) -> Result<()> {
        self.engines
            .engine(&instance.name, &pool_target(entry))
            .drop_database()
            .await?;

        let mut stopped = instance.clone();
        stopped.state = InstanceState::Stopped;
        self.store.update_instance(&stopped).await?;

        if !self.store.release_provisioned(entry.id).await? {
            return Err(Error::PoolEntryUnavailable(format!(
                "pool entry {} was not allocated",
                entry.id
            )));
        }
        Ok(())
    }

    /// Create a user for an application and return its credentials.
    pub async fn bind_app(&self, name: &str, app_host: Option<&str>) -> Result<BindCredentials> {
        let instance = self.get_instance(name).await?;
        if !instance.is_running() {
            return Err(Error::InstanceNotRunning(instance.name));
        }

        let target = self.target_for(&instance).await?;
        let (user, password) = self
            .engines
            .engine(&instance.name, &target)
            .create_user(&instance.name, app_host)
            .await?;

        let host = match (instance.shared, self.settings.shared_server()) {
            (true, Some(server)) => server.public_host.clone(),
            _ => target.host,
        };

        debug!(instance = %instance.name, user = %user, "Application bound");
        Ok(BindCredentials {
            host,
            port: instance.port,
            database: instance.name,
            user,
            password,
        })
    }

    /// Drop the user created for an application.
    pub async fn unbind_app(&self, name: &str, app_host: Option<&str>) -> Result<()> {
        let instance = self.get_instance(name).await?;
        let target = self.target_for(&instance).await?;
        self.engines
            .engine(&instance.name, &target)
            .drop_user(&instance.name, app_host)
            .await?;

        debug!(instance = %instance.name, "Application unbound");
        Ok(())
    }

    /// Report whether an instance is pending, up, or down.
    pub async fn health(&self, name: &str) -> Result<InstanceHealth> {
        let instance = self.get_instance(name).await?;
        match instance.state {
            InstanceState::Pending => Ok(InstanceHealth::Pending),
            InstanceState::Running => {
                let target = self.target_for(&instance).await?;
                let up = self
                    .engines
                    .engine(&instance.name, &target)
                    .is_up()
                    .await;
                Ok(if up {
                    InstanceHealth::Up
                } else {
                    InstanceHealth::Down
                })
            }
            InstanceState::Error | InstanceState::Stopped => Ok(InstanceHealth::Down),
        }
    }

    /// Register a pre-provisioned server in the pool.
    pub async fn add_pool_server(
        &self,
        host: &str,
        port: u16,
        admin_user: &str,
        admin_password: &str,
    ) -> Result<ProvisionedInstance> {
        let entry = self
            .store
            .insert_provisioned(host, port, admin_user, admin_password)
            .await?;
        info!(host = %host, port = port, pool_entry = entry.id, "Pool server registered");
        Ok(entry)
    }

    /// Errored instances whose compute instance is still alive.
    pub async fn orphaned_instances(&self) -> Result<Vec<Instance>> {
        self.store.list_orphaned().await
    }

    /// Server and admin credentials backing `instance`.
    async fn target_for(&self, instance: &Instance) -> Result<ServerTarget> {
        if instance.shared {
            return Ok(shared_target(self.require_shared_server()?));
        }
        if instance.compute_id.is_none()
            && let Some(entry) = self.store.get_provisioned_for(&instance.name).await?
        {
            return Ok(pool_target(&entry));
        }
        let host = instance
            .host
            .clone()
            .ok_or_else(|| Error::InstanceNotRunning(instance.name.clone()))?;
        Ok(ServerTarget::new(
            host,
            instance.port,
            &self.settings.admin_user,
            &self.settings.admin_password,
        ))
    }

    fn require_shared_server(&self) -> Result<&SharedServer> {
        self.settings
            .shared_server()
            .ok_or(Error::Config(ConfigError::Missing("MYSQLAPI_SHARED_SERVER")))
    }

    async fn release_entry(&self, entry: &ProvisionedInstance) {
        if let Err(e) = self.store.release_provisioned(entry.id).await {
            error!(pool_entry = entry.id, error = %e, "Failed to release pool entry");
        }
    }
}

fn shared_target(server: &SharedServer) -> ServerTarget {
    ServerTarget::new(
        &server.host,
        DEFAULT_MYSQL_PORT,
        &server.user,
        &server.password,
    )
}

fn pool_target(entry: &ProvisionedInstance) -> ServerTarget {
    ServerTarget::new(
        &entry.host,
        entry.port,
        &entry.admin_user,
        &entry.admin_password,
    )
}
