// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence interfaces and backends.
//!
//! Instance rows are the only durable state of the provisioner. The in-memory
//! queue is rebuilt from them on every start.

pub mod postgres;
pub mod sqlite;

pub use self::postgres::PostgresStore;
pub use self::sqlite::SqliteStore;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::error::{Error, Result};
use crate::models::{Instance, ProvisionedInstance};

/// Storage for instances and pool entries.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Insert a new instance. A taken name yields `InstanceAlreadyExists`.
    async fn insert_instance(&self, instance: &Instance) -> Result<()>;

    async fn get_instance(&self, name: &str) -> Result<Option<Instance>>;

    /// Persist every mutable field of an existing instance.
    async fn update_instance(&self, instance: &Instance) -> Result<()>;

    /// Delete an instance. Returns false if it did not exist.
    async fn delete_instance(&self, name: &str) -> Result<bool>;

    /// Pending instances that are not on the shared server, oldest first.
    async fn list_pending_dedicated(&self) -> Result<Vec<Instance>>;

    /// Errored instances that still hold a compute handle.
    async fn list_orphaned(&self) -> Result<Vec<Instance>>;

    /// Register a pool server.
    async fn insert_provisioned(
        &self,
        host: &str,
        port: u16,
        admin_user: &str,
        admin_password: &str,
    ) -> Result<ProvisionedInstance>;

    /// Atomically bind one free pool entry to `instance_name`.
    ///
    /// Returns `None` when the pool is exhausted.
    async fn claim_provisioned(&self, instance_name: &str) -> Result<Option<ProvisionedInstance>>;

    /// Clear the instance reference of a pool entry. Returns false if the
    /// entry was not allocated.
    async fn release_provisioned(&self, id: i64) -> Result<bool>;

    /// The pool entry allocated to `instance_name`, if any.
    async fn get_provisioned_for(&self, instance_name: &str)
    -> Result<Option<ProvisionedInstance>>;

    async fn list_provisioned(&self) -> Result<Vec<ProvisionedInstance>>;
}

/// Map a unique-key violation on insert to `InstanceAlreadyExists`.
pub(crate) fn map_insert_error(err: sqlx::Error, name: &str) -> Error {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            Error::InstanceAlreadyExists(name.to_string())
        }
        _ => Error::Database(err),
    }
}

/// Connect to the metadata store named by `url` and apply migrations.
///
/// `sqlite:` URLs select the SQLite backend, everything else PostgreSQL.
pub async fn connect(url: &str) -> Result<Arc<dyn InstanceStore>> {
    if url.starts_with("sqlite:") {
        // Every connection to an in-memory database gets its own database
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        crate::migrations::run_sqlite(&pool).await?;
        info!("Connected to SQLite metadata store");
        Ok(Arc::new(SqliteStore::new(pool)))
    } else {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        crate::migrations::run_postgres(&pool).await?;
        info!("Connected to PostgreSQL metadata store");
        Ok(Arc::new(PostgresStore::new(pool)))
    }
}
