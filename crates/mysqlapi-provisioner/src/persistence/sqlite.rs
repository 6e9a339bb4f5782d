// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed store.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::{Instance, ProvisionedInstance};

use super::{InstanceStore, map_insert_error};

const INSTANCE_COLUMNS: &str =
    "name, compute_id, state, reason, host, port, shared, created_at, updated_at";

const PROVISIONED_COLUMNS: &str = "id, host, port, admin_user, admin_password, instance_name";

/// SQLite-backed store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a store from an existing, migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl InstanceStore for SqliteStore {
    async fn insert_instance(&self, instance: &Instance) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO instances (name, compute_id, state, reason, host, port, shared, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&instance.name)
        .bind(&instance.compute_id)
        .bind(instance.state.as_str())
        .bind(&instance.reason)
        .bind(&instance.host)
        .bind(i32::from(instance.port))
        .bind(instance.shared)
        .bind(instance.created_at)
        .bind(instance.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, &instance.name))?;

        Ok(())
    }

    async fn get_instance(&self, name: &str) -> Result<Option<Instance>> {
        let sql = format!("SELECT {INSTANCE_COLUMNS} FROM instances WHERE name = ?");
        let record = sqlx::query_as::<_, Instance>(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    async fn update_instance(&self, instance: &Instance) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE instances
            SET compute_id = ?, state = ?, reason = ?, host = ?, port = ?, shared = ?, updated_at = ?
            WHERE name = ?
            "#,
        )
        .bind(&instance.compute_id)
        .bind(instance.state.as_str())
        .bind(&instance.reason)
        .bind(&instance.host)
        .bind(i32::from(instance.port))
        .bind(instance.shared)
        .bind(Utc::now())
        .bind(&instance.name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_instance(&self, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM instances WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_pending_dedicated(&self) -> Result<Vec<Instance>> {
        let sql = format!(
            "SELECT {INSTANCE_COLUMNS} FROM instances \
             WHERE state = 'pending' AND shared = 0 ORDER BY created_at, name"
        );
        let records = sqlx::query_as::<_, Instance>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    async fn list_orphaned(&self) -> Result<Vec<Instance>> {
        let sql = format!(
            "SELECT {INSTANCE_COLUMNS} FROM instances \
             WHERE state = 'error' AND compute_id IS NOT NULL ORDER BY created_at, name"
        );
        let records = sqlx::query_as::<_, Instance>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    async fn insert_provisioned(
        &self,
        host: &str,
        port: u16,
        admin_user: &str,
        admin_password: &str,
    ) -> Result<ProvisionedInstance> {
        let sql = format!(
            "INSERT INTO provisioned_instances (host, port, admin_user, admin_password) \
             VALUES (?, ?, ?, ?) RETURNING {PROVISIONED_COLUMNS}"
        );
        let record = sqlx::query_as::<_, ProvisionedInstance>(&sql)
            .bind(host)
            .bind(i32::from(port))
            .bind(admin_user)
            .bind(admin_password)
            .fetch_one(&self.pool)
            .await?;

        Ok(record)
    }

    async fn claim_provisioned(&self, instance_name: &str) -> Result<Option<ProvisionedInstance>> {
        // Single statement; SQLite serializes writers so no two callers get the same row.
        let sql = format!(
            "UPDATE provisioned_instances SET instance_name = ? \
             WHERE id = (SELECT id FROM provisioned_instances WHERE instance_name IS NULL ORDER BY id LIMIT 1) \
             RETURNING {PROVISIONED_COLUMNS}"
        );
        let record = sqlx::query_as::<_, ProvisionedInstance>(&sql)
            .bind(instance_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_insert_error(e, instance_name))?;

        Ok(record)
    }

    async fn release_provisioned(&self, id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE provisioned_instances SET instance_name = NULL WHERE id = ? AND instance_name IS NOT NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_provisioned_for(
        &self,
        instance_name: &str,
    ) -> Result<Option<ProvisionedInstance>> {
        let sql =
            format!("SELECT {PROVISIONED_COLUMNS} FROM provisioned_instances WHERE instance_name = ?");
        let record = sqlx::query_as::<_, ProvisionedInstance>(&sql)
            .bind(instance_name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    async fn list_provisioned(&self) -> Result<Vec<ProvisionedInstance>> {
        let sql = format!("SELECT {PROVISIONED_COLUMNS} FROM provisioned_instances ORDER BY id");
        let records = sqlx::query_as::<_, ProvisionedInstance>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }
}
