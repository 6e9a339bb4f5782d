// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL-backed store.

use sqlx::PgPool;

use crate::error::Result;
use crate::models::{Instance, ProvisionedInstance};

use super::{InstanceStore, map_insert_error};

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a store from an existing, migrated pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Access the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl InstanceStore for PostgresStore {
    async fn insert_instance(&self, instance: &Instance) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO instances (name, compute_id, state, reason, host, port, shared, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
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
        let record = sqlx::query_as::<_, Instance>(
            r#"
            SELECT name, compute_id, state, reason, host, port, shared, created_at, updated_at
            FROM instances
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn update_instance(&self, instance: &Instance) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE instances
            SET compute_id = $2, state = $3, reason = $4, host = $5, port = $6, shared = $7,
                updated_at = NOW()
            WHERE name = $1
            "#,
        )
        .bind(&instance.name)
        .bind(&instance.compute_id)
        .bind(instance.state.as_str())
        .bind(&instance.reason)
        .bind(&instance.host)
        .bind(i32::from(instance.port))
        .bind(instance.shared)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_instance(&self, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM instances WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_pending_dedicated(&self) -> Result<Vec<Instance>> {
        let records = sqlx::query_as::<_, Instance>(
            r#"
            SELECT name, compute_id, state, reason, host, port, shared, created_at, updated_at
            FROM instances
            WHERE state = 'pending' AND shared = FALSE
            ORDER BY created_at, name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn list_orphaned(&self) -> Result<Vec<Instance>> {
        let records = sqlx::query_as::<_, Instance>(
            r#"
            SELECT name, compute_id, state, reason, host, port, shared, created_at, updated_at
            FROM instances
            WHERE state = 'error' AND compute_id IS NOT NULL
            ORDER BY created_at, name
            "#,
        )
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
        let record = sqlx::query_as::<_, ProvisionedInstance>(
            r#"
            INSERT INTO provisioned_instances (host, port, admin_user, admin_password)
            VALUES ($1, $2, $3, $4)
            RETURNING id, host, port, admin_user, admin_password, instance_name
            "#,
        )
        .bind(host)
        .bind(i32::from(port))
        .bind(admin_user)
        .bind(admin_password)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    async fn claim_provisioned(&self, instance_name: &str) -> Result<Option<ProvisionedInstance>> {
        // SKIP LOCKED lets concurrent claimers pick different free rows.
        let record = sqlx::query_as::<_, ProvisionedInstance>(
            r#"
            UPDATE provisioned_instances
            SET instance_name = $1
            WHERE id = (
                SELECT id FROM provisioned_instances
                WHERE instance_name IS NULL
                ORDER BY id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, host, port, admin_user, admin_password, instance_name
            "#,
        )
        .bind(instance_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, instance_name))?;

        Ok(record)
    }

    async fn release_provisioned(&self, id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE provisioned_instances
            SET instance_name = NULL
            WHERE id = $1 AND instance_name IS NOT NULL
            "#,
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
        let record = sqlx::query_as::<_, ProvisionedInstance>(
            r#"
            SELECT id, host, port, admin_user, admin_password, instance_name
            FROM provisioned_instances
            WHERE instance_name = $1
            "#,
        )
        .bind(instance_name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_provisioned(&self) -> Result<Vec<ProvisionedInstance>> {
        let records = sqlx::query_as::<_, ProvisionedInstance>(
            r#"
            SELECT id, host, port, admin_user, admin_password, instance_name
            FROM provisioned_instances
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
