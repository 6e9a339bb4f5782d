// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Instance and pool entry records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_MYSQL_PORT;

/// Lifecycle state of an instance.
///
/// ```text
/// pending ──> running ──> stopped
///    │
///    └──────> error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    /// Compute instance requested, database not created yet.
    Pending,
    /// Database exists and host/port are valid.
    Running,
    /// Provisioning failed; `reason` says why.
    Error,
    /// Pool entry was released and the database dropped.
    Stopped,
}

impl InstanceState {
    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Error => "error",
            Self::Stopped => "stopped",
        }
    }

    /// Parse from database string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "error" => Some(Self::Error),
            "stopped" => Some(Self::Stopped),
            _ => None,
        }
    }
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state string stored in the database was not recognized.
#[derive(Debug, thiserror::Error)]
#[error("unknown instance state: {0}")]
pub struct UnknownState(pub String);

impl TryFrom<String> for InstanceState {
    type Error = UnknownState;

    fn try_from(value: String) -> Result<Self, UnknownState> {
        Self::parse(&value).ok_or(UnknownState(value))
    }
}

/// A provisioned database, identified by its canonical name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Instance {
    /// Canonical database name.
    pub name: String,
    /// Handle of the compute instance hosting a dedicated server.
    pub compute_id: Option<String>,
    /// Lifecycle state.
    #[sqlx(try_from = "String")]
    pub state: InstanceState,
    /// Failure message when `state` is `error`.
    pub reason: Option<String>,
    /// Server host, known once the instance is reachable.
    pub host: Option<String>,
    /// Server port.
    #[sqlx(try_from = "i32")]
    pub port: u16,
    /// Whether the database lives on the shared server.
    pub shared: bool,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

impl Instance {
    /// A fresh pending, dedicated instance.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            compute_id: None,
            state: InstanceState::Pending,
            reason: None,
            host: None,
            port: DEFAULT_MYSQL_PORT,
            shared: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the database is serving.
    pub fn is_running(&self) -> bool {
        self.state == InstanceState::Running
    }

    /// Mark the instance failed with a reason.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.state = InstanceState::Error;
        self.reason = Some(reason.into());
    }
}

/// A pre-provisioned server in the pool.
///
/// The entry owns the admin credential. `instance_name` is a plain reference
/// to the instance currently allocated on it and is cleared on release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProvisionedInstance {
    /// Database primary key.
    pub id: i64,
    /// Server host.
    pub host: String,
    /// Server port.
    #[sqlx(try_from = "i32")]
    pub port: u16,
    /// Admin user on the server.
    pub admin_user: String,
    /// Admin password on the server.
    pub admin_password: String,
    /// Instance currently allocated on this entry.
    pub instance_name: Option<String>,
}

impl ProvisionedInstance {
    /// Whether the entry is free for allocation.
    pub fn is_free(&self) -> bool {
        self.instance_name.is_none()
    }
}
