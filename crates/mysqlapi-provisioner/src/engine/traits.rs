// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Database engine trait definitions.

use async_trait::async_trait;
use thiserror::Error;

/// Errors from database engine calls.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The database already exists on the server.
    #[error("Can't create database '{0}'; database exists")]
    DatabaseExists(String),

    /// The server rejected a statement or could not be reached.
    #[error("{0}")]
    Sql(#[from] sqlx::Error),

    /// The server did not answer before the deadline.
    #[error("Database engine call timed out")]
    Timeout,

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Address and admin credentials of a database server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerTarget {
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Admin user.
    pub user: String,
    /// Admin password.
    pub password: String,
}

impl ServerTarget {
    /// Target with the given address and credentials.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            password: password.into(),
        }
    }
}

/// Operations on one logical database of one server.
#[async_trait]
pub trait DatabaseEngine: Send + Sync {
    /// Name of the database this engine manages.
    fn database(&self) -> &str;

    async fn create_database(&self) -> Result<()>;

    async fn drop_database(&self) -> Result<()>;

    /// Create a user for `name` with all privileges on the database.
    ///
    /// The username is derived from `name` and shortened when needed; the
    /// password is derived from the username. `host` defaults to any host.
    /// Returns the `(username, password)` pair.
    async fn create_user(&self, name: &str, host: Option<&str>) -> Result<(String, String)>;

    /// Drop the user created for `name`.
    async fn drop_user(&self, name: &str, host: Option<&str>) -> Result<()>;

    /// Whether the server accepts connections.
    async fn is_up(&self) -> bool;
}

/// Builds engines bound to a database and a server.
pub trait EngineFactory: Send + Sync {
    fn engine(&self, database: &str, target: &ServerTarget) -> Box<dyn DatabaseEngine>;
}

/// Host wildcard used when no client host is given.
pub const ANY_HOST: &str = "%";
