// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the provisioner.
//!
//! Synchronous request-path failures (validation, conflicts, allocation) are
//! returned to the caller. Failures after a dedicated instance has been
//! accepted never surface here; the worker records them on the instance row.

use thiserror::Error;

/// Provisioner errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Metadata store operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Applying metadata store migrations failed.
    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Compute provider call failed.
    #[error("Compute error: {0}")]
    Compute(#[from] crate::compute::ComputeError),

    /// Database engine call failed.
    #[error("Engine error: {0}")]
    Engine(#[from] crate::engine::EngineError),

    /// The requested name is reserved.
    #[error("{0} is an invalid name.")]
    InvalidInstanceName(String),

    /// An instance with the canonical name already exists.
    #[error("Instance {0} already exists.")]
    InstanceAlreadyExists(String),

    /// The database could not be created synchronously (boot rejected,
    /// pool exhausted, or pool allocation failed).
    #[error("{0}")]
    DatabaseCreation(String),

    /// Instance was not found.
    #[error("Instance {0} not found")]
    InstanceNotFound(String),

    /// The instance exists but is not serving yet.
    #[error("You can't bind to this instance because it's not running.")]
    InstanceNotRunning(String),

    /// Tearing down a dedicated instance failed.
    #[error("Failed to terminate the instance.")]
    TerminateFailed(String),

    /// A pool entry was expected but is missing or already released.
    #[error("Pool entry unavailable: {0}")]
    PoolEntryUnavailable(String),
}

impl Error {
    /// Stable error code for outer transport layers.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Migrate(_) => "MIGRATION_ERROR",
            Self::Compute(_) => "COMPUTE_ERROR",
            Self::Engine(_) => "ENGINE_ERROR",
            Self::InvalidInstanceName(_) => "INVALID_INSTANCE_NAME",
            Self::InstanceAlreadyExists(_) => "INSTANCE_ALREADY_EXISTS",
            Self::DatabaseCreation(_) => "DATABASE_CREATION_ERROR",
            Self::InstanceNotFound(_) => "INSTANCE_NOT_FOUND",
            Self::InstanceNotRunning(_) => "INSTANCE_NOT_RUNNING",
            Self::TerminateFailed(_) => "TERMINATE_FAILED",
            Self::PoolEntryUnavailable(_) => "POOL_ENTRY_UNAVAILABLE",
        }
    }

    /// Whether the error was caused by the request rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInstanceName(_)
                | Self::InstanceAlreadyExists(_)
                | Self::InstanceNotFound(_)
                | Self::InstanceNotRunning(_)
        )
    }
}

/// Result type using the provisioner Error.
pub type Result<T> = std::result::Result<T, Error>;
