// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Compute client trait definitions.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::Instance;

/// Errors from compute provider calls.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ComputeError {
    /// Transport-level failure talking to the provider.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with an unexpected status.
    #[error("Compute gateway returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, if any.
        body: String,
    },

    /// The instance was never booted.
    #[error("Instance {0} has no compute id")]
    MissingComputeId(String),

    /// The provider did not answer before the deadline.
    #[error("Compute call timed out")]
    Timeout,

    /// Other error.
    #[error("Other: {0}")]
    Other(String),
}

/// Result type for compute operations.
pub type Result<T> = std::result::Result<T, ComputeError>;

/// Capability interface over the compute provider.
///
/// Every call reports success as a boolean. `Ok(false)` is a refusal by the
/// provider; `Err` is a failure to get an answer at all. Callers treat both
/// as "did not happen".
#[async_trait]
pub trait ComputeClient: Send + Sync {
    /// Short provider name for logs.
    fn client_type(&self) -> &'static str;

    /// Request a new compute instance. On success sets `compute_id`.
    async fn run(&self, instance: &mut Instance) -> Result<bool>;

    /// Poll the compute instance. Returns true once it has a usable
    /// address, and sets `host`.
    async fn get(&self, instance: &mut Instance) -> Result<bool>;

    /// Open network access to the database port.
    async fn authorize(&self, instance: &Instance) -> Result<bool>;

    /// Close network access to the database port.
    async fn unauthorize(&self, instance: &Instance) -> Result<bool>;

    /// Destroy the compute instance.
    async fn terminate(&self, instance: &Instance) -> Result<bool>;
}

/// The compute id of a booted instance.
pub(crate) fn compute_id(instance: &Instance) -> Result<&str> {
    instance
        .compute_id
        .as_deref()
        .ok_or_else(|| ComputeError::MissingComputeId(instance.name.clone()))
}
