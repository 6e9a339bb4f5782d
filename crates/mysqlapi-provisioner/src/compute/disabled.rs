// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Compute client used when no provider is configured.

use async_trait::async_trait;

use super::traits::*;
use crate::models::Instance;

/// Refuses boots and fails every call on an existing instance.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledComputeClient;

fn unavailable() -> ComputeError {
    ComputeError::Other("no compute provider configured".to_string())
}

#[async_trait]
impl ComputeClient for DisabledComputeClient {
    fn client_type(&self) -> &'static str {
        "disabled"
    }

    async fn run(&self, _instance: &mut Instance) -> Result<bool> {
        Ok(false)
    }

    async fn get(&self, _instance: &mut Instance) -> Result<bool> {
        Err(unavailable())
    }

    async fn authorize(&self, _instance: &Instance) -> Result<bool> {
        Err(unavailable())
    }

    async fn unauthorize(&self, _instance: &Instance) -> Result<bool> {
        Err(unavailable())
    }

    async fn terminate(&self, _instance: &Instance) -> Result<bool> {
        Err(unavailable())
    }
}
