// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Compute providers hosting dedicated database servers.

pub mod disabled;
pub mod http;
pub mod mock;
mod traits;

pub use disabled::DisabledComputeClient;
pub use http::HttpComputeClient;
pub use mock::{ActionLog, MockComputeClient};
pub use traits::*;
