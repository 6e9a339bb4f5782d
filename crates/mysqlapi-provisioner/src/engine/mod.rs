// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Database engines that create databases and users on a server.

pub mod mock;
pub mod mysql;
mod traits;

pub use mock::MockEngineFactory;
pub use mysql::{MySqlEngine, MySqlEngineFactory};
pub use traits::*;
