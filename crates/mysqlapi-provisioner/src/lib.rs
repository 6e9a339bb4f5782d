// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! mysqlapi provisioner - managed MySQL databases on demand
//!
//! This crate provisions MySQL databases for client applications. A database
//! is placed on a shared server, on a free server from a pre-provisioned
//! pool, or on a dedicated compute instance booted for it.
//!
//! # Architecture
//!
//! ```text
//!              create / drop / bind / health
//!                          │
//!                          ▼
//!               ┌─────────────────────┐
//!               │   InstanceService   │──── shared / pool: inline ───┐
//!               └──────────┬──────────┘                              │
//!                          │ dedicated: run + enqueue                │
//!                          ▼                                         ▼
//!  ┌───────────────────────────────────┐              ┌──────────────────────┐
//!  │      ProvisioningCoordinator      │              │    DatabaseEngine    │
//!  │  ┌─────────────────────────────┐  │              │  (MySQL over sqlx)   │
//!  │  │       InstanceQueue         │  │              └──────────────────────┘
//!  │  └──────────────┬──────────────┘  │                         ▲
//!  └─────────────────┼─────────────────┘                         │
//!                    ▼                                           │
//!          ┌───────────────────┐   get / authorize /             │
//!          │ ProvisioningWorker│── unauthorize / terminate ─┐    │
//!          └─────────┬─────────┘                            ▼    │
//!                    │ create database             ┌─────────────────┐
//!                    └─────────────────────────────│  ComputeClient  │
//!                                                  └─────────────────┘
//!                    ▲
//!                    │ rows are the durable state
//!          ┌───────────────────┐
//!          │   InstanceStore   │ (PostgreSQL or SQLite)
//!          └───────────────────┘
//! ```
//!
//! # Instance States
//!
//! | State | Meaning |
//! |-------|---------|
//! | `pending` | Compute instance requested; the worker is driving it |
//! | `running` | Database exists; host and port are valid |
//! | `error` | Provisioning failed; `reason` explains why |
//! | `stopped` | Pool entry released and database dropped |
//!
//! # Configuration
//!
//! See [`config::Config::from_env`]. The daemon also honors a `.env` file.
//!
//! # Modules
//!
//! - [`config`]: configuration from environment variables
//! - [`error`]: error types
//! - [`naming`]: name canonicalization and generated credentials
//! - [`models`]: instance and pool entry records
//! - [`persistence`]: metadata store backends
//! - [`compute`]: compute provider clients
//! - [`engine`]: database engines
//! - [`queue`]: in-memory provisioning queue
//! - [`coordinator`]: queue lifecycle
//! - [`worker`]: background provisioning worker
//! - [`service`]: request-path operations
//! - [`runtime`]: embeddable runtime

/// Embedded metadata store migrations.
pub mod migrations;

/// Configuration loaded from environment variables.
pub mod config;

/// Error types.
pub mod error;

/// Name canonicalization and generated credentials.
pub mod naming;

/// Instance and pool entry records.
pub mod models;

/// Metadata store backends (PostgreSQL, SQLite).
pub mod persistence;

/// Compute provider clients.
pub mod compute;

/// Database engines.
pub mod engine;

/// In-memory provisioning queue.
pub mod queue;

/// Queue lifecycle management.
pub mod coordinator;

/// Background provisioning worker.
pub mod worker;

/// Request-path operations.
pub mod service;

/// Embeddable provisioner runtime.
pub mod runtime;

pub use config::Config;
pub use error::{Error, Result};
