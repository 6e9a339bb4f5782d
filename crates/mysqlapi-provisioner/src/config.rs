// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::time::Duration;

/// Names that can never be used for an instance.
pub const DEFAULT_RESERVED_NAMES: &[&str] = &["mysql", "test", "information_schema", "mysqlapi"];

/// Default MySQL port for every backend.
pub const DEFAULT_MYSQL_PORT: u16 = 3306;

/// Where new databases are placed.
///
/// Derived once from the environment: a shared server wins over the pool,
/// and the pool wins over dedicated compute instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routing {
    /// Create every database on one pre-existing server.
    Shared(SharedServer),
    /// Allocate a free pre-provisioned server per database.
    Pool,
    /// Boot a compute instance per database and provision it asynchronously.
    Dedicated,
}

impl Routing {
    /// Short name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shared(_) => "shared",
            Self::Pool => "pool",
            Self::Dedicated => "dedicated",
        }
    }
}

/// Connection details for the shared server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedServer {
    /// Host the service connects to.
    pub host: String,
    /// Host handed out to bound applications.
    pub public_host: String,
    /// Admin user.
    pub user: String,
    /// Admin password.
    pub password: String,
}

/// Compute gateway settings, required for dedicated routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeConfig {
    /// Base URL of the compute gateway.
    pub endpoint: String,
    /// Bearer token, if the gateway requires one.
    pub token: Option<String>,
    /// Machine image booted for dedicated servers.
    pub image: String,
    /// Key pair name passed on boot.
    pub key_name: Option<String>,
}

/// Provisioner configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Metadata store URL (PostgreSQL or SQLite).
    pub database_url: String,
    /// Placement policy for new databases.
    pub routing: Routing,
    /// Admin user on dedicated instances.
    pub admin_user: String,
    /// Admin password on dedicated instances.
    pub admin_password: String,
    /// Salt mixed into generated user passwords.
    pub salt: String,
    /// Names rejected by the creation path.
    pub reserved_names: Vec<String>,
    /// Compute gateway settings (always present under dedicated routing).
    pub compute: Option<ComputeConfig>,
    /// How long the worker blocks on an empty queue before re-checking shutdown.
    pub queue_poll_timeout: Duration,
    /// Delay before a not-ready instance is polled again.
    pub poll_interval: Duration,
    /// Deadline wrapped around each compute and engine call.
    pub call_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `MYSQLAPI_DATABASE_URL`: metadata store connection string
    /// - `MYSQLAPI_COMPUTE_ENDPOINT` and `MYSQLAPI_COMPUTE_IMAGE` when neither a
    ///   shared server nor the pool is configured
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("MYSQLAPI_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("MYSQLAPI_DATABASE_URL"))?;

        let routing = match non_empty_var("MYSQLAPI_SHARED_SERVER") {
            Some(host) => Routing::Shared(SharedServer {
                public_host: non_empty_var("MYSQLAPI_SHARED_SERVER_PUBLIC_HOST")
                    .unwrap_or_else(|| host.clone()),
                host,
                user: std::env::var("MYSQLAPI_SHARED_USER").unwrap_or_else(|_| "root".to_string()),
                password: std::env::var("MYSQLAPI_SHARED_PASSWORD").unwrap_or_default(),
            }),
            None if flag_var("MYSQLAPI_USE_POOL") => Routing::Pool,
            None => Routing::Dedicated,
        };

        // Optional outside dedicated routing; finishes leftover dedicated rows
        let compute = if routing == Routing::Dedicated
            || non_empty_var("MYSQLAPI_COMPUTE_ENDPOINT").is_some()
        {
            Some(ComputeConfig {
                endpoint: non_empty_var("MYSQLAPI_COMPUTE_ENDPOINT")
                    .ok_or(ConfigError::Missing("MYSQLAPI_COMPUTE_ENDPOINT"))?,
                token: non_empty_var("MYSQLAPI_COMPUTE_TOKEN"),
                image: non_empty_var("MYSQLAPI_COMPUTE_IMAGE")
                    .ok_or(ConfigError::Missing("MYSQLAPI_COMPUTE_IMAGE"))?,
                key_name: non_empty_var("MYSQLAPI_COMPUTE_KEY_NAME"),
            })
        } else {
            None
        };

        let reserved_names = match non_empty_var("MYSQLAPI_RESERVED_NAMES") {
            Some(names) => names
                .split(',')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(String::from)
                .collect(),
            None => DEFAULT_RESERVED_NAMES.iter().map(|n| n.to_string()).collect(),
        };

        let queue_poll_timeout = match parse_var(
            "MYSQLAPI_QUEUE_POLL_TIMEOUT_MS",
            2000,
            "must be a number of milliseconds",
        )? {
            0 => {
                return Err(ConfigError::Invalid(
                    "MYSQLAPI_QUEUE_POLL_TIMEOUT_MS",
                    "must be greater than zero",
                ));
            }
            ms => Duration::from_millis(ms),
        };
        let poll_interval = Duration::from_secs(parse_var(
            "MYSQLAPI_POLL_INTERVAL",
            10,
            "must be a number of seconds",
        )?);
        let call_timeout = Duration::from_secs(parse_var(
            "MYSQLAPI_CALL_TIMEOUT",
            60,
            "must be a number of seconds",
        )?);

        Ok(Self {
            database_url,
            routing,
            admin_user: std::env::var("MYSQLAPI_ADMIN_USER").unwrap_or_else(|_| "root".to_string()),
            admin_password: std::env::var("MYSQLAPI_ADMIN_PASSWORD").unwrap_or_default(),
            salt: std::env::var("MYSQLAPI_SALT").unwrap_or_default(),
            reserved_names,
            compute,
            queue_poll_timeout,
            poll_interval,
            call_timeout,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn flag_var(key: &str) -> bool {
    std::env::var(key)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

fn parse_var(key: &'static str, default: u64, hint: &'static str) -> Result<u64, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value.parse().map_err(|_| ConfigError::Invalid(key, hint)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
