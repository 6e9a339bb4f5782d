// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock engine factory for testing.
//!
//! Tracks created databases per server in memory so a second create of the
//! same database on the same server fails like a real one would.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use super::traits::*;
use crate::compute::ActionLog;
use crate::naming::{generate_password, generate_user};

type Databases = Arc<Mutex<HashSet<String>>>;

fn lock(databases: &Databases) -> std::sync::MutexGuard<'_, HashSet<String>> {
    databases.lock().unwrap_or_else(|e| e.into_inner())
}

fn key(target: &ServerTarget, database: &str) -> String {
    format!("{}:{}/{}", target.host, target.port, database)
}

/// Mock engine factory.
pub struct MockEngineFactory {
    log: ActionLog,
    databases: Databases,
    salt: String,
    /// If set, every `create_database` fails with this message.
    pub create_error: Option<String>,
    /// If true, `is_up` reports the server down.
    pub down: bool,
}

impl MockEngineFactory {
    /// Create a factory recording into `log`.
    pub fn new(log: ActionLog) -> Self {
        Self {
            log,
            databases: Arc::new(Mutex::new(HashSet::new())),
            salt: String::new(),
            create_error: None,
            down: false,
        }
    }

    /// Fail every `create_database` with `message`.
    pub fn failing_create(mut self, message: impl Into<String>) -> Self {
        self.create_error = Some(message.into());
        self
    }

    /// Report every server down.
    pub fn down(mut self) -> Self {
        self.down = true;
        self
    }

    /// Use `salt` for generated passwords.
    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = salt.into();
        self
    }

    /// Whether `database` exists on `host:port`.
    pub fn has_database(&self, host: &str, port: u16, database: &str) -> bool {
        lock(&self.databases).contains(&format!("{}:{}/{}", host, port, database))
    }

    /// Number of databases across all servers.
    pub fn database_count(&self) -> usize {
        lock(&self.databases).len()
    }
}

impl EngineFactory for MockEngineFactory {
    fn engine(&self, database: &str, target: &ServerTarget) -> Box<dyn DatabaseEngine> {
        Box::new(MockEngine {
            database: database.to_string(),
            key: key(target, database),
            log: self.log.clone(),
            databases: Arc::clone(&self.databases),
            salt: self.salt.clone(),
            create_error: self.create_error.clone(),
            up: !self.down,
        })
    }
}

struct MockEngine {
    database: String,
    key: String,
    log: ActionLog,
    databases: Databases,
    salt: String,
    create_error: Option<String>,
    up: bool,
}

#[async_trait]
impl DatabaseEngine for MockEngine {
    fn database(&self) -> &str {
        &self.database
    }

    async fn create_database(&self) -> Result<()> {
        self.log.record(format!("create database {}", self.database));
        if let Some(message) = &self.create_error {
            return Err(EngineError::Other(message.clone()));
        }
        if !lock(&self.databases).insert(self.key.clone()) {
            return Err(EngineError::DatabaseExists(self.database.clone()));
        }
        Ok(())
    }

    async fn drop_database(&self) -> Result<()> {
        self.log.record(format!("drop database {}", self.database));
        if !lock(&self.databases).remove(&self.key) {
            return Err(EngineError::Other(format!(
                "Can't drop database '{}'; database doesn't exist",
                self.database
            )));
        }
        Ok(())
    }

    async fn create_user(&self, name: &str, host: Option<&str>) -> Result<(String, String)> {
        let user = generate_user(name, &self.salt);
        let password = generate_password(&user, &self.salt);
        self.log.record(format!(
            "create user {}@{}",
            user,
            host.unwrap_or(ANY_HOST)
        ));
        Ok((user, password))
    }

    async fn drop_user(&self, name: &str, host: Option<&str>) -> Result<()> {
        let user = generate_user(name, &self.salt);
        self.log
            .record(format!("drop user {}@{}", user, host.unwrap_or(ANY_HOST)));
        Ok(())
    }

    async fn is_up(&self) -> bool {
        self.up
    }
}
