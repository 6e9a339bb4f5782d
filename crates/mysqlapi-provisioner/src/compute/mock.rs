// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock compute client for testing.
//!
//! Simulates a provider without any network calls. Every call is appended to
//! an [`ActionLog`] that can be shared with the mock engine factory, so tests
//! can assert ordering across both collaborators.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::traits::*;
use crate::models::Instance;

/// Ordered record of calls made against mocks.
#[derive(Debug, Clone, Default)]
pub struct ActionLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl ActionLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    pub fn record(&self, entry: impl Into<String>) {
        self.lock().push(entry.into());
    }

    /// Snapshot of all entries in call order.
    pub fn entries(&self) -> Vec<String> {
        self.lock().clone()
    }

    /// Whether an entry equal to `entry` was recorded.
    pub fn contains(&self, entry: &str) -> bool {
        self.lock().iter().any(|e| e == entry)
    }

    /// Position of the first entry equal to `entry`.
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.lock().iter().position(|e| e == entry)
    }

    /// Number of entries equal to `entry`.
    pub fn count(&self, entry: &str) -> usize {
        self.lock().iter().filter(|e| *e == entry).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Mock compute client.
///
/// A booted instance becomes ready after `not_ready_polls` unsuccessful
/// `get` calls. The host assigned on the ready poll is `10.0.0.<n>` where
/// `n` is the number of `get` calls made for that instance so far.
pub struct MockComputeClient {
    log: ActionLog,
    polls: Mutex<HashMap<String, u32>>,
    next_id: AtomicU32,
    /// Number of `get` calls that report "not ready" before the instance is up.
    pub not_ready_polls: u32,
    /// If true, `run` is refused.
    pub refuse_run: bool,
    /// If true, `get` fails with an error.
    pub fail_get: bool,
    /// If true, `authorize` is refused.
    pub refuse_authorize: bool,
    /// If true, `unauthorize` is refused.
    pub refuse_unauthorize: bool,
    /// If true, `terminate` is refused.
    pub refuse_terminate: bool,
    /// Delay applied to every `get` call.
    pub get_delay: Duration,
}

impl MockComputeClient {
    /// Create a mock whose instances are ready on the first poll.
    pub fn new(log: ActionLog) -> Self {
        Self {
            log,
            polls: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(1),
            not_ready_polls: 0,
            refuse_run: false,
            fail_get: false,
            refuse_authorize: false,
            refuse_unauthorize: false,
            refuse_terminate: false,
            get_delay: Duration::ZERO,
        }
    }

    /// Report "not ready" for the first `polls` calls to `get`.
    pub fn with_not_ready_polls(mut self, polls: u32) -> Self {
        self.not_ready_polls = polls;
        self
    }

    /// Refuse every boot request.
    pub fn refusing_run(mut self) -> Self {
        self.refuse_run = true;
        self
    }

    /// Fail every poll with an error.
    pub fn failing_get(mut self) -> Self {
        self.fail_get = true;
        self
    }

    /// Refuse every authorize request.
    pub fn refusing_authorize(mut self) -> Self {
        self.refuse_authorize = true;
        self
    }

    /// Refuse every unauthorize request.
    pub fn refusing_unauthorize(mut self) -> Self {
        self.refuse_unauthorize = true;
        self
    }

    /// Refuse every terminate request.
    pub fn refusing_terminate(mut self) -> Self {
        self.refuse_terminate = true;
        self
    }

    /// Delay every poll by `delay`.
    pub fn with_get_delay(mut self, delay: Duration) -> Self {
        self.get_delay = delay;
        self
    }

    /// Number of `get` calls made for `name`.
    pub fn polls(&self, name: &str) -> u32 {
        self.lock_polls().get(name).copied().unwrap_or(0)
    }

    /// The shared action log.
    pub fn log(&self) -> &ActionLog {
        &self.log
    }

    fn lock_polls(&self) -> std::sync::MutexGuard<'_, HashMap<String, u32>> {
        self.polls.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ComputeClient for MockComputeClient {
    fn client_type(&self) -> &'static str {
        "mock"
    }

    async fn run(&self, instance: &mut Instance) -> Result<bool> {
        self.log.record(format!("run instance {}", instance.name));
        if self.refuse_run {
            return Ok(false);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        instance.compute_id = Some(format!("i-{:08x}", id));
        Ok(true)
    }

    async fn get(&self, instance: &mut Instance) -> Result<bool> {
        self.log.record(format!("get instance {}", instance.name));
        if !self.get_delay.is_zero() {
            tokio::time::sleep(self.get_delay).await;
        }
        if self.fail_get {
            return Err(ComputeError::Other("provider unavailable".to_string()));
        }

        let calls = {
            let mut polls = self.lock_polls();
            let calls = polls.entry(instance.name.clone()).or_insert(0);
            *calls += 1;
            *calls
        };

        if calls <= self.not_ready_polls {
            return Ok(false);
        }
        instance.host = Some(format!("10.0.0.{}", calls));
        Ok(true)
    }

    async fn authorize(&self, instance: &Instance) -> Result<bool> {
        self.log.record(format!("authorize instance {}", instance.name));
        Ok(!self.refuse_authorize)
    }

    async fn unauthorize(&self, instance: &Instance) -> Result<bool> {
        self.log
            .record(format!("unauthorize instance {}", instance.name));
        Ok(!self.refuse_unauthorize)
    }

    async fn terminate(&self, instance: &Instance) -> Result<bool> {
        self.log.record(format!("terminate instance {}", instance.name));
        Ok(!self.refuse_terminate)
    }
}
