// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory work list of instances awaiting provisioning.
//!
//! Entries carry the time at which they become due, so not-ready instances
//! can be pushed back with a delay without blocking other work. Entries are
//! handed out in insertion order among those that are due.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug)]
struct Entry {
    name: String,
    due: Instant,
}

/// Closable FIFO of instance names.
///
/// Safe for concurrent callers. Only [`get`](Self::get) blocks, and only up
/// to its timeout. The same name may be queued more than once; consumers
/// must tolerate repeated delivery.
#[derive(Debug, Default)]
pub struct InstanceQueue {
    entries: Mutex<VecDeque<Entry>>,
    notify: Notify,
    closed: AtomicBool,
}

impl InstanceQueue {
    /// Create an empty, open queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue `name`, due immediately.
    pub fn put(&self, name: impl Into<String>) {
        self.push(name.into(), Instant::now());
    }

    /// Enqueue `name`, due after `delay`.
    pub fn put_delayed(&self, name: impl Into<String>, delay: Duration) {
        self.push(name.into(), Instant::now() + delay);
    }

    fn push(&self, name: String, due: Instant) {
        self.lock().push_back(Entry { name, due });
        self.notify.notify_one();
    }

    /// Take the oldest due entry, waiting up to `timeout` for one.
    ///
    /// Returns `None` when nothing became due in time. Once the queue is
    /// closed every remaining entry counts as due.
    pub async fn get(&self, timeout: Duration) -> Option<String> {
        let deadline = Instant::now() + timeout;

        loop {
            let now = Instant::now();
            let next_due = {
                let mut entries = self.lock();
                let closed = self.is_closed();
                if let Some(pos) = entries.iter().position(|e| closed || e.due <= now) {
                    return entries.remove(pos).map(|e| e.name);
                }
                entries.iter().map(|e| e.due).min()
            };

            if now >= deadline {
                return None;
            }

            let wake_at = next_due.map_or(deadline, |due| due.min(deadline));
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    /// Mark the queue closed. Idempotent.
    ///
    /// Blocked `get` calls are not woken; they notice on their next pass.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of queued entries, due or not.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Names currently queued, in insertion order.
    pub fn snapshot(&self) -> Vec<String> {
        self.lock().iter().map(|e| e.name.clone()).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}
