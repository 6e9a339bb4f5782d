// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Queue lifecycle: rebuild from the store, reset, enqueue, close.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::persistence::InstanceStore;
use crate::queue::InstanceQueue;

/// Owns the current [`InstanceQueue`].
///
/// The queue can be swapped out by [`reset_queue`](Self::reset_queue); the
/// worker re-reads [`queue`](Self::queue) on every iteration and so follows
/// the swap.
pub struct ProvisioningCoordinator {
    store: Arc<dyn InstanceStore>,
    queue: RwLock<Arc<InstanceQueue>>,
    closed: AtomicBool,
}

impl ProvisioningCoordinator {
    /// Create a coordinator with an empty queue.
    pub fn new(store: Arc<dyn InstanceStore>) -> Self {
        Self {
            store,
            queue: RwLock::new(Arc::new(InstanceQueue::new())),
            closed: AtomicBool::new(false),
        }
    }

    /// The current queue.
    pub fn queue(&self) -> Arc<InstanceQueue> {
        let guard = self.queue.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&*guard)
    }

    /// Enqueue every pending, non-shared instance from the store.
    ///
    /// Returns the number of instances enqueued.
    pub async fn build_queue(&self) -> Result<usize> {
        let pending = self.store.list_pending_dedicated().await?;
        let queue = self.queue();
        for instance in &pending {
            debug!(instance = %instance.name, "Re-enqueuing pending instance");
            queue.put(instance.name.clone());
        }
        info!(count = pending.len(), "Provisioning queue built");
        Ok(pending.len())
    }

    /// Replace the queue with an empty one and rebuild it from the store.
    ///
    /// Does nothing once the coordinator is closed.
    pub async fn reset_queue(&self) -> Result<usize> {
        if self.is_closed() {
            warn!("Ignoring queue reset after shutdown");
            return Ok(0);
        }

        let fresh = Arc::new(InstanceQueue::new());
        {
            let mut guard = self.queue.write().unwrap_or_else(|e| e.into_inner());
            *guard = fresh;
        }
        info!("Provisioning queue reset");
        self.build_queue().await
    }

    /// Hand an instance to the worker.
    pub fn enqueue(&self, name: &str) {
        debug!(instance = %name, "Instance enqueued for provisioning");
        self.queue().put(name);
    }

    /// Close the current queue; the worker exits once it drains.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.queue().close();
        info!("Provisioning queue closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
