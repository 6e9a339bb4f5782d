// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Provisioning worker tests.
//!
//! Drive the worker against an in-memory store and the mock collaborators,
//! asserting on stored rows and on the shared action log.

mod common;

use std::time::Duration;

use common::{TestContext, fast_worker_config};
use mysqlapi_provisioner::engine::{EngineFactory, ServerTarget};
use mysqlapi_provisioner::models::{Instance, InstanceState};
use mysqlapi_provisioner::service::ServiceSettings;
use mysqlapi_provisioner::worker::{AUTHORIZE_FAILED, Outcome, WorkerConfig};

/// Insert a pending dedicated instance that already has a compute handle.
async fn pending_instance(ctx: &TestContext, name: &str) -> Instance {
    let mut instance = Instance::new(name);
    instance.compute_id = Some("i-test".to_string());
    ctx.store
        .insert_instance(&instance)
        .await
        .expect("Failed to insert instance");
    instance
}

async fn stored(ctx: &TestContext, name: &str) -> Instance {
    ctx.store
        .get_instance(name)
        .await
        .expect("Failed to load instance")
        .expect("Instance missing")
}

/// Wait until `name` leaves the pending state.
async fn wait_until_settled(ctx: &TestContext, name: &str) -> Instance {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let instance = stored(ctx, name).await;
            if instance.state != InstanceState::Pending {
                return instance;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Instance was not provisioned in time")
}

#[tokio::test]
async fn test_ready_instance_is_provisioned() {
    let ctx = TestContext::new().await;
    pending_instance(&ctx, "ciclops").await;
    let worker = ctx.worker();

    let outcome = worker.process_instance("ciclops").await.unwrap();
    assert_eq!(outcome, Outcome::Provisioned);

    let instance = stored(&ctx, "ciclops").await;
    assert_eq!(instance.state, InstanceState::Running);
    assert_eq!(instance.host.as_deref(), Some("10.0.0.1"));
    assert_eq!(instance.compute_id.as_deref(), Some("i-test"));
    assert!(instance.reason.is_none());
    assert!(ctx.engines.has_database("10.0.0.1", 3306, "ciclops"));

    let authorize = ctx.log.position("authorize instance ciclops").unwrap();
    let create = ctx.log.position("create database ciclops").unwrap();
    assert!(authorize < create);
    assert_eq!(worker.stats().snapshot().provisioned, 1);
}

#[tokio::test]
async fn test_existing_database_on_redelivery_is_kept() {
    let ctx = TestContext::new().await;
    // An earlier attempt created the database but never recorded `running`
    ctx.engines
        .engine("ciclops", &ServerTarget::new("10.0.0.1", 3306, "root", ""))
        .create_database()
        .await
        .unwrap();
    pending_instance(&ctx, "ciclops").await;
    let worker = ctx.worker();

    let outcome = worker.process_instance("ciclops").await.unwrap();
    assert_eq!(outcome, Outcome::Provisioned);

    let instance = stored(&ctx, "ciclops").await;
    assert_eq!(instance.state, InstanceState::Running);
    assert!(instance.reason.is_none());
    assert!(ctx.engines.has_database("10.0.0.1", 3306, "ciclops"));
    assert!(!ctx.log.contains("unauthorize instance ciclops"));
    assert!(!ctx.log.contains("terminate instance ciclops"));
}

#[tokio::test]
async fn test_not_ready_instance_is_requeued_with_delay() {
    let ctx = TestContext::with_mocks(|c| c.with_not_ready_polls(1), |e| e).await;
    pending_instance(&ctx, "ciclops").await;
    let worker = ctx.worker_with(WorkerConfig {
        poll_interval: Duration::from_secs(60),
        ..fast_worker_config()
    });

    let outcome = worker.process_instance("ciclops").await.unwrap();
    assert_eq!(outcome, Outcome::Requeued);

    let queue = ctx.coordinator.queue();
    assert_eq!(queue.snapshot(), vec!["ciclops"]);
    // Not due before the poll interval elapses
    assert_eq!(queue.get(Duration::from_millis(20)).await, None);

    let instance = stored(&ctx, "ciclops").await;
    assert_eq!(instance.state, InstanceState::Pending);
    assert!(instance.host.is_none());
    assert!(!ctx.log.contains("authorize instance ciclops"));
    assert_eq!(worker.stats().snapshot().requeued, 1);
}

#[tokio::test]
async fn test_worker_loop_provisions_after_not_ready_polls() {
    let ctx = TestContext::with_mocks(|c| c.with_not_ready_polls(2), |e| e).await;
    let service = ctx.service(ServiceSettings::default());

    let created = service.create_instance("ciclops").await.unwrap();
    assert_eq!(created.state, InstanceState::Pending);
    assert_eq!(created.compute_id.as_deref(), Some("i-00000001"));

    let worker = ctx.worker();
    let stats = worker.stats();
    let handle = tokio::spawn(worker.run());

    let instance = wait_until_settled(&ctx, "ciclops").await;
    assert_eq!(instance.state, InstanceState::Running);
    assert_eq!(instance.host.as_deref(), Some("10.0.0.3"));
    assert_eq!(ctx.compute.polls("ciclops"), 3);

    ctx.coordinator.close();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("Worker did not stop")
        .unwrap();

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.requeued, 2);
    assert_eq!(snapshot.provisioned, 1);
    assert_eq!(snapshot.failed, 0);
}

#[tokio::test]
async fn test_authorize_refusal_compensates_without_creating_database() {
    let ctx = TestContext::with_mocks(|c| c.refusing_authorize(), |e| e).await;
    pending_instance(&ctx, "ciclops").await;
    let worker = ctx.worker();

    let outcome = worker.process_instance("ciclops").await.unwrap();
    assert_eq!(
        outcome,
        Outcome::Failed {
            reason: AUTHORIZE_FAILED.to_string(),
            orphaned: false,
        }
    );

    let instance = stored(&ctx, "ciclops").await;
    assert_eq!(instance.state, InstanceState::Error);
    assert_eq!(instance.reason.as_deref(), Some(AUTHORIZE_FAILED));
    assert!(instance.compute_id.is_none());

    assert!(!ctx.log.contains("create database ciclops"));
    let unauthorize = ctx.log.position("unauthorize instance ciclops").unwrap();
    let terminate = ctx.log.position("terminate instance ciclops").unwrap();
    assert!(unauthorize < terminate);
    assert_eq!(ctx.engines.database_count(), 0);
}

#[tokio::test]
async fn test_create_failure_compensates_in_order() {
    let ctx = TestContext::with_mocks(|c| c, |e| e.failing_create("Access denied for user 'root'")).await;
    pending_instance(&ctx, "ciclops").await;
    let worker = ctx.worker();

    let outcome = worker.process_instance("ciclops").await.unwrap();
    assert_eq!(
        outcome,
        Outcome::Failed {
            reason: "Access denied for user 'root'".to_string(),
            orphaned: false,
        }
    );

    let instance = stored(&ctx, "ciclops").await;
    assert_eq!(instance.state, InstanceState::Error);
    assert_eq!(instance.reason.as_deref(), Some("Access denied for user 'root'"));

    let entries = ctx.log.entries();
    let order: Vec<&str> = entries
        .iter()
        .map(String::as_str)
        .filter(|e| !e.starts_with("get "))
        .collect();
    assert_eq!(
        order,
        vec![
            "authorize instance ciclops",
            "create database ciclops",
            "unauthorize instance ciclops",
            "terminate instance ciclops",
        ]
    );
    assert_eq!(worker.stats().snapshot().failed, 1);
}

#[tokio::test]
async fn test_unauthorize_refusal_still_terminates() {
    let ctx = TestContext::with_mocks(|c| c.refusing_authorize().refusing_unauthorize(), |e| e).await;
    pending_instance(&ctx, "ciclops").await;

    let outcome = ctx.worker().process_instance("ciclops").await.unwrap();
    assert!(matches!(outcome, Outcome::Failed { orphaned: false, .. }));
    assert!(ctx.log.contains("terminate instance ciclops"));
    assert!(stored(&ctx, "ciclops").await.compute_id.is_none());
}

#[tokio::test]
async fn test_terminate_refusal_leaves_orphan() {
    let ctx = TestContext::with_mocks(|c| c.refusing_authorize().refusing_terminate(), |e| e).await;
    pending_instance(&ctx, "ciclops").await;
    let worker = ctx.worker();

    let outcome = worker.process_instance("ciclops").await.unwrap();
    assert_eq!(
        outcome,
        Outcome::Failed {
            reason: AUTHORIZE_FAILED.to_string(),
            orphaned: true,
        }
    );

    let instance = stored(&ctx, "ciclops").await;
    assert_eq!(instance.state, InstanceState::Error);
    assert_eq!(instance.compute_id.as_deref(), Some("i-test"));

    let orphaned = ctx.store.list_orphaned().await.unwrap();
    assert_eq!(orphaned.len(), 1);
    assert_eq!(orphaned[0].name, "ciclops");
    assert_eq!(worker.stats().snapshot().orphaned, 1);
}

#[tokio::test]
async fn test_poll_error_is_treated_as_not_ready() {
    let ctx = TestContext::with_mocks(|c| c.failing_get(), |e| e).await;
    pending_instance(&ctx, "ciclops").await;

    let outcome = ctx.worker().process_instance("ciclops").await.unwrap();
    assert_eq!(outcome, Outcome::Requeued);
    assert_eq!(stored(&ctx, "ciclops").await.state, InstanceState::Pending);
}

#[tokio::test]
async fn test_slow_poll_times_out_and_requeues() {
    let ctx = TestContext::with_mocks(|c| c.with_get_delay(Duration::from_millis(500)), |e| e).await;
    pending_instance(&ctx, "ciclops").await;
    let worker = ctx.worker_with(WorkerConfig {
        call_timeout: Duration::from_millis(20),
        ..fast_worker_config()
    });

    let outcome = worker.process_instance("ciclops").await.unwrap();
    assert_eq!(outcome, Outcome::Requeued);
    assert!(!ctx.log.contains("authorize instance ciclops"));
}

#[tokio::test]
async fn test_missing_and_settled_instances_are_skipped() {
    let ctx = TestContext::new().await;
    let worker = ctx.worker();

    assert_eq!(worker.process_instance("ghost").await.unwrap(), Outcome::Skipped);

    let mut running = Instance::new("done");
    running.state = InstanceState::Running;
    running.host = Some("10.0.0.7".to_string());
    ctx.store.insert_instance(&running).await.unwrap();

    assert_eq!(worker.process_instance("done").await.unwrap(), Outcome::Skipped);
    assert!(ctx.log.entries().is_empty());
    assert_eq!(worker.stats().snapshot().processed, 2);
}

#[tokio::test]
async fn test_duplicate_delivery_is_harmless() {
    let ctx = TestContext::new().await;
    pending_instance(&ctx, "ciclops").await;
    let worker = ctx.worker();

    assert_eq!(worker.process_instance("ciclops").await.unwrap(), Outcome::Provisioned);
    assert_eq!(worker.process_instance("ciclops").await.unwrap(), Outcome::Skipped);
    assert_eq!(ctx.log.count("create database ciclops"), 1);
}

#[tokio::test]
async fn test_not_ready_after_close_is_deferred() {
    let ctx = TestContext::with_mocks(|c| c.with_not_ready_polls(5), |e| e).await;
    pending_instance(&ctx, "ciclops").await;
    ctx.coordinator.close();

    let worker = ctx.worker();
    let outcome = worker.process_instance("ciclops").await.unwrap();

    assert_eq!(outcome, Outcome::Deferred);
    assert!(ctx.coordinator.queue().is_empty());
    assert_eq!(stored(&ctx, "ciclops").await.state, InstanceState::Pending);
    assert_eq!(worker.stats().snapshot().requeued, 0);
}

#[tokio::test]
async fn test_worker_exits_within_poll_timeout_of_close() {
    let ctx = TestContext::new().await;
    let config = fast_worker_config();
    let poll_timeout = config.poll_timeout;

    // Paused after the store is up; an idle worker never touches it
    tokio::time::pause();
    let handle = tokio::spawn(ctx.worker_with(config).run());

    tokio::time::sleep(poll_timeout * 5 + poll_timeout / 2).await;
    assert!(!handle.is_finished());

    ctx.coordinator.close();
    let closed_at = tokio::time::Instant::now();
    tokio::time::timeout(poll_timeout + Duration::from_millis(1), handle)
        .await
        .expect("Worker did not stop within one poll timeout")
        .unwrap();
    assert!(closed_at.elapsed() <= poll_timeout);
}

#[tokio::test]
async fn test_worker_drains_queued_instances_on_close() {
    let ctx = TestContext::new().await;
    pending_instance(&ctx, "first").await;
    pending_instance(&ctx, "second").await;
    ctx.coordinator.enqueue("first");
    ctx.coordinator.enqueue("second");
    ctx.coordinator.close();

    let worker = ctx.worker();
    let stats = worker.stats();
    tokio::time::timeout(Duration::from_secs(5), worker.run())
        .await
        .expect("Worker did not stop");

    assert_eq!(stats.snapshot().provisioned, 2);
    assert_eq!(stored(&ctx, "first").await.state, InstanceState::Running);
    assert_eq!(stored(&ctx, "second").await.state, InstanceState::Running);
}
