// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! mysqlapi provisioner daemon
//!
//! Runs the provisioning worker against the configured metadata store:
//! - rebuilds the queue from pending instances on start
//! - SIGHUP resets and rebuilds the queue
//! - SIGTERM / Ctrl-C closes the queue and waits for the worker

use std::sync::Arc;

use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};

use mysqlapi_provisioner::compute::{ComputeClient, DisabledComputeClient, HttpComputeClient};
use mysqlapi_provisioner::config::Config;
use mysqlapi_provisioner::engine::MySqlEngineFactory;
use mysqlapi_provisioner::persistence;
use mysqlapi_provisioner::runtime::ProvisionerRuntime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mysqlapi_provisioner=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    let config = Config::from_env()?;

    info!(
        routing = config.routing.as_str(),
        reserved_names = config.reserved_names.len(),
        poll_interval_secs = config.poll_interval.as_secs(),
        "Starting mysqlapi provisioner"
    );

    let store = persistence::connect(&config.database_url).await?;

    let compute: Arc<dyn ComputeClient> = match &config.compute {
        Some(compute) => {
            info!(endpoint = %compute.endpoint, image = %compute.image, "Compute gateway configured");
            Arc::new(HttpComputeClient::new(compute, config.call_timeout)?)
        }
        None => Arc::new(DisabledComputeClient),
    };

    let runtime = ProvisionerRuntime::builder()
        .store(store)
        .compute(compute)
        .engines(Arc::new(MySqlEngineFactory::new(&config.salt)))
        .config(&config)
        .build()?
        .start()
        .await?;

    let mut hangup = signal(SignalKind::hangup())?;
    let mut terminate = signal(SignalKind::terminate())?;

    loop {
        tokio::select! {
            _ = hangup.recv() => {
                info!("SIGHUP received, rebuilding provisioning queue");
                match runtime.reload().await {
                    Ok(count) => info!(count, "Provisioning queue rebuilt"),
                    Err(e) => warn!(error = %e, "Failed to rebuild provisioning queue"),
                }
            }
            _ = terminate.recv() => {
                info!("SIGTERM received");
                break;
            }
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Shutdown signal received");
                break;
            }
        }
    }

    runtime.shutdown().await?;

    info!("mysqlapi provisioner shut down");

    Ok(())
}
