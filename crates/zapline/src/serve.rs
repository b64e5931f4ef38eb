// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `zapline serve` command implementation.
//!
//! Opens storage, connects the bridge transport, restores stored sessions,
//! and runs the delivery dispatcher and the HTTP gateway until a shutdown
//! signal arrives.

use std::sync::Arc;

use tracing::{error, info, warn};

use zapline_bridge::BridgeTransport;
use zapline_config::ZaplineConfig;
use zapline_core::{
    CredentialStore, HealthStatus, JobQueue, PluginAdapter, StorageAdapter, ZaplineError,
};
use zapline_dispatch::DeliveryDispatcher;
use zapline_gateway::GatewayState;
use zapline_resilience::RetryPolicy;
use zapline_session::{CredentialBackup, LocalCache, SessionRegistry};
use zapline_storage::SqliteStorage;

use crate::shutdown;

/// Runs the `zapline serve` command.
pub async fn run_serve(config: ZaplineConfig) -> Result<(), ZaplineError> {
    init_tracing(&config.service.log_level);
    info!(name = %config.service.name, "starting zapline serve");

    let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
    storage.initialize().await?;
    info!(path = %config.storage.database_path, "storage ready");

    let transport = Arc::new(BridgeTransport::new(&config.bridge)?);
    match transport.health_check().await {
        Ok(HealthStatus::Healthy) => info!(url = %config.bridge.base_url, "bridge reachable"),
        Ok(status) => warn!(
            url = %config.bridge.base_url,
            status = ?status,
            "bridge not healthy at startup, sessions will retry"
        ),
        Err(e) => warn!(error = %e, "bridge health check failed"),
    }

    let backup = Arc::new(CredentialBackup::new(
        storage.clone() as Arc<dyn CredentialStore>,
        RetryPolicy::from_credentials(&config.credentials),
        Some(LocalCache::new(&config.session.auth_dir)),
    ));
    let registry = Arc::new(SessionRegistry::new(
        transport.clone(),
        backup,
        &config.session,
    ));

    let cancel = shutdown::install_signal_handler();

    // Bind before anything is spawned so a port conflict fails the start.
    let gateway = if config.gateway.enabled {
        let listener = zapline_gateway::bind(&config.gateway).await?;
        let state = GatewayState::new(
            &config.gateway,
            registry.clone(),
            storage.clone() as Arc<dyn JobQueue>,
            vec![
                storage.clone() as Arc<dyn PluginAdapter>,
                transport.clone() as Arc<dyn PluginAdapter>,
            ],
        );
        let gw_cancel = cancel.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = zapline_gateway::serve(listener, state, gw_cancel.clone()).await {
                error!(error = %e, "gateway failed, shutting down");
                gw_cancel.cancel();
            }
        }))
    } else {
        info!("gateway disabled");
        None
    };

    if config.session.auto_restore {
        registry.restore_all().await;
    }

    let dispatcher = DeliveryDispatcher::new(
        storage.clone() as Arc<dyn JobQueue>,
        registry.clone(),
        config.session.default_session_id.clone(),
        &config.dispatcher,
    );
    let dispatch_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { dispatcher.run(cancel).await })
    };

    cancel.cancelled().await;
    info!("shutdown requested");

    shutdown_components(dispatch_task, gateway, &registry, &storage).await;
    info!("zapline serve shutdown complete");
    Ok(())
}

/// Stop background tasks, flush sessions, then close storage.
async fn shutdown_components(
    dispatch_task: tokio::task::JoinHandle<()>,
    gateway: Option<tokio::task::JoinHandle<()>>,
    registry: &SessionRegistry,
    storage: &SqliteStorage,
) {
    if let Err(e) = dispatch_task.await {
        warn!(error = %e, "dispatcher task ended abnormally");
    }
    if let Some(task) = gateway {
        if let Err(e) = task.await {
            warn!(error = %e, "gateway task ended abnormally");
        }
    }

    registry.shutdown_all().await;

    if let Err(e) = storage.close().await {
        warn!(error = %e, "storage did not close cleanly");
    }
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("zapline={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
