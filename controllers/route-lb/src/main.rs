//! route-lb controller
//!
//! Watches Route objects and keeps an external load balancer's pools,
//! members and monitors in sync with them: every managed route gets a pool
//! per port with this cluster as a member and a health monitor attached,
//! and configuration for routes that are gone is removed again.

mod controller;
mod diagnostics;
mod error;
mod policy;
mod providers;
mod reconciler;
mod watcher;

use std::env;
use std::sync::Arc;

use kube::api::ListParams;
use kube::{Api, Client};
use lb_provider::ProviderRegistry;
use tokio::sync::watch;
use tracing::info;

use crate::controller::RouteController;
use crate::error::ControllerError;
use crate::watcher::RouteWatcher;

fn required_env(name: &str) -> Result<String, ControllerError> {
    env::var(name).map_err(|_| {
        ControllerError::InvalidConfig(format!("{name} environment variable is required"))
    })
}

async fn shutdown_signal() -> Result<(), ControllerError> {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = sigterm.recv() => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt::init();

    info!("Starting route-lb controller");

    let watched_suffix = required_env("WATCH_HOST_SUFFIX")?;
    let cluster_alias = required_env("CLUSTER_ALIAS")?;
    let provider_name = env::var("LB_PROVIDER").unwrap_or_else(|_| "f5".to_string());

    info!("Configuration:");
    info!("  Watched suffix: {}", watched_suffix);
    info!("  Cluster alias: {}", cluster_alias);
    info!("  Provider: {}", provider_name);

    // composition root: every backend registers here explicitly
    let registry = ProviderRegistry::new();
    providers::f5::register(&registry);

    let provider = registry.get(&provider_name).ok_or_else(|| {
        ControllerError::InvalidConfig(format!(
            "no load balancer provider registered under {provider_name:?}"
        ))
    })?;
    provider.initialize().await?;

    let client = Client::try_default().await?;
    let api: Api<crds::Route> = Api::all(client);

    let controller = Arc::new(RouteController::new(
        watched_suffix,
        cluster_alias,
        provider,
        None,
    ));

    // repair drift accumulated while the controller was not running
    let routes = api.list(&ListParams::default()).await?.items;
    controller.startup_cleanup(&routes).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let watcher_task = tokio::spawn(RouteWatcher::new(api, controller).run(shutdown_rx));

    shutdown_signal().await?;
    info!("Shutting down...");
    let _ = shutdown_tx.send(true);

    match watcher_task.await {
        Ok(result) => result,
        Err(e) => Err(ControllerError::Watch(format!("route watcher panicked: {e}"))),
    }
}
