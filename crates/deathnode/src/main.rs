//! Deathnode - safe decommissioning of Mesos agents on AWS
//!
//! Watches autoscaling groups for undesired members, marks victims under
//! policy, and walks marked instances through Mesos maintenance, Aurora
//! draining and the AWS termination lifecycle.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use deathnode_lib::api;
use deathnode_lib::aurora::HttpAuroraClient;
use deathnode_lib::aws::AwsClient;
use deathnode_lib::clock::SystemClock;
use deathnode_lib::mesos::{HttpMesosClient, MesosClient};
use deathnode_lib::monitor::{AuroraMonitor, AutoscalingServiceMonitor, MesosMonitor};
use deathnode_lib::{components, DeathnodeConfig, DeathnodeMetrics, HealthRegistry, Notebook, Watcher};
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Deathnode service
#[derive(Parser)]
#[command(name = "deathnode")]
#[command(author, version, about = "Safely decommission Mesos agents on AWS", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, env = "DEATHNODE_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting deathnode");

    let cli = Cli::parse();
    let config = Arc::new(DeathnodeConfig::load(cli.config.as_deref())?);
    info!(
        groups = ?config.autoscaling_group_prefixes,
        mark = %config.death_node_mark,
        aurora = config.aurora_enabled(),
        "Deathnode configured"
    );

    let clock = Arc::new(SystemClock);

    // Clients
    let aws = Arc::new(AwsClient::new(config.aws_region.clone()).await);
    let mesos_client = Arc::new(HttpMesosClient::new(
        config.mesos_master_url.clone(),
        clock.clone(),
    )?);
    if let Err(error) = mesos_client.update_leader_url().await {
        warn!(error = %error, "Unable to resolve Mesos leader, using configured master URL");
    }

    // Monitors
    let asgs = Arc::new(RwLock::new(AutoscalingServiceMonitor::new(
        aws.clone(),
        clock.clone(),
        config.death_node_mark.clone(),
        config.autoscaling_group_prefixes.clone(),
    )));
    let mesos = Arc::new(RwLock::new(MesosMonitor::new(
        mesos_client,
        config.protected_frameworks.clone(),
        config.protected_labels.clone(),
    )));
    let aurora = if config.aurora_enabled() {
        let client = Arc::new(HttpAuroraClient::new(config.aurora_url.clone())?);
        Some(Arc::new(RwLock::new(AuroraMonitor::new(client))))
    } else {
        None
    };

    // Health and metrics
    let health_registry = HealthRegistry::new();
    health_registry.register(components::ASG_MONITOR).await;
    health_registry.register(components::MESOS_MONITOR).await;
    if aurora.is_some() {
        health_registry.register(components::AURORA_MONITOR).await;
    }
    health_registry.register(components::NOTEBOOK).await;
    let metrics = DeathnodeMetrics::new();

    // Control loop components; unknown strategy names fail here.
    let notebook = Notebook::new(
        aws,
        asgs.clone(),
        mesos.clone(),
        aurora.clone(),
        clock,
        config.clone(),
        metrics.clone(),
    );
    let mut watcher = Watcher::new(
        &config,
        asgs,
        mesos,
        aurora,
        notebook,
        health_registry.clone(),
        metrics,
    )
    .context("building watcher")?;

    // Health and metrics server
    let api_handle = tokio::spawn(api::serve(config.api_port, health_registry.clone()));

    health_registry.set_ready(true).await;

    let mut ticker = interval(Duration::from_secs(config.polling_seconds.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                watcher.run_tick().await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    api_handle.abort();
    Ok(())
}
