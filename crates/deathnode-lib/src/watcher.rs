//! Per-tick policy driver
//!
//! Refreshes every monitor, marks undesired instances per group through the
//! selector, then hands over to the notebook for one termination pass.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::DeathnodeConfig;
use crate::health::{components, HealthRegistry};
use crate::monitor::{AuroraMonitor, AutoscalingServiceMonitor, MesosMonitor};
use crate::notebook::Notebook;
use crate::observability::DeathnodeMetrics;
use crate::selector::{new_constraint, new_recommender, Constraint, Recommender};

/// Runs one control tick at a time over the monitored fleet.
pub struct Watcher {
    asgs: Arc<RwLock<AutoscalingServiceMonitor>>,
    mesos: Arc<RwLock<MesosMonitor>>,
    aurora: Option<Arc<RwLock<AuroraMonitor>>>,
    notebook: Notebook,
    constraint: Box<dyn Constraint>,
    recommender: Box<dyn Recommender>,
    health: HealthRegistry,
    metrics: DeathnodeMetrics,
}

impl Watcher {
    /// Build the watcher; fails when the configured strategy names are
    /// unknown.
    pub fn new(
        config: &DeathnodeConfig,
        asgs: Arc<RwLock<AutoscalingServiceMonitor>>,
        mesos: Arc<RwLock<MesosMonitor>>,
        aurora: Option<Arc<RwLock<AuroraMonitor>>>,
        notebook: Notebook,
        health: HealthRegistry,
        metrics: DeathnodeMetrics,
    ) -> Result<Self> {
        let constraint =
            new_constraint(&config.constraints_type).context("building constraint")?;
        let recommender =
            new_recommender(&config.recommender_type).context("building recommender")?;

        Ok(Self {
            asgs,
            mesos,
            aurora,
            notebook,
            constraint,
            recommender,
            health,
            metrics,
        })
    }

    /// One full control tick: refresh, mark, destroy.
    pub async fn run_tick(&mut self) {
        self.metrics.record_tick();
        self.refresh_monitors().await;
        self.mark_undesired_instances().await;

        match self.notebook.destroy_instances_attempt().await {
            Ok(()) => self.health.set_healthy(components::NOTEBOOK).await,
            Err(error) => {
                self.health
                    .set_degraded(components::NOTEBOOK, error.to_string())
                    .await;
                error!(error = %error, "Notebook pass failed");
            }
        }
    }

    /// Refresh every monitor. A failed refresh leaves the previous snapshot
    /// in place; the tick carries on against stale data and the component is
    /// reported degraded.
    async fn refresh_monitors(&self) {
        match self.asgs.write().await.refresh().await {
            Ok(()) => self.health.set_healthy(components::ASG_MONITOR).await,
            Err(error) => {
                self.metrics.record_refresh_error("aws");
                self.health
                    .set_degraded(components::ASG_MONITOR, error.to_string())
                    .await;
                warn!(error = %error, "Autoscaling refresh failed");
            }
        }

        match self.mesos.write().await.refresh().await {
            Ok(()) => self.health.set_healthy(components::MESOS_MONITOR).await,
            Err(error) => {
                self.metrics.record_refresh_error("mesos");
                self.health
                    .set_degraded(components::MESOS_MONITOR, error.to_string())
                    .await;
                warn!(error = %error, "Mesos refresh failed");
            }
        }

        if let Some(aurora) = &self.aurora {
            match aurora.write().await.refresh().await {
                Ok(()) => self.health.set_healthy(components::AURORA_MONITOR).await,
                Err(error) => {
                    self.metrics.record_refresh_error("aurora");
                    self.health
                        .set_degraded(components::AURORA_MONITOR, error.to_string())
                        .await;
                    warn!(error = %error, "Aurora refresh failed");
                }
            }
        }

        self.update_fleet_gauges().await;
    }

    async fn update_fleet_gauges(&self) {
        let asgs = self.asgs.read().await;
        let (undesired, marked) = asgs.groups().iter().fold((0, 0), |(u, m), group| {
            (
                u + group.num_undesired_instances() as i64,
                m + group.num_marked_instances() as i64,
            )
        });
        self.metrics.set_undesired_instances(undesired);
        self.metrics.set_marked_instances(marked);
    }

    /// Mark victims in every group until the marked member count covers the
    /// undesired surplus. Members marked on earlier ticks count toward the
    /// target, so a surplus is never marked twice.
    async fn mark_undesired_instances(&self) {
        let mut asgs = self.asgs.write().await;
        let mesos = self.mesos.read().await;

        for group in asgs.groups_mut() {
            let num_undesired = group.num_undesired_instances();
            debug!(
                group = %group.name(),
                undesired = num_undesired,
                "Undesired Mesos agents"
            );

            let mut marked = group.num_marked_instances();
            while marked < num_undesired {
                let candidates = self
                    .constraint
                    .filter(&group.instances_not_marked_for_removal(), &mesos);
                let Some(victim) = self.recommender.find(&candidates) else {
                    break;
                };

                info!(
                    instance_id = %victim.instance_id,
                    group = %group.name(),
                    "Marking instance for removal"
                );
                if let Err(error) = group.mark_to_be_removed(&victim.instance_id).await {
                    error!(
                        instance_id = %victim.instance_id,
                        error = %error,
                        "Unable to mark instance for removal"
                    );
                    break;
                }
                self.metrics.record_instance_marked();
                marked += 1;
            }
        }
    }
}
