//! Termination coordinator
//!
//! Tracks the instances carrying the death mark and walks each of them,
//! once per tick, through maintenance, draining and lifecycle completion.
//! Every step is gated and re-entrant: an instance that cannot advance this
//! tick is retried from scratch on the next one.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::aws::{CloudClient, InstanceDescription};
use crate::clock::{epoch, Clock};
use crate::config::{DeathnodeConfig, LIFECYCLE_REFRESH_TIMEOUT_PERCENTAGE};
use crate::models::{Instance, LifecycleState};
use crate::monitor::{AuroraMonitor, AutoscalingServiceMonitor, MesosMonitor};
use crate::observability::DeathnodeMetrics;

/// Drives death-marked instances to termination.
pub struct Notebook {
    aws: Arc<dyn CloudClient>,
    asgs: Arc<RwLock<AutoscalingServiceMonitor>>,
    mesos: Arc<RwLock<MesosMonitor>>,
    aurora: Option<Arc<RwLock<AuroraMonitor>>>,
    clock: Arc<dyn Clock>,
    config: Arc<DeathnodeConfig>,
    metrics: DeathnodeMetrics,
    last_completed_termination: DateTime<Utc>,
}

impl Notebook {
    pub fn new(
        aws: Arc<dyn CloudClient>,
        asgs: Arc<RwLock<AutoscalingServiceMonitor>>,
        mesos: Arc<RwLock<MesosMonitor>>,
        aurora: Option<Arc<RwLock<AuroraMonitor>>>,
        clock: Arc<dyn Clock>,
        config: Arc<DeathnodeConfig>,
        metrics: DeathnodeMetrics,
    ) -> Self {
        Self {
            aws,
            asgs,
            mesos,
            aurora,
            clock,
            config,
            metrics,
            last_completed_termination: epoch(),
        }
    }

    /// Wall-clock instant of the last successful lifecycle completion.
    /// Only advances while rate limiting is enabled.
    pub fn last_completed_termination(&self) -> DateTime<Utc> {
        self.last_completed_termination
    }

    /// One pass over every death-marked instance: set the whole batch in
    /// Mesos maintenance, then run each instance's termination attempt.
    pub async fn destroy_instances_attempt(&mut self) -> Result<()> {
        let marked = self
            .aws
            .describe_instances_by_tag(&self.config.death_node_mark)
            .await
            .with_context(|| {
                format!("retrieving instances tagged {}", self.config.death_node_mark)
            })?;

        if marked.is_empty() {
            return Ok(());
        }

        let hosts: HashMap<String, String> = marked
            .iter()
            .map(|instance| (instance.private_dns.clone(), instance.private_ip.clone()))
            .collect();
        if let Err(error) = self
            .mesos
            .read()
            .await
            .set_mesos_agents_in_maintenance(&hosts)
            .await
        {
            warn!(error = %error, "Unable to set Mesos agents in maintenance");
        }

        for instance in &marked {
            if let Err(error) = self.destroy_instance_attempt(instance).await {
                self.metrics.record_notebook_attempt_error();
                warn!(
                    instance_id = %instance.instance_id,
                    error = %error,
                    "Termination attempt failed"
                );
            }
        }

        Ok(())
    }

    async fn destroy_instance_attempt(&mut self, instance: &InstanceDescription) -> Result<()> {
        debug!(instance_id = %instance.instance_id, "Starting termination attempt");

        let record = self
            .asgs
            .read()
            .await
            .instance_by_id(&instance.instance_id)
            .ok_or_else(|| {
                anyhow!(
                    "instance {} is not tracked by any monitored group",
                    instance.instance_id
                )
            })?;

        if record.protected {
            if let Err(error) = self
                .asgs
                .write()
                .await
                .remove_instance_protection(&instance.instance_id)
                .await
            {
                warn!(
                    instance_id = %instance.instance_id,
                    error = %error,
                    "Unable to remove instance protection"
                );
            }
        }

        if self.config.reset_lifecycle {
            self.reset_lifecycle(&record, instance).await;
        }

        if self.should_wait_for_next_destroy() {
            debug!(
                instance_id = %instance.instance_id,
                seconds_since_last = self.clock.since(self.last_completed_termination).num_seconds(),
                "Waiting before destroying another instance"
            );
            return Ok(());
        }

        if let Some(aurora) = &self.aurora {
            let host = HashMap::from([(
                instance.private_dns.clone(),
                instance.private_ip.clone(),
            )]);
            info!(
                instance_id = %instance.instance_id,
                ip = %instance.private_ip,
                "Draining Mesos agent"
            );
            aurora.read().await.drain_hosts(&host).await?;
        }

        if !self.mesos.read().await.is_protected(&instance.private_ip) {
            self.destroy_instance(&record).await?;
        }

        Ok(())
    }

    /// Extend the lifecycle-hook window when the mark is old enough that the
    /// hook timeout is close to expiring.
    async fn reset_lifecycle(&self, record: &Instance, instance: &InstanceDescription) {
        let Some(marked_at) = instance
            .tags
            .get(&self.config.death_node_mark)
            .and_then(|value| value.parse::<i64>().ok())
            .and_then(|seconds| Utc.timestamp_opt(seconds, 0).single())
        else {
            return;
        };

        let max_seconds_to_refresh =
            self.config.lifecycle_timeout as f64 * LIFECYCLE_REFRESH_TIMEOUT_PERCENTAGE;
        let elapsed = self.clock.since(marked_at).num_seconds() as f64;

        if record.lifecycle_state == LifecycleState::TerminatingWait
            && elapsed > max_seconds_to_refresh
        {
            if let Err(error) = self
                .asgs
                .read()
                .await
                .refresh_lifecycle_hook(&instance.instance_id)
                .await
            {
                error!(
                    instance_id = %instance.instance_id,
                    error = %error,
                    "Unable to reset lifecycle hook"
                );
            }
        }
    }

    fn should_wait_for_next_destroy(&self) -> bool {
        self.clock
            .since(self.last_completed_termination)
            .num_seconds()
            <= self.config.delay_delete_seconds as i64
    }

    async fn destroy_instance(&mut self, record: &Instance) -> Result<()> {
        if record.lifecycle_state != LifecycleState::TerminatingWait {
            debug!(
                instance_id = %record.instance_id,
                "Waiting for AWS to start the termination lifecycle"
            );
            return Ok(());
        }

        info!(instance_id = %record.instance_id, "Destroying instance");
        let result = self
            .aws
            .complete_lifecycle_action(&record.autoscaling_group_name, &record.instance_id)
            .await;

        match &result {
            Ok(()) => {
                self.metrics.record_lifecycle_completion();
                if self.config.delay_delete_seconds != 0 {
                    self.last_completed_termination = self.clock.now();
                }
            }
            Err(error) => {
                error!(
                    instance_id = %record.instance_id,
                    error = %error,
                    "Unable to complete lifecycle action"
                );
            }
        }

        // Maintenance is ended on every exit path once termination was tried.
        if let Some(aurora) = &self.aurora {
            let host = HashMap::from([(record.private_ip.clone(), record.private_ip.clone())]);
            if let Err(error) = aurora.read().await.end_maintenance(&host).await {
                warn!(
                    instance_id = %record.instance_id,
                    error = %error,
                    "Unable to end Aurora maintenance"
                );
            }
        }

        result
    }
}
