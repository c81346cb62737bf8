//! Aurora maintenance monitor
//!
//! Caches the scheduler's DRAINING/DRAINED/SCHEDULED sets per tick and
//! filters outgoing maintenance requests against them.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::aurora::{AuroraClient, MaintenanceResponse};

/// Monitor over the Aurora scheduler's host-maintenance state.
pub struct AuroraMonitor {
    client: Arc<dyn AuroraClient>,
    cache: MaintenanceResponse,
}

impl AuroraMonitor {
    pub fn new(client: Arc<dyn AuroraClient>) -> Self {
        Self {
            client,
            cache: MaintenanceResponse::default(),
        }
    }

    /// Replace the maintenance snapshot. On error the previous snapshot is
    /// kept and the tick proceeds against it.
    pub async fn refresh(&mut self) -> Result<()> {
        self.cache = self.client.get_maintenance().await?;
        debug!(
            draining = self.cache.draining.len(),
            drained = self.cache.drained.len(),
            scheduled = self.cache.scheduled.len(),
            "Refreshed Aurora maintenance snapshot"
        );
        Ok(())
    }

    pub fn is_draining(&self, ip: &str) -> bool {
        self.cache.draining.contains_key(ip)
    }

    pub fn is_drained(&self, ip: &str) -> bool {
        self.cache.drained.iter().any(|host| host == ip)
    }

    fn is_scheduled(&self, ip: &str) -> bool {
        self.cache.scheduled.iter().any(|host| host == ip)
    }

    /// Request draining for every supplied host that is not already
    /// draining or drained per the current snapshot.
    pub async fn drain_hosts(&self, hosts: &HashMap<String, String>) -> Result<()> {
        let to_drain: HashMap<String, String> = hosts
            .iter()
            .filter(|(_, ip)| !self.is_drained(ip) && !self.is_draining(ip))
            .map(|(dns, ip)| (dns.clone(), ip.clone()))
            .collect();

        info!(hosts = ?to_drain, "Draining");
        self.client.drain_hosts(&to_drain).await
    }

    /// Schedule maintenance for hosts not yet in any maintenance state.
    pub async fn start_maintenance(&self, hosts: &HashMap<String, String>) -> Result<()> {
        let to_schedule: HashMap<String, String> = hosts
            .iter()
            .filter(|(_, ip)| {
                !self.is_drained(ip) && !self.is_draining(ip) && !self.is_scheduled(ip)
            })
            .map(|(dns, ip)| (dns.clone(), ip.clone()))
            .collect();

        info!(hosts = ?to_schedule, "Scheduling maintenance");
        self.client.start_maintenance(&to_schedule).await
    }

    /// Take hosts out of maintenance, whatever state they are in.
    pub async fn end_maintenance(&self, hosts: &HashMap<String, String>) -> Result<()> {
        info!(hosts = ?hosts, "Ending maintenance");
        self.client.end_maintenance(hosts).await
    }
}
