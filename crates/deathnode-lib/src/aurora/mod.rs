//! Aurora scheduler API
//!
//! Maintenance wire types and the [`AuroraClient`] interface. The whole
//! integration is optional: with no Aurora URL configured, nothing in this
//! module is constructed.

mod client;

pub use client::HttpAuroraClient;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Maintenance state of the cluster as returned by `GET /maintenance`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaintenanceResponse {
    /// Hosts being drained, with the ids of the tasks still on them.
    #[serde(default)]
    pub draining: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub drained: Vec<String>,
    #[serde(default)]
    pub scheduled: Vec<String>,
}

/// Payload for the `/apibeta` maintenance calls: `{"hosts":{"hostNames":[…]}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceHostsRequest {
    pub hosts: HostNames,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostNames {
    #[serde(rename = "hostNames")]
    pub host_names: Vec<String>,
}

impl MaintenanceHostsRequest {
    /// The Aurora API addresses hosts by IP: the `dns → ip` map's values.
    pub fn from_hosts(hosts: &HashMap<String, String>) -> Self {
        Self {
            hosts: HostNames {
                host_names: hosts.values().cloned().collect(),
            },
        }
    }
}

/// Interface to the Aurora scheduler.
#[async_trait]
pub trait AuroraClient: Send + Sync {
    async fn get_maintenance(&self) -> Result<MaintenanceResponse>;

    async fn start_maintenance(&self, hosts: &HashMap<String, String>) -> Result<()>;

    async fn end_maintenance(&self, hosts: &HashMap<String, String>) -> Result<()>;

    async fn drain_hosts(&self, hosts: &HashMap<String, String>) -> Result<()>;
}
