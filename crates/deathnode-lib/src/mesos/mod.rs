//! Mesos master API
//!
//! Wire types for the master state endpoints plus the maintenance-schedule
//! payload, and the [`MesosClient`] interface the monitor talks through.

mod client;

pub use client::HttpMesosClient;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TasksResponse {
    #[serde(default)]
    pub tasks: Vec<MesosTask>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MesosTask {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub framework_id: String,
    pub slave_id: String,
    pub state: String,
    #[serde(default)]
    pub labels: Vec<MesosLabel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MesosLabel {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameworksResponse {
    #[serde(default)]
    pub frameworks: Vec<MesosFramework>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MesosFramework {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlavesResponse {
    #[serde(default)]
    pub slaves: Vec<MesosAgent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MesosAgent {
    pub id: String,
    pub hostname: String,
    /// `slave(1)@10.0.0.1:5051`; the address part carries the agent IP.
    pub pid: String,
}

/// Maintenance-schedule payload: one window covering all supplied machines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceRequest {
    pub windows: Vec<MaintenanceWindow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceWindow {
    #[serde(rename = "machineIds")]
    pub machine_ids: Vec<MaintenanceMachineId>,
    pub unavailability: MaintenanceUnavailability,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceMachineId {
    pub hostname: String,
    pub ip: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceUnavailability {
    pub start: MaintenanceStart,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceStart {
    pub nanoseconds: i64,
}

/// Build the maintenance-schedule payload for a `dns → ip` host map.
///
/// A single window covers every host; `start_nanos` must be nonzero or the
/// master rejects the window.
pub fn maintenance_payload(hosts: &HashMap<String, String>, start_nanos: i64) -> MaintenanceRequest {
    let machine_ids = hosts
        .iter()
        .map(|(hostname, ip)| MaintenanceMachineId {
            hostname: hostname.clone(),
            ip: ip.clone(),
        })
        .collect();

    MaintenanceRequest {
        windows: vec![MaintenanceWindow {
            machine_ids,
            unavailability: MaintenanceUnavailability {
                start: MaintenanceStart {
                    nanoseconds: start_nanos,
                },
            },
        }],
    }
}

/// Interface to the Mesos master.
#[async_trait]
pub trait MesosClient: Send + Sync {
    /// Running and completed tasks, all pages concatenated.
    async fn get_tasks(&self) -> Result<TasksResponse>;

    async fn get_frameworks(&self) -> Result<FrameworksResponse>;

    async fn get_agents(&self) -> Result<SlavesResponse>;

    /// Post a maintenance window covering all supplied `dns → ip` hosts.
    async fn set_hosts_in_maintenance(&self, hosts: &HashMap<String, String>) -> Result<()>;

    /// Follow the master redirect and adopt the leading master's URL.
    async fn update_leader_url(&self) -> Result<String>;
}
