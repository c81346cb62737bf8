//! Mesos cluster monitor
//!
//! Caches frameworks, agents and running tasks per tick so protection
//! checks never hit the master more than once per refresh.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::mesos::{MesosAgent, MesosClient, MesosTask};

/// Per-tick snapshot of the Mesos cluster, keyed for IP lookups.
#[derive(Default)]
struct MesosCache {
    /// Running tasks per agent IP.
    tasks: HashMap<String, Vec<MesosTask>>,
    /// Ids of the frameworks whose name is configured protected.
    protected_framework_ids: HashSet<String>,
    /// Agents by private IP.
    agents: HashMap<String, MesosAgent>,
}

/// Monitor over the Mesos master, answering "is this IP protected?".
pub struct MesosMonitor {
    client: Arc<dyn MesosClient>,
    protected_frameworks: Vec<String>,
    protected_labels: Vec<String>,
    cache: MesosCache,
}

impl MesosMonitor {
    pub fn new(
        client: Arc<dyn MesosClient>,
        protected_frameworks: Vec<String>,
        protected_labels: Vec<String>,
    ) -> Self {
        Self {
            client,
            protected_frameworks,
            protected_labels,
            cache: MesosCache::default(),
        }
    }

    /// Rebuild the snapshot from the master. On error the previous snapshot
    /// is kept and the tick proceeds against it.
    pub async fn refresh(&mut self) -> Result<()> {
        let frameworks = self.client.get_frameworks().await?;
        let agents = self.client.get_agents().await?;
        let tasks = self.client.get_tasks().await?;

        let protected_framework_ids: HashSet<String> = frameworks
            .frameworks
            .iter()
            .filter(|framework| self.protected_frameworks.contains(&framework.name))
            .map(|framework| framework.id.clone())
            .collect();

        let mut agents_by_ip = HashMap::new();
        let mut ip_by_slave_id = HashMap::new();
        for agent in agents.slaves {
            let Some(ip) = agent_ip_from_pid(&agent.pid) else {
                debug!(pid = %agent.pid, "Skipping agent with unparsable pid");
                continue;
            };
            ip_by_slave_id.insert(agent.id.clone(), ip.clone());
            agents_by_ip.insert(ip, agent);
        }

        let mut tasks_by_ip: HashMap<String, Vec<MesosTask>> = HashMap::new();
        for task in tasks.tasks {
            if task.state != "TASK_RUNNING" {
                continue;
            }
            if let Some(ip) = ip_by_slave_id.get(&task.slave_id) {
                tasks_by_ip.entry(ip.clone()).or_default().push(task);
            }
        }

        info!(
            agents = agents_by_ip.len(),
            protected_frameworks = protected_framework_ids.len(),
            "Refreshed Mesos snapshot"
        );

        self.cache = MesosCache {
            tasks: tasks_by_ip,
            protected_framework_ids,
            agents: agents_by_ip,
        };
        Ok(())
    }

    /// True when the agent at `ip` runs at least one task owned by a
    /// protected framework or carrying a protected label key.
    pub fn is_protected(&self, ip: &str) -> bool {
        let Some(tasks) = self.cache.tasks.get(ip) else {
            return false;
        };

        tasks.iter().any(|task| {
            self.cache.protected_framework_ids.contains(&task.framework_id)
                || task
                    .labels
                    .iter()
                    .any(|label| self.protected_labels.contains(&label.key))
        })
    }

    /// Schedule a maintenance window covering all supplied `dns → ip` hosts.
    pub async fn set_mesos_agents_in_maintenance(
        &self,
        hosts: &HashMap<String, String>,
    ) -> Result<()> {
        info!(hosts = hosts.len(), "Starting Mesos agent maintenance");
        self.client.set_hosts_in_maintenance(hosts).await
    }

    /// The agent known at `ip`, when the snapshot has one.
    pub fn agent(&self, ip: &str) -> Option<&MesosAgent> {
        self.cache.agents.get(ip)
    }
}

/// Extract the agent IP from a Mesos pid (`slave(1)@10.0.0.1:5051`).
fn agent_ip_from_pid(pid: &str) -> Option<String> {
    let address = pid.split('@').nth(1)?;
    let ip = address.split(':').next()?;
    if ip.is_empty() {
        return None;
    }
    Some(ip.to_string())
}
