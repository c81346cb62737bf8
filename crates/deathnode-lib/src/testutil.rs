//! Recording mocks and a settable clock shared by the unit tests

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::aurora::{AuroraClient, MaintenanceResponse};
use crate::aws::{CloudClient, InstanceDescription};
use crate::clock::Clock;
use crate::mesos::{
    FrameworksResponse, MesosAgent, MesosClient, MesosFramework, MesosLabel, MesosTask,
    SlavesResponse, TasksResponse,
};
use crate::models::{AutoscalingGroupDetails, AutoscalingGroupMember, LifecycleState};

/// Clock whose time is set by the test.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn at_unix(seconds: i64) -> Self {
        Self {
            now: Mutex::new(Utc.timestamp_opt(seconds, 0).single().unwrap()),
        }
    }

    pub fn set_unix(&self, seconds: i64) {
        *self.now.lock().unwrap() = Utc.timestamp_opt(seconds, 0).single().unwrap();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// One recorded mutation issued through [`MockCloudClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloudRequest {
    SetInstanceTag {
        instance_id: String,
        key: String,
        value: String,
    },
    RemoveInstanceProtection {
        asg_name: String,
        instance_id: String,
    },
    CompleteLifecycleAction {
        asg_name: String,
        instance_id: String,
    },
    RecordLifecycleActionHeartbeat {
        asg_name: String,
        instance_id: String,
        hook_name: String,
    },
    DetachInstance {
        asg_name: String,
        instance_id: String,
    },
}

/// [`CloudClient`] over in-memory fixtures, recording every mutation.
#[derive(Default)]
pub struct MockCloudClient {
    pub groups: Mutex<Vec<AutoscalingGroupDetails>>,
    pub descriptions: Mutex<HashMap<String, InstanceDescription>>,
    pub hooks: Vec<String>,
    pub requests: Mutex<Vec<CloudRequest>>,
    /// Instance ids whose mutations fail with an error.
    pub failing_instances: Mutex<HashSet<String>>,
}

impl MockCloudClient {
    pub fn new() -> Self {
        Self {
            hooks: vec!["my-lifecycle-hook".to_string()],
            ..Self::default()
        }
    }

    pub fn with_group(self, details: AutoscalingGroupDetails) -> Self {
        self.groups.lock().unwrap().push(details);
        self
    }

    pub fn with_description(self, description: InstanceDescription) -> Self {
        self.descriptions
            .lock()
            .unwrap()
            .insert(description.instance_id.clone(), description);
        self
    }

    pub fn fail_instance(&self, instance_id: &str) {
        self.failing_instances
            .lock()
            .unwrap()
            .insert(instance_id.to_string());
    }

    pub fn requests(&self) -> Vec<CloudRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_of<F: Fn(&CloudRequest) -> bool>(&self, pred: F) -> Vec<CloudRequest> {
        self.requests().into_iter().filter(|r| pred(r)).collect()
    }

    fn check_failure(&self, instance_id: &str) -> Result<()> {
        if self.failing_instances.lock().unwrap().contains(instance_id) {
            bail!("forced failure for {instance_id}");
        }
        Ok(())
    }
}

#[async_trait]
impl CloudClient for MockCloudClient {
    async fn describe_instances_by_tag(&self, tag_key: &str) -> Result<Vec<InstanceDescription>> {
        let mut tagged: Vec<InstanceDescription> = self
            .descriptions
            .lock()
            .unwrap()
            .values()
            .filter(|description| description.tags.contains_key(tag_key))
            .cloned()
            .collect();
        tagged.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
        Ok(tagged)
    }

    async fn describe_instance_by_id(&self, instance_id: &str) -> Result<InstanceDescription> {
        self.descriptions
            .lock()
            .unwrap()
            .get(instance_id)
            .cloned()
            .ok_or_else(|| anyhow!("instance {instance_id} not found"))
    }

    async fn describe_asgs_by_prefix(&self, prefix: &str) -> Result<Vec<AutoscalingGroupDetails>> {
        Ok(self
            .groups
            .lock()
            .unwrap()
            .iter()
            .filter(|group| group.name.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn set_instance_tag(&self, instance_id: &str, key: &str, value: &str) -> Result<()> {
        self.check_failure(instance_id)?;
        self.requests.lock().unwrap().push(CloudRequest::SetInstanceTag {
            instance_id: instance_id.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        });
        if let Some(description) = self.descriptions.lock().unwrap().get_mut(instance_id) {
            description.tags.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }

    async fn remove_instance_protection(&self, asg_name: &str, instance_id: &str) -> Result<()> {
        self.check_failure(instance_id)?;
        self.requests
            .lock()
            .unwrap()
            .push(CloudRequest::RemoveInstanceProtection {
                asg_name: asg_name.to_string(),
                instance_id: instance_id.to_string(),
            });
        Ok(())
    }

    async fn complete_lifecycle_action(&self, asg_name: &str, instance_id: &str) -> Result<()> {
        self.check_failure(instance_id)?;
        self.requests
            .lock()
            .unwrap()
            .push(CloudRequest::CompleteLifecycleAction {
                asg_name: asg_name.to_string(),
                instance_id: instance_id.to_string(),
            });
        Ok(())
    }

    async fn record_lifecycle_action_heartbeat(
        &self,
        asg_name: &str,
        instance_id: &str,
        hook_name: &str,
    ) -> Result<()> {
        self.check_failure(instance_id)?;
        self.requests
            .lock()
            .unwrap()
            .push(CloudRequest::RecordLifecycleActionHeartbeat {
                asg_name: asg_name.to_string(),
                instance_id: instance_id.to_string(),
                hook_name: hook_name.to_string(),
            });
        Ok(())
    }

    async fn describe_lifecycle_hooks(&self, _asg_name: &str) -> Result<Vec<String>> {
        Ok(self.hooks.clone())
    }

    async fn detach_instance(&self, asg_name: &str, instance_id: &str) -> Result<()> {
        self.check_failure(instance_id)?;
        self.requests.lock().unwrap().push(CloudRequest::DetachInstance {
            asg_name: asg_name.to_string(),
            instance_id: instance_id.to_string(),
        });
        Ok(())
    }
}

/// [`MesosClient`] over fixture responses, recording maintenance calls.
#[derive(Default)]
pub struct MockMesosClient {
    pub tasks: TasksResponse,
    pub frameworks: FrameworksResponse,
    pub agents: SlavesResponse,
    pub maintenance_calls: Mutex<Vec<HashMap<String, String>>>,
}

impl MockMesosClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn maintenance_calls(&self) -> Vec<HashMap<String, String>> {
        self.maintenance_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MesosClient for MockMesosClient {
    async fn get_tasks(&self) -> Result<TasksResponse> {
        Ok(self.tasks.clone())
    }

    async fn get_frameworks(&self) -> Result<FrameworksResponse> {
        Ok(self.frameworks.clone())
    }

    async fn get_agents(&self) -> Result<SlavesResponse> {
        Ok(self.agents.clone())
    }

    async fn set_hosts_in_maintenance(&self, hosts: &HashMap<String, String>) -> Result<()> {
        self.maintenance_calls.lock().unwrap().push(hosts.clone());
        Ok(())
    }

    async fn update_leader_url(&self) -> Result<String> {
        Ok("http://leader.mesos:5050".to_string())
    }
}

/// [`AuroraClient`] over a fixture maintenance state, recording every call.
#[derive(Default)]
pub struct MockAuroraClient {
    pub maintenance: Mutex<MaintenanceResponse>,
    pub drain_calls: Mutex<Vec<HashMap<String, String>>>,
    pub start_calls: Mutex<Vec<HashMap<String, String>>>,
    pub end_calls: Mutex<Vec<HashMap<String, String>>>,
}

impl MockAuroraClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain_calls(&self) -> Vec<HashMap<String, String>> {
        self.drain_calls.lock().unwrap().clone()
    }

    pub fn start_calls(&self) -> Vec<HashMap<String, String>> {
        self.start_calls.lock().unwrap().clone()
    }

    pub fn end_calls(&self) -> Vec<HashMap<String, String>> {
        self.end_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuroraClient for MockAuroraClient {
    async fn get_maintenance(&self) -> Result<MaintenanceResponse> {
        Ok(self.maintenance.lock().unwrap().clone())
    }

    async fn start_maintenance(&self, hosts: &HashMap<String, String>) -> Result<()> {
        self.start_calls.lock().unwrap().push(hosts.clone());
        Ok(())
    }

    async fn end_maintenance(&self, hosts: &HashMap<String, String>) -> Result<()> {
        self.end_calls.lock().unwrap().push(hosts.clone());
        Ok(())
    }

    async fn drain_hosts(&self, hosts: &HashMap<String, String>) -> Result<()> {
        self.drain_calls.lock().unwrap().push(hosts.clone());
        Ok(())
    }
}

/// Fixture helpers

pub fn instance_description(instance_id: &str, last_octet: u8) -> InstanceDescription {
    InstanceDescription {
        instance_id: instance_id.to_string(),
        private_ip: format!("10.0.0.{last_octet}"),
        private_dns: format!("ip-10-0-0-{last_octet}.internal"),
        tags: HashMap::new(),
    }
}

pub fn group_details(
    name: &str,
    desired_capacity: usize,
    member_ids: &[&str],
) -> AutoscalingGroupDetails {
    AutoscalingGroupDetails {
        name: name.to_string(),
        desired_capacity,
        members: member_ids
            .iter()
            .map(|id| AutoscalingGroupMember {
                instance_id: id.to_string(),
                lifecycle_state: LifecycleState::InService,
                protected: false,
            })
            .collect(),
    }
}

pub fn running_task(id: &str, framework_id: &str, slave_id: &str) -> MesosTask {
    MesosTask {
        id: id.to_string(),
        name: id.to_string(),
        framework_id: framework_id.to_string(),
        slave_id: slave_id.to_string(),
        state: "TASK_RUNNING".to_string(),
        labels: Vec::new(),
    }
}

pub fn labeled_task(id: &str, framework_id: &str, slave_id: &str, label_key: &str) -> MesosTask {
    MesosTask {
        labels: vec![MesosLabel {
            key: label_key.to_string(),
            value: "true".to_string(),
        }],
        ..running_task(id, framework_id, slave_id)
    }
}

pub fn framework(id: &str, name: &str) -> MesosFramework {
    MesosFramework {
        id: id.to_string(),
        name: name.to_string(),
        active: true,
    }
}

pub fn agent(slave_id: &str, last_octet: u8) -> MesosAgent {
    MesosAgent {
        id: slave_id.to_string(),
        hostname: format!("ip-10-0-0-{last_octet}.internal"),
        pid: format!("slave(1)@10.0.0.{last_octet}:5051"),
    }
}
