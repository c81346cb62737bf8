//! Autoscaling-group monitors
//!
//! One [`AutoscalingGroupMonitor`] per managed group keeps a per-tick
//! snapshot of its members; the [`AutoscalingServiceMonitor`] enumerates
//! groups by configured name prefixes and owns the per-group monitors.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::{debug, info};

use crate::aws::CloudClient;
use crate::clock::Clock;
use crate::models::{AutoscalingGroupDetails, Instance};

/// Snapshot monitor for a single autoscaling group.
///
/// Member order follows the cloud's iteration order; every query between two
/// `refresh` calls answers from the same snapshot. Marking and protection
/// removal update the snapshot in place so the same tick observes them
/// without a refresh.
pub struct AutoscalingGroupMonitor {
    client: Arc<dyn CloudClient>,
    clock: Arc<dyn Clock>,
    mark_tag: String,
    name: String,
    desired_capacity: usize,
    instances: Vec<Instance>,
}

impl AutoscalingGroupMonitor {
    async fn from_details(
        client: Arc<dyn CloudClient>,
        clock: Arc<dyn Clock>,
        mark_tag: String,
        details: AutoscalingGroupDetails,
    ) -> Result<Self> {
        let mut instances = Vec::with_capacity(details.members.len());
        for member in &details.members {
            let description = client
                .describe_instance_by_id(&member.instance_id)
                .await
                .with_context(|| format!("describing member {}", member.instance_id))?;
            instances.push(Instance {
                instance_id: description.instance_id,
                private_ip: description.private_ip,
                private_dns: description.private_dns,
                autoscaling_group_name: details.name.clone(),
                lifecycle_state: member.lifecycle_state,
                protected: member.protected,
                tags: description.tags,
            });
        }

        Ok(Self {
            client,
            clock,
            mark_tag,
            name: details.name,
            desired_capacity: details.desired_capacity,
            instances,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn desired_capacity(&self) -> usize {
        self.desired_capacity
    }

    /// All current members, marked ones included.
    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    /// Members without the death-mark tag, in snapshot order.
    pub fn instances_not_marked_for_removal(&self) -> Vec<Instance> {
        self.instances
            .iter()
            .filter(|instance| !instance.is_marked_to_be_removed(&self.mark_tag))
            .cloned()
            .collect()
    }

    /// Members over the desired capacity, floored at zero. Marked members
    /// still count toward the live set until the cloud stops listing them.
    pub fn num_undesired_instances(&self) -> usize {
        self.instances.len().saturating_sub(self.desired_capacity)
    }

    /// Members already carrying the death-mark tag.
    pub fn num_marked_instances(&self) -> usize {
        self.instances
            .iter()
            .filter(|instance| instance.is_marked_to_be_removed(&self.mark_tag))
            .count()
    }

    pub fn instance_by_id(&self, instance_id: &str) -> Option<&Instance> {
        self.instances
            .iter()
            .find(|instance| instance.instance_id == instance_id)
    }

    /// Write the death-mark tag (value: marking Unix timestamp) and update
    /// the snapshot so the same tick no longer offers the instance as a
    /// candidate.
    pub async fn mark_to_be_removed(&mut self, instance_id: &str) -> Result<()> {
        let timestamp = self.clock.now().timestamp().to_string();
        self.client
            .set_instance_tag(instance_id, &self.mark_tag, &timestamp)
            .await?;

        let mark_tag = self.mark_tag.clone();
        let group_name = self.name.clone();
        let instance = self
            .instance_mut(instance_id)
            .ok_or_else(|| anyhow!("instance {instance_id} not in group {group_name}"))?;
        instance.tags.insert(mark_tag, timestamp);
        Ok(())
    }

    /// Clear scale-in protection on AWS and in the snapshot.
    pub async fn remove_instance_protection(&mut self, instance_id: &str) -> Result<()> {
        self.client
            .remove_instance_protection(&self.name, instance_id)
            .await?;

        if let Some(instance) = self.instance_mut(instance_id) {
            instance.protected = false;
        }
        Ok(())
    }

    /// Heartbeat every lifecycle hook of the group for the given instance,
    /// extending the termination window.
    pub async fn refresh_lifecycle_hook(&self, instance_id: &str) -> Result<()> {
        for hook_name in self.client.describe_lifecycle_hooks(&self.name).await? {
            self.client
                .record_lifecycle_action_heartbeat(&self.name, instance_id, &hook_name)
                .await?;
        }
        Ok(())
    }

    /// Detach the instance from the group without lowering desired capacity.
    pub async fn detach_instance(&mut self, instance_id: &str) -> Result<()> {
        self.client.detach_instance(&self.name, instance_id).await?;
        self.instances
            .retain(|instance| instance.instance_id != instance_id);
        Ok(())
    }

    fn instance_mut(&mut self, instance_id: &str) -> Option<&mut Instance> {
        self.instances
            .iter_mut()
            .find(|instance| instance.instance_id == instance_id)
    }
}

/// Monitor over all autoscaling groups matching the configured prefixes.
pub struct AutoscalingServiceMonitor {
    client: Arc<dyn CloudClient>,
    clock: Arc<dyn Clock>,
    mark_tag: String,
    prefixes: Vec<String>,
    groups: Vec<AutoscalingGroupMonitor>,
}

impl AutoscalingServiceMonitor {
    pub fn new(
        client: Arc<dyn CloudClient>,
        clock: Arc<dyn Clock>,
        mark_tag: impl Into<String>,
        prefixes: Vec<String>,
    ) -> Self {
        Self {
            client,
            clock,
            mark_tag: mark_tag.into(),
            prefixes,
            groups: Vec::new(),
        }
    }

    /// Re-enumerate the managed groups and rebuild every snapshot. The old
    /// snapshot stays in place when any part of the enumeration fails.
    pub async fn refresh(&mut self) -> Result<()> {
        let mut groups = Vec::new();
        for prefix in &self.prefixes {
            let details = self.client.describe_asgs_by_prefix(prefix).await?;
            if details.is_empty() {
                debug!(prefix = %prefix, "No autoscaling groups for prefix");
            }
            for group in details {
                groups.push(
                    AutoscalingGroupMonitor::from_details(
                        self.client.clone(),
                        self.clock.clone(),
                        self.mark_tag.clone(),
                        group,
                    )
                    .await?,
                );
            }
        }

        info!(groups = groups.len(), "Refreshed autoscaling snapshot");
        self.groups = groups;
        Ok(())
    }

    pub fn groups(&self) -> &[AutoscalingGroupMonitor] {
        &self.groups
    }

    pub fn groups_mut(&mut self) -> &mut [AutoscalingGroupMonitor] {
        &mut self.groups
    }

    /// Look an instance up across all managed groups.
    pub fn instance_by_id(&self, instance_id: &str) -> Option<Instance> {
        self.groups
            .iter()
            .find_map(|group| group.instance_by_id(instance_id).cloned())
    }

    /// Clear scale-in protection through the owning group's monitor.
    pub async fn remove_instance_protection(&mut self, instance_id: &str) -> Result<()> {
        let group = self
            .owning_group_mut(instance_id)
            .ok_or_else(|| anyhow!("instance {instance_id} not in any monitored group"))?;
        group.remove_instance_protection(instance_id).await
    }

    /// Heartbeat the lifecycle hooks of the owning group.
    pub async fn refresh_lifecycle_hook(&self, instance_id: &str) -> Result<()> {
        let group = self
            .groups
            .iter()
            .find(|group| group.instance_by_id(instance_id).is_some())
            .ok_or_else(|| anyhow!("instance {instance_id} not in any monitored group"))?;
        group.refresh_lifecycle_hook(instance_id).await
    }

    fn owning_group_mut(&mut self, instance_id: &str) -> Option<&mut AutoscalingGroupMonitor> {
        self.groups
            .iter_mut()
            .find(|group| group.instance_by_id(instance_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LifecycleState;
    use crate::testutil::{
        group_details, instance_description, CloudRequest, ManualClock, MockCloudClient,
    };

    const MARK: &str = "DEATH_NODE_MARK";

    fn service_monitor(client: MockCloudClient) -> AutoscalingServiceMonitor {
        AutoscalingServiceMonitor::new(
            Arc::new(client),
            Arc::new(ManualClock::at_unix(1500000000)),
            MARK,
            vec!["some-Autoscaling-Group".to_string()],
        )
    }

    fn default_client() -> MockCloudClient {
        MockCloudClient::new()
            .with_group(group_details(
                "some-Autoscaling-Group",
                3,
                &["i-34719eb8", "i-777a73cf", "i-666ca923"],
            ))
            .with_description(instance_description("i-34719eb8", 1))
            .with_description(instance_description("i-777a73cf", 2))
            .with_description(instance_description("i-666ca923", 3))
    }

    #[tokio::test]
    async fn refresh_builds_one_monitor_per_group_member() {
        let mut monitor = service_monitor(default_client());
        monitor.refresh().await.unwrap();

        assert_eq!(monitor.groups().len(), 1);
        let group = &monitor.groups()[0];
        assert_eq!(group.name(), "some-Autoscaling-Group");
        assert_eq!(group.instances().len(), 3);
        assert_eq!(group.num_undesired_instances(), 0);

        // Snapshot order is the cloud's iteration order.
        let ids: Vec<&str> = group
            .instances()
            .iter()
            .map(|i| i.instance_id.as_str())
            .collect();
        assert_eq!(ids, vec!["i-34719eb8", "i-777a73cf", "i-666ca923"]);
    }

    #[tokio::test]
    async fn shrunk_desired_capacity_yields_undesired_instances() {
        let client = MockCloudClient::new()
            .with_group(group_details(
                "some-Autoscaling-Group",
                2,
                &["i-34719eb8", "i-777a73cf", "i-666ca923"],
            ))
            .with_description(instance_description("i-34719eb8", 1))
            .with_description(instance_description("i-777a73cf", 2))
            .with_description(instance_description("i-666ca923", 3));

        let mut monitor = service_monitor(client);
        monitor.refresh().await.unwrap();

        assert_eq!(monitor.groups()[0].num_undesired_instances(), 1);
    }

    #[tokio::test]
    async fn marking_updates_cloud_and_snapshot_in_place() {
        let mut monitor = service_monitor(default_client());
        monitor.refresh().await.unwrap();

        let group = &mut monitor.groups_mut()[0];
        group.mark_to_be_removed("i-34719eb8").await.unwrap();

        // The same tick no longer offers the marked instance.
        let unmarked = group.instances_not_marked_for_removal();
        assert_eq!(unmarked.len(), 2);
        assert!(unmarked.iter().all(|i| i.instance_id != "i-34719eb8"));
        assert_eq!(group.num_marked_instances(), 1);

        let marked = group.instance_by_id("i-34719eb8").unwrap();
        assert_eq!(marked.mark_timestamp(MARK), Some(1500000000));
    }

    #[tokio::test]
    async fn marked_instances_still_count_toward_the_live_set() {
        let mut monitor = service_monitor(default_client());
        monitor.refresh().await.unwrap();

        let group = &mut monitor.groups_mut()[0];
        let before = group.num_undesired_instances();
        group.mark_to_be_removed("i-34719eb8").await.unwrap();

        assert_eq!(group.instances().len(), 3);
        assert_eq!(group.num_undesired_instances(), before);
    }

    #[tokio::test]
    async fn protection_removal_updates_the_snapshot() {
        let mut details = group_details("some-Autoscaling-Group", 3, &["i-34719eb8"]);
        details.members[0].protected = true;
        let client = MockCloudClient::new()
            .with_group(details)
            .with_description(instance_description("i-34719eb8", 1));

        let mut monitor = service_monitor(client);
        monitor.refresh().await.unwrap();
        assert!(monitor.instance_by_id("i-34719eb8").unwrap().protected);

        monitor.remove_instance_protection("i-34719eb8").await.unwrap();
        assert!(!monitor.instance_by_id("i-34719eb8").unwrap().protected);
    }

    #[tokio::test]
    async fn refresh_replaces_the_snapshot() {
        let client = Arc::new(default_client());
        let mut monitor = AutoscalingServiceMonitor::new(
            client.clone(),
            Arc::new(ManualClock::at_unix(1500000000)),
            MARK,
            vec!["some-Autoscaling-Group".to_string()],
        );
        monitor.refresh().await.unwrap();
        assert_eq!(monitor.groups()[0].instances().len(), 3);

        // The cloud stops listing one member.
        {
            let mut groups = client.groups.lock().unwrap();
            groups[0] = group_details("some-Autoscaling-Group", 3, &["i-34719eb8", "i-777a73cf"]);
        }
        monitor.refresh().await.unwrap();
        assert_eq!(monitor.groups()[0].instances().len(), 2);
    }

    #[tokio::test]
    async fn instance_lookup_reports_not_found() {
        let mut monitor = service_monitor(default_client());
        monitor.refresh().await.unwrap();

        assert!(monitor.instance_by_id("i-missing").is_none());
        assert!(monitor
            .remove_instance_protection("i-missing")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn detach_removes_the_member_from_the_snapshot() {
        let client = Arc::new(default_client());
        let mut monitor = AutoscalingServiceMonitor::new(
            client.clone(),
            Arc::new(ManualClock::at_unix(1500000000)),
            MARK,
            vec!["some-Autoscaling-Group".to_string()],
        );
        monitor.refresh().await.unwrap();

        let group = &mut monitor.groups_mut()[0];
        group.detach_instance("i-34719eb8").await.unwrap();

        assert_eq!(group.instances().len(), 2);
        assert_eq!(
            client.requests(),
            vec![CloudRequest::DetachInstance {
                asg_name: "some-Autoscaling-Group".to_string(),
                instance_id: "i-34719eb8".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn lifecycle_hook_refresh_heartbeats_every_hook() {
        let client = Arc::new(MockCloudClient {
            hooks: vec!["hook-a".to_string(), "hook-b".to_string()],
            ..MockCloudClient::new()
        });
        client.groups.lock().unwrap().push(group_details(
            "some-Autoscaling-Group",
            3,
            &["i-34719eb8"],
        ));
        client
            .descriptions
            .lock()
            .unwrap()
            .insert("i-34719eb8".to_string(), instance_description("i-34719eb8", 1));

        let mut monitor = AutoscalingServiceMonitor::new(
            client.clone(),
            Arc::new(ManualClock::at_unix(1500000000)),
            MARK,
            vec!["some-Autoscaling-Group".to_string()],
        );
        monitor.refresh().await.unwrap();
        monitor.refresh_lifecycle_hook("i-34719eb8").await.unwrap();

        let heartbeats = client.requests_of(|request| {
            matches!(request, CloudRequest::RecordLifecycleActionHeartbeat { .. })
        });
        assert_eq!(heartbeats.len(), 2);
    }

    #[tokio::test]
    async fn members_in_terminating_wait_keep_their_state() {
        let mut details = group_details("some-Autoscaling-Group", 3, &["i-34719eb8"]);
        details.members[0].lifecycle_state = LifecycleState::TerminatingWait;
        let client = MockCloudClient::new()
            .with_group(details)
            .with_description(instance_description("i-34719eb8", 1));

        let mut monitor = service_monitor(client);
        monitor.refresh().await.unwrap();

        assert_eq!(
            monitor.instance_by_id("i-34719eb8").unwrap().lifecycle_state,
            LifecycleState::TerminatingWait
        );
    }
}
