//! AWS access for the monitors and the notebook
//!
//! The SDK is kept behind the [`CloudClient`] trait so every component that
//! mutates or reads cloud state can be exercised against a recording mock.

mod client;

pub use client::AwsClient;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::AutoscalingGroupDetails;

/// EC2-level description of an instance: identity, addressing and tags.
///
/// Lifecycle state and scale-in protection are autoscaling-level facts and
/// are merged in by the autoscaling monitor.
#[derive(Debug, Clone)]
pub struct InstanceDescription {
    pub instance_id: String,
    pub private_ip: String,
    pub private_dns: String,
    pub tags: HashMap<String, String>,
}

/// Interface to the AWS control plane.
#[async_trait]
pub trait CloudClient: Send + Sync {
    /// All instances carrying the given tag key, across all groups.
    async fn describe_instances_by_tag(&self, tag_key: &str) -> Result<Vec<InstanceDescription>>;

    async fn describe_instance_by_id(&self, instance_id: &str) -> Result<InstanceDescription>;

    /// All autoscaling groups whose name starts with `prefix`.
    async fn describe_asgs_by_prefix(&self, prefix: &str) -> Result<Vec<AutoscalingGroupDetails>>;

    async fn set_instance_tag(&self, instance_id: &str, key: &str, value: &str) -> Result<()>;

    async fn remove_instance_protection(&self, asg_name: &str, instance_id: &str) -> Result<()>;

    /// Complete the termination lifecycle action for every hook of the group.
    async fn complete_lifecycle_action(&self, asg_name: &str, instance_id: &str) -> Result<()>;

    async fn record_lifecycle_action_heartbeat(
        &self,
        asg_name: &str,
        instance_id: &str,
        hook_name: &str,
    ) -> Result<()>;

    /// Names of the lifecycle hooks configured on the group.
    async fn describe_lifecycle_hooks(&self, asg_name: &str) -> Result<Vec<String>>;

    /// Detach an instance from its group without lowering desired capacity.
    async fn detach_instance(&self, asg_name: &str, instance_id: &str) -> Result<()>;
}
