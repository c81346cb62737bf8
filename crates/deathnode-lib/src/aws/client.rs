//! AWS SDK implementation of [`CloudClient`]

use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_sdk_ec2::types::Filter;
use tracing::debug;

use super::{CloudClient, InstanceDescription};
use crate::models::{AutoscalingGroupDetails, AutoscalingGroupMember, LifecycleState};

const LIFECYCLE_ACTION_CONTINUE: &str = "CONTINUE";

/// [`CloudClient`] backed by the EC2 and autoscaling service clients.
pub struct AwsClient {
    ec2: aws_sdk_ec2::Client,
    autoscaling: aws_sdk_autoscaling::Client,
}

impl AwsClient {
    /// Build a client from the default credential/region provider chain,
    /// with an optional region override.
    pub async fn new(region: Option<String>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region));
        }
        let config = loader.load().await;

        Self {
            ec2: aws_sdk_ec2::Client::new(&config),
            autoscaling: aws_sdk_autoscaling::Client::new(&config),
        }
    }
}

fn tag_map(tags: &[aws_sdk_ec2::types::Tag]) -> HashMap<String, String> {
    tags.iter()
        .filter_map(|tag| {
            let key = tag.key()?.to_string();
            let value = tag.value().unwrap_or_default().to_string();
            Some((key, value))
        })
        .collect()
}

fn describe_from(instance: &aws_sdk_ec2::types::Instance) -> InstanceDescription {
    InstanceDescription {
        instance_id: instance.instance_id().unwrap_or_default().to_string(),
        private_ip: instance.private_ip_address().unwrap_or_default().to_string(),
        private_dns: instance.private_dns_name().unwrap_or_default().to_string(),
        tags: tag_map(instance.tags()),
    }
}

#[async_trait]
impl CloudClient for AwsClient {
    async fn describe_instances_by_tag(&self, tag_key: &str) -> Result<Vec<InstanceDescription>> {
        let response = self
            .ec2
            .describe_instances()
            .filters(Filter::builder().name("tag-key").values(tag_key).build())
            .send()
            .await
            .with_context(|| format!("describing instances tagged {tag_key}"))?;

        let instances = response
            .reservations()
            .iter()
            .flat_map(|reservation| reservation.instances())
            .map(describe_from)
            .collect();
        Ok(instances)
    }

    async fn describe_instance_by_id(&self, instance_id: &str) -> Result<InstanceDescription> {
        let response = self
            .ec2
            .describe_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .with_context(|| format!("describing instance {instance_id}"))?;

        response
            .reservations()
            .iter()
            .flat_map(|reservation| reservation.instances())
            .map(describe_from)
            .next()
            .ok_or_else(|| anyhow!("instance {instance_id} not found"))
    }

    async fn describe_asgs_by_prefix(&self, prefix: &str) -> Result<Vec<AutoscalingGroupDetails>> {
        let mut groups = Vec::new();
        let mut pages = self
            .autoscaling
            .describe_auto_scaling_groups()
            .into_paginator()
            .items()
            .send();

        while let Some(group) = pages
            .try_next()
            .await
            .with_context(|| format!("enumerating autoscaling groups for prefix {prefix}"))?
        {
            let name = group.auto_scaling_group_name().unwrap_or_default().to_string();
            if !name.starts_with(prefix) {
                continue;
            }

            let members = group
                .instances()
                .iter()
                .map(|member| AutoscalingGroupMember {
                    instance_id: member.instance_id().unwrap_or_default().to_string(),
                    lifecycle_state: LifecycleState::parse(
                        member
                            .lifecycle_state()
                            .map(|state| state.as_str())
                            .unwrap_or_default(),
                    ),
                    protected: member.protected_from_scale_in().unwrap_or(false),
                })
                .collect();

            groups.push(AutoscalingGroupDetails {
                name,
                desired_capacity: group.desired_capacity().unwrap_or(0).max(0) as usize,
                members,
            });
        }

        debug!(prefix = %prefix, groups = groups.len(), "Enumerated autoscaling groups");
        Ok(groups)
    }

    async fn set_instance_tag(&self, instance_id: &str, key: &str, value: &str) -> Result<()> {
        self.ec2
            .create_tags()
            .resources(instance_id)
            .tags(
                aws_sdk_ec2::types::Tag::builder()
                    .key(key)
                    .value(value)
                    .build(),
            )
            .send()
            .await
            .with_context(|| format!("tagging instance {instance_id} with {key}"))?;
        Ok(())
    }

    async fn remove_instance_protection(&self, asg_name: &str, instance_id: &str) -> Result<()> {
        self.autoscaling
            .set_instance_protection()
            .auto_scaling_group_name(asg_name)
            .instance_ids(instance_id)
            .protected_from_scale_in(false)
            .send()
            .await
            .with_context(|| format!("removing scale-in protection from {instance_id}"))?;
        Ok(())
    }

    async fn complete_lifecycle_action(&self, asg_name: &str, instance_id: &str) -> Result<()> {
        for hook_name in self.describe_lifecycle_hooks(asg_name).await? {
            self.autoscaling
                .complete_lifecycle_action()
                .auto_scaling_group_name(asg_name)
                .lifecycle_hook_name(&hook_name)
                .instance_id(instance_id)
                .lifecycle_action_result(LIFECYCLE_ACTION_CONTINUE)
                .send()
                .await
                .with_context(|| {
                    format!("completing lifecycle action {hook_name} for {instance_id}")
                })?;
        }
        Ok(())
    }

    async fn record_lifecycle_action_heartbeat(
        &self,
        asg_name: &str,
        instance_id: &str,
        hook_name: &str,
    ) -> Result<()> {
        self.autoscaling
            .record_lifecycle_action_heartbeat()
            .auto_scaling_group_name(asg_name)
            .lifecycle_hook_name(hook_name)
            .instance_id(instance_id)
            .send()
            .await
            .with_context(|| format!("heartbeating lifecycle hook {hook_name} for {instance_id}"))?;
        Ok(())
    }

    async fn describe_lifecycle_hooks(&self, asg_name: &str) -> Result<Vec<String>> {
        let response = self
            .autoscaling
            .describe_lifecycle_hooks()
            .auto_scaling_group_name(asg_name)
            .send()
            .await
            .with_context(|| format!("describing lifecycle hooks of {asg_name}"))?;

        Ok(response
            .lifecycle_hooks()
            .iter()
            .filter_map(|hook| hook.lifecycle_hook_name().map(str::to_string))
            .collect())
    }

    async fn detach_instance(&self, asg_name: &str, instance_id: &str) -> Result<()> {
        self.autoscaling
            .detach_instances()
            .auto_scaling_group_name(asg_name)
            .instance_ids(instance_id)
            .should_decrement_desired_capacity(false)
            .send()
            .await
            .with_context(|| format!("detaching {instance_id} from {asg_name}"))?;
        Ok(())
    }
}
