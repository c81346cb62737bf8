//! Core data models shared across monitors, the selector and the notebook

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Autoscaling lifecycle state of an instance, as reported by AWS.
///
/// The state is cloud-authoritative: the core only reads it and never
/// transitions an instance itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    Pending,
    InService,
    TerminatingWait,
    Terminated,
}

impl LifecycleState {
    /// Parse the AWS wire representation (`Terminating:Wait`, `InService`, ...).
    ///
    /// Unrecognized values collapse to `Pending`: an instance in any of the
    /// transitional states AWS may add is not safe to act on, which is
    /// exactly how `Pending` is treated everywhere else.
    pub fn parse(value: &str) -> Self {
        match value {
            "InService" => LifecycleState::InService,
            "Terminating:Wait" => LifecycleState::TerminatingWait,
            "Terminated" => LifecycleState::Terminated,
            _ => LifecycleState::Pending,
        }
    }
}

/// Snapshot record of one autoscaling-group member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub instance_id: String,
    pub private_ip: String,
    pub private_dns: String,
    pub autoscaling_group_name: String,
    pub lifecycle_state: LifecycleState,
    /// AWS scale-in protection flag.
    pub protected: bool,
    pub tags: HashMap<String, String>,
}

impl Instance {
    /// Whether the death-mark tag is present on this instance.
    pub fn is_marked_to_be_removed(&self, mark_tag: &str) -> bool {
        self.tags.contains_key(mark_tag)
    }

    /// Unix timestamp (seconds) at which the instance was death-marked.
    ///
    /// Returns `None` when the tag is absent or its value does not parse;
    /// a mangled tag value is treated the same as a fresh mark by callers.
    pub fn mark_timestamp(&self, mark_tag: &str) -> Option<i64> {
        self.tags.get(mark_tag)?.parse().ok()
    }
}

/// Description of an autoscaling group as enumerated from AWS.
///
/// Member order is the cloud's iteration order and is preserved through the
/// monitor snapshot; the `firstAvailableInstance` recommender depends on it.
#[derive(Debug, Clone)]
pub struct AutoscalingGroupDetails {
    pub name: String,
    pub desired_capacity: usize,
    pub members: Vec<AutoscalingGroupMember>,
}

/// Per-member detail as reported by the autoscaling API.
#[derive(Debug, Clone)]
pub struct AutoscalingGroupMember {
    pub instance_id: String,
    pub lifecycle_state: LifecycleState,
    pub protected: bool,
}
