//! Service configuration

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Fraction of the lifecycle-hook timeout after which the hook is
/// heartbeated, when `reset_lifecycle` is enabled.
pub const LIFECYCLE_REFRESH_TIMEOUT_PERCENTAGE: f64 = 0.7;

/// Deathnode configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DeathnodeConfig {
    /// Tag key used as the death-mark on instances selected to die
    pub death_node_mark: String,

    /// Autoscaling-group name prefixes to manage
    #[serde(default)]
    pub autoscaling_group_prefixes: Vec<String>,

    /// Mesos framework names whose tasks block termination of their host
    #[serde(default)]
    pub protected_frameworks: Vec<String>,

    /// Mesos task label keys whose presence blocks termination of their host
    #[serde(default)]
    pub protected_labels: Vec<String>,

    /// Constraint strategy name
    #[serde(default = "default_constraints_type")]
    pub constraints_type: String,

    /// Recommender strategy name
    #[serde(default = "default_recommender_type")]
    pub recommender_type: String,

    /// Minimum gap in seconds between successful lifecycle completions
    /// (0 disables rate limiting)
    #[serde(default)]
    pub delay_delete_seconds: u64,

    /// Heartbeat the lifecycle hook before its timeout expires
    #[serde(default)]
    pub reset_lifecycle: bool,

    /// Lifecycle-hook timeout in seconds
    #[serde(default = "default_lifecycle_timeout")]
    pub lifecycle_timeout: u64,

    /// Aurora scheduler URL; empty disables the Aurora integration
    #[serde(default)]
    pub aurora_url: String,

    /// Mesos master URL
    pub mesos_master_url: String,

    /// Tick period in seconds
    #[serde(default = "default_polling_seconds")]
    pub polling_seconds: u64,

    /// Port for the health and metrics endpoint
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// AWS region override; the SDK's default provider chain applies when unset
    #[serde(default)]
    pub aws_region: Option<String>,
}

fn default_constraints_type() -> String {
    "noConstraint".to_string()
}

fn default_recommender_type() -> String {
    "firstAvailableInstance".to_string()
}

fn default_lifecycle_timeout() -> u64 {
    3600
}

fn default_polling_seconds() -> u64 {
    60
}

fn default_api_port() -> u16 {
    8080
}

impl DeathnodeConfig {
    /// Load configuration from an optional TOML file and `DEATHNODE_`-prefixed
    /// environment variables; environment wins over the file.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        let config = builder
            .add_source(config::Environment::with_prefix("DEATHNODE"))
            .build()
            .context("unable to read configuration")?;

        let config: DeathnodeConfig = config
            .try_deserialize()
            .context("invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.death_node_mark.is_empty() {
            bail!("death_node_mark must not be empty");
        }
        if self.mesos_master_url.is_empty() {
            bail!("mesos_master_url must not be empty");
        }
        if self.autoscaling_group_prefixes.is_empty() {
            bail!("at least one autoscaling group prefix is required");
        }
        Ok(())
    }

    /// Whether the Aurora integration is enabled.
    pub fn aurora_enabled(&self) -> bool {
        !self.aurora_url.is_empty()
    }
}
