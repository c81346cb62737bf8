//! Candidate filters

use anyhow::{bail, Result};

use crate::models::Instance;
use crate::monitor::MesosMonitor;

/// Filters the candidate set before a victim is recommended.
pub trait Constraint: Send + Sync {
    fn filter(&self, instances: &[Instance], mesos: &MesosMonitor) -> Vec<Instance>;
}

/// Build the constraint named by the configuration.
pub fn new_constraint(constraint_type: &str) -> Result<Box<dyn Constraint>> {
    match constraint_type {
        "noConstraint" => Ok(Box::new(NoConstraint)),
        "protectedConstraint" => Ok(Box::new(ProtectedConstraint)),
        other => bail!("unknown constraint type: {other}"),
    }
}

/// Keeps every candidate.
struct NoConstraint;

impl Constraint for NoConstraint {
    fn filter(&self, instances: &[Instance], _mesos: &MesosMonitor) -> Vec<Instance> {
        instances.to_vec()
    }
}

/// Drops candidates whose IP currently hosts a protected task; marking them
/// would pick a victim that cannot be killed anyway.
struct ProtectedConstraint;

impl Constraint for ProtectedConstraint {
    fn filter(&self, instances: &[Instance], mesos: &MesosMonitor) -> Vec<Instance> {
        instances
            .iter()
            .filter(|instance| !mesos.is_protected(&instance.private_ip))
            .cloned()
            .collect()
    }
}
