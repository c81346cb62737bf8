//! Victim choice among filtered candidates

use anyhow::{bail, Result};

use crate::models::Instance;

/// Picks one victim from the filtered candidate set; `None` means no victim
/// this tick.
pub trait Recommender: Send + Sync {
    fn find(&self, instances: &[Instance]) -> Option<Instance>;
}

/// Build the recommender named by the configuration.
pub fn new_recommender(recommender_type: &str) -> Result<Box<dyn Recommender>> {
    match recommender_type {
        "firstAvailableInstance" => Ok(Box::new(FirstAvailableInstance)),
        other => bail!("unknown recommender type: {other}"),
    }
}

/// First candidate in iteration order; deterministic because monitor
/// snapshots preserve the cloud's member order.
struct FirstAvailableInstance;

impl Recommender for FirstAvailableInstance {
    fn find(&self, instances: &[Instance]) -> Option<Instance> {
        instances.first().cloned()
    }
}
