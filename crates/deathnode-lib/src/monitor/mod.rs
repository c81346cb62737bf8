//! Per-tick snapshot monitors over the external control planes
//!
//! Each monitor exclusively owns its cache and rebuilds it in `refresh`;
//! between refreshes every query answers from the same snapshot.

mod aurora;
mod autoscaling;
mod mesos;

pub use aurora::AuroraMonitor;
pub use autoscaling::{AutoscalingGroupMonitor, AutoscalingServiceMonitor};
pub use mesos::MesosMonitor;
