//! Core library for the deathnode decommissioning service
//!
//! This crate provides the building blocks of the control loop:
//! - Clients for AWS, the Mesos master and the Aurora scheduler
//! - Per-tick snapshot monitors over the three control planes
//! - Victim selection (constraints + recommenders)
//! - The notebook, which drives marked instances to termination
//! - The watcher, which runs one full control tick

pub mod api;
pub mod aurora;
pub mod aws;
pub mod clock;
pub mod config;
pub mod health;
pub mod mesos;
pub mod models;
pub mod monitor;
pub mod notebook;
pub mod observability;
pub mod selector;
pub mod watcher;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::DeathnodeConfig;
pub use health::{
    components, ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse,
    ReadinessResponse,
};
pub use models::*;
pub use notebook::Notebook;
pub use observability::DeathnodeMetrics;
pub use watcher::Watcher;
