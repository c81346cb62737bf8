//! HTTP implementation of [`AuroraClient`]

use std::collections::HashMap;

use anyhow::{Context, Result};
use tracing::debug;

use super::{AuroraClient, MaintenanceHostsRequest, MaintenanceResponse};

/// [`AuroraClient`] backed by the scheduler's HTTP API.
pub struct HttpAuroraClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAuroraClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("building Aurora HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn post_hosts(&self, endpoint: &str, hosts: &HashMap<String, String>) -> Result<()> {
        let url = format!("{}/apibeta/{endpoint}", self.base_url);
        debug!(url = %url, hosts = hosts.len(), "Aurora maintenance call");

        self.http
            .post(&url)
            .json(&MaintenanceHostsRequest::from_hosts(hosts))
            .send()
            .await
            .with_context(|| format!("POST {url}"))?
            .error_for_status()
            .with_context(|| format!("POST {url}"))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl AuroraClient for HttpAuroraClient {
    async fn get_maintenance(&self) -> Result<MaintenanceResponse> {
        let url = format!("{}/maintenance", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .with_context(|| format!("GET {url}"))?;
        response.json().await.with_context(|| format!("decoding {url}"))
    }

    async fn start_maintenance(&self, hosts: &HashMap<String, String>) -> Result<()> {
        self.post_hosts("startMaintenance", hosts).await
    }

    async fn end_maintenance(&self, hosts: &HashMap<String, String>) -> Result<()> {
        self.post_hosts("endMaintenance", hosts).await
    }

    async fn drain_hosts(&self, hosts: &HashMap<String, String>) -> Result<()> {
        self.post_hosts("drainHosts", hosts).await
    }
}
