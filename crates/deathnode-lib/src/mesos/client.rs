//! HTTP implementation of [`MesosClient`]

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::redirect;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use super::{
    maintenance_payload, FrameworksResponse, MesosClient, SlavesResponse, TasksResponse,
};
use crate::clock::Clock;

/// Page size of the master `/tasks` endpoint.
const TASKS_PAGE_SIZE: usize = 100;

/// [`MesosClient`] backed by the master HTTP API.
///
/// Requests go to the leading master; `update_leader_url` resolves it from
/// the configured master's redirect endpoint.
pub struct HttpMesosClient {
    http: reqwest::Client,
    master_url: String,
    leader_url: RwLock<String>,
    clock: Arc<dyn Clock>,
}

impl HttpMesosClient {
    pub fn new(master_url: impl Into<String>, clock: Arc<dyn Clock>) -> Result<Self> {
        // Redirects are resolved by hand so the Location header stays visible.
        let http = reqwest::Client::builder()
            .redirect(redirect::Policy::none())
            .build()
            .context("building Mesos HTTP client")?;

        let master_url = master_url.into();
        Ok(Self {
            http,
            leader_url: RwLock::new(master_url.clone()),
            master_url,
            clock,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.leader_url.read().await.as_str(), path);
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
}

/// Resolve the leader URL from a redirect Location, inheriting the master
/// URL's scheme when the Location has none (`//host:port/...`).
fn resolve_leader_url(master_url: &str, location: &str) -> Result<String> {
    let master = Url::parse(master_url).with_context(|| format!("parsing {master_url}"))?;
    if location.starts_with("//") {
        return Ok(format!("{}:{}", master.scheme(), location));
    }
    let leader = Url::parse(location).with_context(|| format!("parsing {location}"))?;
    Ok(leader.to_string().trim_end_matches('/').to_string())
}

#[async_trait::async_trait]
impl MesosClient for HttpMesosClient {
    async fn get_tasks(&self) -> Result<TasksResponse> {
        let mut all = TasksResponse::default();
        let mut offset = 0;

        loop {
            let page: TasksResponse = self
                .get_json(&format!(
                    "/master/tasks?limit={TASKS_PAGE_SIZE}&offset={offset}"
                ))
                .await?;
            let page_len = page.tasks.len();
            all.tasks.extend(page.tasks);

            if page_len < TASKS_PAGE_SIZE {
                break;
            }
            offset += TASKS_PAGE_SIZE;
        }

        debug!(tasks = all.tasks.len(), "Fetched Mesos tasks");
        Ok(all)
    }

    async fn get_frameworks(&self) -> Result<FrameworksResponse> {
        self.get_json("/master/state.json").await
    }

    async fn get_agents(&self) -> Result<SlavesResponse> {
        self.get_json("/master/slaves").await
    }

    async fn set_hosts_in_maintenance(&self, hosts: &HashMap<String, String>) -> Result<()> {
        let start_nanos = self.clock.now().timestamp_nanos_opt().unwrap_or(1).max(1);
        let payload = maintenance_payload(hosts, start_nanos);

        let url = format!(
            "{}/master/maintenance/schedule",
            self.leader_url.read().await.as_str()
        );
        self.http
            .post(&url)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?
            .error_for_status()
            .with_context(|| format!("POST {url}"))?;
        Ok(())
    }

    async fn update_leader_url(&self) -> Result<String> {
        let url = format!("{}/master/redirect", self.master_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;

        let location = match response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|value| value.to_str().ok())
        {
            Some(location) => location.to_string(),
            None => {
                warn!(master_url = %self.master_url, "Master redirect returned no Location, keeping configured URL");
                return Ok(self.master_url.clone());
            }
        };

        let leader = resolve_leader_url(&self.master_url, &location)?;
        info!(leader = %leader, "Using Mesos leader");
        *self.leader_url.write().await = leader.clone();
        Ok(leader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leader_url_inherits_master_scheme_when_missing() {
        let leader =
            resolve_leader_url("https://mesos-master:5050", "//10.0.0.7:5050").unwrap();
        assert_eq!(leader, "https://10.0.0.7:5050");
    }

    #[test]
    fn leader_url_with_scheme_is_kept() {
        let leader =
            resolve_leader_url("http://mesos-master:5050", "http://10.0.0.7:5050").unwrap();
        assert_eq!(leader, "http://10.0.0.7:5050");
    }
}
