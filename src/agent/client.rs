//! Coordinator Client
//!
//! HTTP client for the coordinator API, shared by the pod agent and podctl.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::api::{AckResponse, LeaderResponse, RegisterRequest, RegisterResponse};
use crate::error::{Error, Result};

/// Pod as reported by the coordinator
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberInfo {
    pub id: String,
    #[serde(default)]
    pub address: String,
    pub last_heartbeat_at: DateTime<Utc>,
    #[serde(default)]
    pub is_leader: bool,
    #[serde(default)]
    pub is_active: bool,
}

/// Coordinator status as reported over HTTP
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusInfo {
    pub total_members: usize,
    pub active_members: usize,
    #[serde(default)]
    pub leader: Option<String>,
    #[serde(default)]
    pub capacity: usize,
    #[serde(default)]
    pub leader_changes: u64,
    #[serde(default)]
    pub members: Vec<MemberInfo>,
}

/// HTTP client for one coordinator
#[derive(Debug, Clone)]
pub struct CoordinatorClient {
    base_url: String,
    http: reqwest::Client,
}

impl CoordinatorClient {
    /// Create a client for the coordinator at `base_url`
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Coordinator base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// URL of a per-pod route; the id is percent-encoded as one path segment
    fn pod_url(&self, route: &[&str], pod_id: &str) -> Result<String> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| Error::Config(format!("Invalid coordinator URL {}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("Coordinator URL {} cannot have a path", self.base_url)))?
            .pop_if_empty()
            .extend(route)
            .push(pod_id);
        Ok(url.to_string())
    }

    /// Register a pod; returns the leader reported by the coordinator
    pub async fn register(&self, pod_id: &str, address: &str) -> Result<Option<String>> {
        let url = self.url("/coordinator/register");
        let response = self
            .http
            .post(&url)
            .json(&RegisterRequest {
                id: pod_id.to_string(),
                address: address.to_string(),
            })
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST {
            let reason = match response.json::<RegisterResponse>().await {
                Ok(body) => body.message.unwrap_or(body.status),
                Err(_) => "registration refused".to_string(),
            };
            return Err(Error::RegistrationRejected {
                pod_id: pod_id.to_string(),
                reason,
            });
        }
        if !status.is_success() {
            return Err(Error::UnexpectedStatus {
                url,
                status: status.as_u16(),
            });
        }

        let body: RegisterResponse = response.json().await?;
        Ok(body.current_leader)
    }

    /// Send a heartbeat
    pub async fn heartbeat(&self, pod_id: &str) -> Result<()> {
        let url = self.pod_url(&["coordinator", "heartbeat"], pod_id)?;
        let response = self.http.post(&url).send().await?;
        Self::expect_success(&url, response.status())?;
        let _: AckResponse = response.json().await?;
        Ok(())
    }

    /// Current leader
    pub async fn leader(&self) -> Result<Option<String>> {
        let url = self.url("/coordinator/leader");
        let response = self.http.get(&url).send().await?;
        Self::expect_success(&url, response.status())?;
        let body: LeaderResponse = response.json().await?;
        Ok(if body.has_leader { body.leader } else { None })
    }

    /// One pod's record, `None` if the coordinator does not know it
    pub async fn member(&self, pod_id: &str) -> Result<Option<MemberInfo>> {
        let url = self.pod_url(&["coordinator", "pods"], pod_id)?;
        let response = self.http.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::expect_success(&url, response.status())?;
        Ok(Some(response.json().await?))
    }

    /// All pods
    pub async fn members(&self) -> Result<Vec<MemberInfo>> {
        let url = self.url("/coordinator/pods");
        let response = self.http.get(&url).send().await?;
        Self::expect_success(&url, response.status())?;
        Ok(response.json().await?)
    }

    /// Aggregate status
    pub async fn status(&self) -> Result<StatusInfo> {
        let url = self.url("/coordinator/status");
        let response = self.http.get(&url).send().await?;
        Self::expect_success(&url, response.status())?;
        Ok(response.json().await?)
    }

    /// Remove a pod
    pub async fn unregister(&self, pod_id: &str) -> Result<()> {
        let url = self.pod_url(&["coordinator", "unregister"], pod_id)?;
        let response = self.http.delete(&url).send().await?;
        Self::expect_success(&url, response.status())
    }

    fn expect_success(url: &str, status: StatusCode) -> Result<()> {
        if status.is_success() {
            Ok(())
        } else {
            Err(Error::UnexpectedStatus {
                url: url.to_string(),
                status: status.as_u16(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tokio::net::TcpListener;

    use crate::api::HttpServer;
    use crate::config::{ApiConfig, RegistryConfig};
    use crate::coordinator::Coordinator;

    async fn spawn_coordinator() -> (String, Arc<Coordinator>) {
        let coordinator = Arc::new(Coordinator::new(RegistryConfig::default()));
        let server = HttpServer::new(ApiConfig::default(), Arc::clone(&coordinator));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { server.serve(listener).await });
        (format!("http://{}", addr), coordinator)
    }

    #[test]
    fn test_pod_url_encodes_id() {
        let client = CoordinatorClient::new("http://localhost:8080/", Duration::from_secs(1)).unwrap();

        assert_eq!(
            client.pod_url(&["coordinator", "heartbeat"], "pod-1").unwrap(),
            "http://localhost:8080/coordinator/heartbeat/pod-1"
        );
        assert_eq!(
            client.pod_url(&["coordinator", "pods"], "team/a").unwrap(),
            "http://localhost:8080/coordinator/pods/team%2Fa"
        );
        assert_eq!(
            client.pod_url(&["coordinator", "unregister"], "pod?x").unwrap(),
            "http://localhost:8080/coordinator/unregister/pod%3Fx"
        );
    }

    #[tokio::test]
    async fn test_reserved_characters_in_pod_ids() {
        let (base, coordinator) = spawn_coordinator().await;
        let client = CoordinatorClient::new(&base, Duration::from_secs(2)).unwrap();

        // A plain "pod" must not absorb calls meant for "pod?x" or "pod#1"
        client.register("pod", "http://pod").await.unwrap();

        for id in ["team/a", "pod?x", "pod#1"] {
            client.register(id, "http://localhost:8081").await.unwrap();
            client.heartbeat(id).await.unwrap();

            let member = client.member(id).await.unwrap();
            assert_eq!(member.map(|m| m.id).as_deref(), Some(id));

            client.unregister(id).await.unwrap();
            assert!(coordinator.registry().get(id).await.is_none());
            assert!(client.member(id).await.unwrap().is_none());
        }

        assert!(coordinator.registry().get("pod").await.is_some());
        assert_eq!(coordinator.members().await.len(), 1);
    }
}
