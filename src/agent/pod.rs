//! Pod Agent
//!
//! Keeps one pod registered with the coordinator: registers on startup,
//! heartbeats on a fixed interval, learns the current leader after every
//! heartbeat and re-registers whenever the registration is lost.

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::watch;

use super::client::CoordinatorClient;
use crate::config::AgentConfig;
use crate::error::{Error, Result};

/// What the agent currently believes about its pod
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatus {
    pub pod_id: String,
    pub is_leader: bool,
    pub is_registered: bool,
    pub leader: Option<String>,
}

/// Client-side agent for one pod
pub struct PodAgent {
    pod_id: String,
    advertise_url: String,
    client: CoordinatorClient,
    heartbeat_interval: Duration,
    status_tx: watch::Sender<AgentStatus>,
    shutdown_tx: watch::Sender<bool>,
}

impl PodAgent {
    /// Create an agent from configuration
    pub fn new(config: &AgentConfig) -> Result<Self> {
        let client = CoordinatorClient::new(&config.coordinator_url, config.request_timeout())?;
        Ok(Self::with_client(
            config.resolve_pod_id(),
            config.advertise_url(),
            client,
            config.heartbeat_interval(),
        ))
    }

    /// Create an agent around an existing client
    pub fn with_client(
        pod_id: String,
        advertise_url: String,
        client: CoordinatorClient,
        heartbeat_interval: Duration,
    ) -> Self {
        let (status_tx, _) = watch::channel(AgentStatus {
            pod_id: pod_id.clone(),
            is_leader: false,
            is_registered: false,
            leader: None,
        });
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            pod_id,
            advertise_url,
            client,
            heartbeat_interval,
            status_tx,
            shutdown_tx,
        }
    }

    /// This pod's id
    pub fn pod_id(&self) -> &str {
        &self.pod_id
    }

    /// Current status snapshot
    pub fn status(&self) -> AgentStatus {
        self.status_tx.borrow().clone()
    }

    /// Whether the coordinator reports this pod as leader
    pub fn is_leader(&self) -> bool {
        self.status_tx.borrow().is_leader
    }

    /// Whether the pod is registered
    pub fn is_registered(&self) -> bool {
        self.status_tx.borrow().is_registered
    }

    /// Watch status changes
    pub fn subscribe(&self) -> watch::Receiver<AgentStatus> {
        self.status_tx.subscribe()
    }

    /// Stop the run loop
    pub fn stop(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Register with the coordinator
    pub async fn register(&self) -> Result<()> {
        match self.client.register(&self.pod_id, &self.advertise_url).await {
            Ok(leader) => {
                tracing::info!(
                    "Successfully registered with coordinator. Leader: {}",
                    leader.as_deref().unwrap_or("none")
                );
                self.update(true, leader);
                Ok(())
            }
            Err(e) => {
                self.update(false, None);
                Err(e)
            }
        }
    }

    /// Run one heartbeat cycle
    pub async fn tick(&self) {
        if !self.is_registered() {
            match self.register().await {
                Ok(()) => {}
                Err(e) if e.is_retryable() => {
                    tracing::warn!("Registration failed: {}, retrying next cycle", e);
                }
                Err(e) => {
                    tracing::error!("Error registering with coordinator: {}", e);
                }
            }
            return;
        }

        if let Err(e) = self.client.heartbeat(&self.pod_id).await {
            tracing::error!("Error sending heartbeat: {}", e);
            self.update(false, None);
            return;
        }

        // The coordinator acknowledges heartbeats from pods it does not know,
        // so a coordinator restart is only visible through a lookup
        match self.client.member(&self.pod_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::warn!("Coordinator no longer knows pod {}, re-registering", self.pod_id);
                self.update(false, None);
                return;
            }
            Err(e) => {
                tracing::error!("Error checking registration: {}", e);
                self.update(false, None);
                return;
            }
        }

        match self.client.leader().await {
            Ok(leader) => self.update(true, leader),
            Err(e) => tracing::error!("Error checking leader status: {}", e),
        }
    }

    /// Heartbeat until `stop` is called, then unregister
    pub async fn run(&self) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut ticker = tokio::time::interval(self.heartbeat_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(
            "Pod agent {} started (coordinator: {}, interval: {} ms)",
            self.pod_id,
            self.client.base_url(),
            self.heartbeat_interval.as_millis()
        );

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                _ = shutdown_rx.changed() => break,
            }
        }

        if self.is_registered() {
            match self.client.unregister(&self.pod_id).await {
                Ok(()) => tracing::info!("Pod {} unregistered from coordinator", self.pod_id),
                Err(e) => tracing::warn!("Failed to unregister pod {}: {}", self.pod_id, e),
            }
            self.update(false, None);
        }

        tracing::info!("Pod agent {} stopped", self.pod_id);
    }

    fn update(&self, registered: bool, leader: Option<String>) {
        let is_leader = registered && leader.as_deref() == Some(self.pod_id.as_str());

        self.status_tx.send_if_modified(|status| {
            let was_leader = status.is_leader;
            let changed = status.is_registered != registered
                || status.is_leader != is_leader
                || status.leader != leader;

            status.is_registered = registered;
            status.is_leader = is_leader;
            status.leader = leader;

            if changed && registered && was_leader != is_leader {
                if is_leader {
                    tracing::info!("I am leader pod ({})", status.pod_id);
                } else {
                    tracing::info!(
                        "I am application pod ({}), leader: {}",
                        status.pod_id,
                        status.leader.as_deref().unwrap_or("none")
                    );
                }
            }
            changed
        });
    }
}

// ============ Status API ============

/// Router serving the agent's own status
pub fn status_router(agent: Arc<PodAgent>) -> Router {
    Router::new()
        .route("/application/status", get(handle_status))
        .route("/application/health", get(handle_health))
        .with_state(agent)
}

/// Serve the agent status API on a bound listener
pub async fn serve_status(agent: Arc<PodAgent>, listener: TcpListener) -> Result<()> {
    axum::serve(listener, status_router(agent))
        .await
        .map_err(|e| Error::Network(format!("Agent status server error: {}", e)))
}

async fn handle_status(State(agent): State<Arc<PodAgent>>) -> impl IntoResponse {
    Json(agent.status())
}

async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "UP" }))
}
