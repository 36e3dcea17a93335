//! HTTP API Server
//!
//! REST API over the coordinator: registration, heartbeats, leader lookup,
//! membership listing and status.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::coordinator::{Coordinator, CoordinatorStatus};
use crate::error::{Error, Result};
use crate::state::Member;

/// Shared application state
pub struct AppState {
    /// The coordinator behind every route
    pub coordinator: Arc<Coordinator>,
    /// Server start time
    pub started_at: Instant,
}

/// HTTP API server
pub struct HttpServer {
    config: ApiConfig,
    state: Arc<AppState>,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(config: ApiConfig, coordinator: Arc<Coordinator>) -> Self {
        let state = Arc::new(AppState {
            coordinator,
            started_at: Instant::now(),
        });

        Self { config, state }
    }

    /// Create the router
    pub fn router(&self) -> Router {
        let router = Router::new()
            .route("/coordinator/register", post(handle_register))
            .route("/coordinator/heartbeat/:pod_id", post(handle_heartbeat))
            .route("/coordinator/leader", get(handle_leader))
            .route("/coordinator/pods", get(handle_pods))
            .route("/coordinator/pods/:pod_id", get(handle_pod_info))
            .route("/coordinator/unregister/:pod_id", delete(handle_unregister))
            .route("/coordinator/status", get(handle_status))
            .route("/health", get(handle_health))
            .with_state(Arc::clone(&self.state))
            .layer(TraceLayer::new_for_http());

        if self.config.cors_enabled {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    /// Start the HTTP server on the configured address
    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            tracing::info!("HTTP API disabled");
            return Ok(());
        }

        let listener = TcpListener::bind(&self.config.bind_address).await?;
        tracing::info!("HTTP API listening on {}", self.config.bind_address);

        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        axum::serve(listener, self.router())
            .await
            .map_err(|e| Error::Network(format!("HTTP server error: {}", e)))
    }
}

// ============ Request/Response Types ============

/// Register request
#[derive(Debug, Deserialize, Serialize)]
pub struct RegisterRequest {
    #[serde(alias = "podId")]
    pub id: String,
    #[serde(alias = "url")]
    pub address: String,
}

/// Register response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    /// "registered" or "failed"
    pub status: String,
    pub current_leader: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Acknowledgement for fire-and-forget operations
#[derive(Debug, Serialize, Deserialize)]
pub struct AckResponse {
    pub status: String,
}

/// Leader response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderResponse {
    pub has_leader: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leader: Option<String>,
}

/// Status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub status: CoordinatorStatus,
    pub members: Vec<Member>,
}

/// Health response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    pub role: String,
    pub uptime_seconds: u64,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// ============ Handlers ============

async fn handle_register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    if req.id.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Pod id cannot be empty".to_string(),
                code: "INVALID_POD_ID".to_string(),
            }),
        )
            .into_response();
    }

    let registration = state.coordinator.register(&req.id, &req.address).await;

    if registration.outcome.is_accepted() {
        Json(RegisterResponse {
            status: "registered".to_string(),
            current_leader: registration.current_leader,
            message: None,
        })
        .into_response()
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(RegisterResponse {
                status: "failed".to_string(),
                current_leader: registration.current_leader,
                message: Some("Registration failed - maximum pods reached".to_string()),
            }),
        )
            .into_response()
    }
}

async fn handle_heartbeat(
    State(state): State<Arc<AppState>>,
    Path(pod_id): Path<String>,
) -> impl IntoResponse {
    // Unknown pods are acknowledged as well
    state.coordinator.heartbeat(&pod_id).await;
    Json(AckResponse {
        status: "ok".to_string(),
    })
}

async fn handle_leader(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let leader = state.coordinator.leader().await;
    Json(LeaderResponse {
        has_leader: leader.is_some(),
        leader,
    })
}

async fn handle_pods(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.coordinator.members().await)
}

async fn handle_pod_info(
    State(state): State<Arc<AppState>>,
    Path(pod_id): Path<String>,
) -> impl IntoResponse {
    match state.coordinator.registry().get(&pod_id).await {
        Some(member) => Json(member).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Pod {} not found", pod_id),
                code: "POD_NOT_FOUND".to_string(),
            }),
        )
            .into_response(),
    }
}

async fn handle_unregister(
    State(state): State<Arc<AppState>>,
    Path(pod_id): Path<String>,
) -> impl IntoResponse {
    state.coordinator.unregister(&pod_id).await;
    Json(AckResponse {
        status: "unregistered".to_string(),
    })
}

async fn handle_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, members) = state.coordinator.status_report().await;
    Json(StatusResponse { status, members })
}

async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        healthy: true,
        role: "coordinator".to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegistryConfig;

    async fn spawn_server(max_members: usize) -> (String, Arc<Coordinator>) {
        let coordinator = Arc::new(Coordinator::new(RegistryConfig {
            max_members,
            ..Default::default()
        }));
        let server = HttpServer::new(ApiConfig::default(), Arc::clone(&coordinator));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { server.serve(listener).await });

        (format!("http://{}", addr), coordinator)
    }

    async fn register(client: &reqwest::Client, base: &str, id: &str) -> reqwest::Response {
        client
            .post(format!("{}/coordinator/register", base))
            .json(&serde_json::json!({ "podId": id, "url": format!("http://{}", id) }))
            .send()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_register_and_get_leader() {
        let (base, _coordinator) = spawn_server(10).await;
        let client = reqwest::Client::new();

        let response = register(&client, &base, "pod-a").await;
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let body: RegisterResponse = response.json().await.unwrap();
        assert_eq!(body.status, "registered");
        assert_eq!(body.current_leader.as_deref(), Some("pod-a"));

        let leader: LeaderResponse = client
            .get(format!("{}/coordinator/leader", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(leader.has_leader);
        assert_eq!(leader.leader.as_deref(), Some("pod-a"));
    }

    #[tokio::test]
    async fn test_register_over_capacity_is_rejected() {
        let (base, coordinator) = spawn_server(1).await;
        let client = reqwest::Client::new();

        register(&client, &base, "pod-a").await;
        let response = register(&client, &base, "pod-b").await;
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

        let body: RegisterResponse = response.json().await.unwrap();
        assert_eq!(body.status, "failed");
        assert!(body.message.is_some());
        assert_eq!(coordinator.members().await.len(), 1);
    }

    #[tokio::test]
    async fn test_register_accepts_id_and_address_fields() {
        let (base, coordinator) = spawn_server(10).await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{}/coordinator/register", base))
            .json(&serde_json::json!({ "id": "pod-x", "address": "10.0.0.5:9000" }))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());

        let member = coordinator.registry().get("pod-x").await.unwrap();
        assert_eq!(member.address, "10.0.0.5:9000");
    }

    #[tokio::test]
    async fn test_register_rejects_empty_id() {
        let (base, _coordinator) = spawn_server(10).await;
        let client = reqwest::Client::new();

        let response = register(&client, &base, " ").await;
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_heartbeat_acknowledges_unknown_pod() {
        let (base, coordinator) = spawn_server(10).await;
        let client = reqwest::Client::new();

        let ack: AckResponse = client
            .post(format!("{}/coordinator/heartbeat/ghost", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(ack.status, "ok");
        assert!(coordinator.members().await.is_empty());
    }

    #[tokio::test]
    async fn test_list_pods_and_status() {
        let (base, _coordinator) = spawn_server(10).await;
        let client = reqwest::Client::new();
        for id in ["pod-b", "pod-a"] {
            register(&client, &base, id).await;
        }

        let pods: serde_json::Value = client
            .get(format!("{}/coordinator/pods", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let pods = pods.as_array().unwrap();
        assert_eq!(pods.len(), 2);
        assert_eq!(pods[0]["id"], "pod-a");
        assert_eq!(pods[0]["address"], "http://pod-a");
        assert_eq!(pods[0]["isActive"], true);
        assert_eq!(pods[1]["isLeader"], true);
        assert!(pods[0]["lastHeartbeatAt"].is_string());

        let status: serde_json::Value = client
            .get(format!("{}/coordinator/status", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["totalMembers"], 2);
        assert_eq!(status["activeMembers"], 2);
        assert_eq!(status["leader"], "pod-b");
        assert_eq!(status["members"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_pod_info_not_found() {
        let (base, _coordinator) = spawn_server(10).await;
        let response = reqwest::get(format!("{}/coordinator/pods/nope", base))
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unregister_leader_leaves_no_leader() {
        let (base, _coordinator) = spawn_server(10).await;
        let client = reqwest::Client::new();
        register(&client, &base, "pod-a").await;

        let ack: AckResponse = client
            .delete(format!("{}/coordinator/unregister/pod-a", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(ack.status, "unregistered");

        let leader: LeaderResponse = client
            .get(format!("{}/coordinator/leader", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(!leader.has_leader);
        assert!(leader.leader.is_none());
    }

    #[tokio::test]
    async fn test_health() {
        let (base, _coordinator) = spawn_server(10).await;
        let health: serde_json::Value = reqwest::get(format!("{}/health", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["healthy"], true);
        assert_eq!(health["role"], "coordinator");
    }
}
