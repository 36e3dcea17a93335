//! Coordinator
//!
//! Composes the pod registry and the election engine into the operations
//! exposed to pods: register, heartbeat, unregister, leader lookup, member
//! listing and an aggregate status view.

use std::sync::Arc;

use serde::Serialize;

use crate::config::RegistryConfig;
use crate::state::{
    active_leader, ElectionEngine, HeartbeatMonitor, HeartbeatOutcome, Member, MonitorConfig, PodRegistry,
    RegisterOutcome,
};

/// Result of a registration request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// What the registry did
    pub outcome: RegisterOutcome,
    /// Leader after the follow-up election
    pub current_leader: Option<String>,
}

/// Aggregate view of the pod registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorStatus {
    pub total_members: usize,
    pub active_members: usize,
    pub leader: Option<String>,
    pub capacity: usize,
    pub leader_changes: u64,
}

/// The single authority over pod membership and leadership
pub struct Coordinator {
    registry: Arc<PodRegistry>,
    election: Arc<ElectionEngine>,
    config: RegistryConfig,
}

impl Coordinator {
    /// Create a coordinator with an empty registry
    pub fn new(config: RegistryConfig) -> Self {
        let registry = Arc::new(PodRegistry::new(config.max_members));
        let election = Arc::new(ElectionEngine::new(Arc::clone(&registry)));
        Self {
            registry,
            election,
            config,
        }
    }

    /// Build the liveness monitor for this coordinator's registry
    pub fn monitor(&self) -> HeartbeatMonitor {
        HeartbeatMonitor::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.election),
            MonitorConfig::from(&self.config),
        )
    }

    /// Shared registry handle
    pub fn registry(&self) -> Arc<PodRegistry> {
        Arc::clone(&self.registry)
    }

    /// Register a pod and settle leadership
    pub async fn register(&self, pod_id: &str, address: &str) -> Registration {
        let outcome = self.registry.register(pod_id, address).await;

        match outcome {
            RegisterOutcome::Registered => {
                tracing::info!("Pod {} registered successfully at {}", pod_id, address);
            }
            RegisterOutcome::Refreshed => {
                tracing::info!("Pod {} re-registered at {}", pod_id, address);
            }
            RegisterOutcome::Rejected { capacity } => {
                tracing::warn!(
                    "Maximum number of pods ({}) reached, cannot register pod {}",
                    capacity,
                    pod_id
                );
                return Registration {
                    outcome,
                    current_leader: self.registry.leader().await,
                };
            }
        }

        let election = self.election.elect().await;
        Registration {
            outcome,
            current_leader: election.leader().map(str::to_string),
        }
    }

    /// Record a heartbeat. A pod coming back from inactivity triggers an election.
    pub async fn heartbeat(&self, pod_id: &str) -> HeartbeatOutcome {
        let outcome = self.registry.heartbeat(pod_id).await;

        match outcome {
            HeartbeatOutcome::Refreshed => {
                tracing::debug!("Received heartbeat from pod {}", pod_id);
            }
            HeartbeatOutcome::Recovered => {
                tracing::info!("Pod {} recovered via heartbeat", pod_id);
                self.election.elect().await;
            }
            HeartbeatOutcome::UnknownMember => {
                tracing::debug!("Ignoring heartbeat from unregistered pod {}", pod_id);
            }
        }

        outcome
    }

    /// Remove a pod. Removing the leader triggers an election.
    pub async fn unregister(&self, pod_id: &str) -> Option<Member> {
        let removed = self.registry.unregister(pod_id).await;

        match &removed {
            Some(member) => {
                tracing::info!("Pod {} unregistered", pod_id);
                if member.is_leader {
                    self.election.elect().await;
                }
            }
            None => {
                tracing::debug!("Ignoring unregister for unknown pod {}", pod_id);
            }
        }

        removed
    }

    /// Current active leader
    pub async fn leader(&self) -> Option<String> {
        self.registry.leader().await
    }

    /// Copy of every registered pod, ordered by id
    pub async fn members(&self) -> Vec<Member> {
        self.registry.snapshot().await
    }

    /// Whether a pod is registered and active
    pub async fn is_active(&self, pod_id: &str) -> bool {
        self.registry.is_active(pod_id).await
    }

    /// Aggregate counts and leader
    pub async fn status(&self) -> CoordinatorStatus {
        self.status_report().await.0
    }

    /// Aggregate status and the member list, both taken from one snapshot
    pub async fn status_report(&self) -> (CoordinatorStatus, Vec<Member>) {
        let members = self.registry.snapshot().await;
        let status = CoordinatorStatus {
            total_members: members.len(),
            active_members: members.iter().filter(|m| m.is_active).count(),
            leader: active_leader(&members),
            capacity: self.registry.capacity(),
            leader_changes: self.election.leader_changes(),
        };
        (status, members)
    }
}
