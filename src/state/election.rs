//! Leader Election
//!
//! Deterministic leader selection over the pod registry. There is no voting
//! and no term exchange: the registry is the single source of truth, so the
//! smallest active pod id wins and an active leader is never displaced.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::state::{Member, PodRegistry};

/// Result of one election run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElectionOutcome {
    /// No pod is active; leadership left unset
    NoActiveMembers,
    /// The current leader is still active
    Retained { leader: String },
    /// A new leader was chosen
    Elected {
        leader: String,
        previous: Option<String>,
        candidates: usize,
    },
}

impl ElectionOutcome {
    /// Leader after this election, if any
    pub fn leader(&self) -> Option<&str> {
        match self {
            ElectionOutcome::NoActiveMembers => None,
            ElectionOutcome::Retained { leader } => Some(leader),
            ElectionOutcome::Elected { leader, .. } => Some(leader),
        }
    }

    /// Whether leadership changed hands
    pub fn changed(&self) -> bool {
        matches!(self, ElectionOutcome::Elected { .. })
    }
}

/// Serializes leader elections over a shared registry
pub struct ElectionEngine {
    /// Pod registry
    registry: Arc<PodRegistry>,
    /// Held for the whole read-decide-write sequence
    lock: Mutex<()>,
    /// Number of times leadership changed hands
    leader_changes: AtomicU64,
}

impl ElectionEngine {
    /// Create an election engine over a registry
    pub fn new(registry: Arc<PodRegistry>) -> Self {
        Self {
            registry,
            lock: Mutex::new(()),
            leader_changes: AtomicU64::new(0),
        }
    }

    /// Number of leadership changes since startup
    pub fn leader_changes(&self) -> u64 {
        self.leader_changes.load(Ordering::Relaxed)
    }

    /// Recompute the leader. Idempotent and safe to call from any task.
    pub async fn elect(&self) -> ElectionOutcome {
        let _guard = self.lock.lock().await;
        let outcome = self.registry.with_members_mut(decide).await;

        match &outcome {
            ElectionOutcome::NoActiveMembers => {
                tracing::warn!("No active pods available for leader election");
            }
            ElectionOutcome::Retained { leader } => {
                tracing::debug!("Current leader {} is still active, no re-election needed", leader);
            }
            ElectionOutcome::Elected {
                leader,
                previous,
                candidates,
            } => {
                self.leader_changes.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    "New leader elected: {} from {} active pod(s) (previous: {})",
                    leader,
                    candidates,
                    previous.as_deref().unwrap_or("none")
                );
            }
        }

        outcome
    }
}

/// Decide and apply leadership on an exclusively held pod table
fn decide(members: &mut HashMap<String, Member>) -> ElectionOutcome {
    let mut active: Vec<&Member> = members.values().filter(|m| m.is_active).collect();
    active.sort_by(|a, b| a.id.cmp(&b.id));

    let Some(first) = active.first() else {
        return ElectionOutcome::NoActiveMembers;
    };

    if let Some(current) = active.iter().find(|m| m.is_leader) {
        return ElectionOutcome::Retained {
            leader: current.id.clone(),
        };
    }

    let leader = first.id.clone();
    let candidates = active.len();
    let previous = members
        .values()
        .filter(|m| m.is_leader)
        .map(|m| m.id.clone())
        .min();

    for member in members.values_mut() {
        member.is_leader = false;
    }
    if let Some(member) = members.get_mut(&leader) {
        member.is_leader = true;
    }

    ElectionOutcome::Elected {
        leader,
        previous,
        candidates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn registry_with(ids: &[&str]) -> Arc<PodRegistry> {
        let registry = Arc::new(PodRegistry::new(10));
        for id in ids {
            registry.register(id, "http://localhost").await;
        }
        registry
    }

    async fn set_active(registry: &PodRegistry, id: &str, active: bool) {
        let id = id.to_string();
        registry
            .with_members_mut(move |m| m.get_mut(&id).unwrap().is_active = active)
            .await;
    }

    async fn leader_flags(registry: &PodRegistry) -> Vec<String> {
        registry
            .snapshot()
            .await
            .into_iter()
            .filter(|m| m.is_leader)
            .map(|m| m.id)
            .collect()
    }

    #[tokio::test]
    async fn test_smallest_active_id_wins() {
        let registry = registry_with(&["b", "a", "c"]).await;
        let engine = ElectionEngine::new(Arc::clone(&registry));

        let outcome = engine.elect().await;
        assert_eq!(
            outcome,
            ElectionOutcome::Elected {
                leader: "a".into(),
                previous: None,
                candidates: 3,
            }
        );
        assert_eq!(registry.leader().await.as_deref(), Some("a"));
        assert_eq!(engine.leader_changes(), 1);
    }

    #[tokio::test]
    async fn test_empty_registry_has_no_leader() {
        let registry = registry_with(&[]).await;
        let engine = ElectionEngine::new(Arc::clone(&registry));

        assert_eq!(engine.elect().await, ElectionOutcome::NoActiveMembers);
        assert!(registry.leader().await.is_none());
    }

    #[tokio::test]
    async fn test_election_is_idempotent() {
        let registry = registry_with(&["a", "b"]).await;
        let engine = ElectionEngine::new(Arc::clone(&registry));

        engine.elect().await;
        let outcome = engine.elect().await;
        assert_eq!(outcome, ElectionOutcome::Retained { leader: "a".into() });
        assert!(!outcome.changed());
        assert_eq!(engine.leader_changes(), 1);
    }

    #[tokio::test]
    async fn test_active_leader_is_not_displaced_by_smaller_id() {
        let registry = registry_with(&["b", "c"]).await;
        let engine = ElectionEngine::new(Arc::clone(&registry));
        engine.elect().await;

        registry.register("a", "http://localhost").await;
        let outcome = engine.elect().await;
        assert_eq!(outcome.leader(), Some("b"));
        assert_eq!(leader_flags(&registry).await, ["b"]);
    }

    #[tokio::test]
    async fn test_inactive_leader_is_replaced() {
        let registry = registry_with(&["a", "b", "c"]).await;
        let engine = ElectionEngine::new(Arc::clone(&registry));
        engine.elect().await;

        set_active(&registry, "a", false).await;
        let outcome = engine.elect().await;
        assert_eq!(
            outcome,
            ElectionOutcome::Elected {
                leader: "b".into(),
                previous: Some("a".into()),
                candidates: 2,
            }
        );
        assert_eq!(leader_flags(&registry).await, ["b"]);
    }

    #[tokio::test]
    async fn test_all_inactive_keeps_stale_flag_but_reports_no_leader() {
        let registry = registry_with(&["a"]).await;
        let engine = ElectionEngine::new(Arc::clone(&registry));
        engine.elect().await;

        set_active(&registry, "a", false).await;
        assert_eq!(engine.elect().await, ElectionOutcome::NoActiveMembers);
        assert!(registry.leader().await.is_none());
        assert_eq!(leader_flags(&registry).await, ["a"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_elections_agree() {
        let registry = registry_with(&["d", "c", "b", "a", "e"]).await;
        let engine = Arc::new(ElectionEngine::new(Arc::clone(&registry)));

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move { engine.elect().await })
            })
            .collect();

        let mut changed = 0;
        for handle in handles {
            let outcome = handle.await.unwrap();
            assert_eq!(outcome.leader(), Some("a"));
            if outcome.changed() {
                changed += 1;
            }
        }

        assert_eq!(changed, 1);
        assert_eq!(leader_flags(&registry).await, ["a"]);
    }
}
