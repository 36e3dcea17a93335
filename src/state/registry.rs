//! Pod Registry
//!
//! Owns every registered pod's record. Callers only ever receive copies;
//! mutation goes through the registry's methods or, for the election engine,
//! through a closure run under the registry's write guard.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

/// State of a single registered pod
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    /// Unique pod identifier, also the election sort key
    pub id: String,
    /// Address callers use to reach the pod (not interpreted)
    pub address: String,
    /// Wall-clock time of the last accepted heartbeat
    pub last_heartbeat_at: DateTime<Utc>,
    /// When the pod registered
    pub registered_at: DateTime<Utc>,
    /// Whether the pod holds leadership
    pub is_leader: bool,
    /// Whether the pod's heartbeats are recent
    pub is_active: bool,
    /// Monotonic time of the last heartbeat (not serialized)
    #[serde(skip)]
    last_seen: Instant,
}

impl Member {
    /// Create a freshly registered, active, non-leader pod
    pub fn new(id: String, address: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            address,
            last_heartbeat_at: now,
            registered_at: now,
            is_leader: false,
            is_active: true,
            last_seen: Instant::now(),
        }
    }

    /// Record a heartbeat
    pub(crate) fn touch(&mut self) {
        self.touch_at(Instant::now());
    }

    /// Record a heartbeat observed at `at`
    pub(crate) fn touch_at(&mut self, at: Instant) {
        self.last_heartbeat_at = Utc::now();
        self.last_seen = at;
        self.is_active = true;
    }

    /// Time between the last heartbeat and `now`
    pub fn elapsed_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen)
    }
}

/// Result of a registration attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// A new record was created
    Registered,
    /// The id was already registered; its record was refreshed
    Refreshed,
    /// The registry is full
    Rejected { capacity: usize },
}

impl RegisterOutcome {
    /// Whether the pod is registered after this call
    pub fn is_accepted(&self) -> bool {
        !matches!(self, RegisterOutcome::Rejected { .. })
    }
}

/// Result of a heartbeat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// Heartbeat recorded for an active pod
    Refreshed,
    /// Heartbeat recorded for a pod that was inactive
    Recovered,
    /// No pod with this id is registered
    UnknownMember,
}

/// What a liveness sweep changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Pods marked inactive by this sweep
    pub deactivated: Vec<String>,
    /// Pods marked active again by this sweep
    pub recovered: Vec<String>,
    /// Whether a deactivated pod held leadership
    pub leader_lost: bool,
}

impl SweepReport {
    /// Whether leadership may have to change
    pub fn needs_election(&self) -> bool {
        self.leader_lost || !self.recovered.is_empty()
    }
}

/// The flagged, active member with the smallest id
pub fn active_leader<'a>(members: impl IntoIterator<Item = &'a Member>) -> Option<String> {
    members
        .into_iter()
        .filter(|m| m.is_leader && m.is_active)
        .map(|m| &m.id)
        .min()
        .cloned()
}

/// Capacity-bounded, concurrency-safe pod table
pub struct PodRegistry {
    members: RwLock<HashMap<String, Member>>,
    capacity: usize,
}

impl PodRegistry {
    /// Create an empty registry holding at most `capacity` pods
    pub fn new(capacity: usize) -> Self {
        Self {
            members: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Maximum number of pods
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Register a pod. The capacity check and insert happen under one guard.
    ///
    /// An id that is already registered is refreshed in place and never
    /// rejected, even when the registry is full: it takes no new slot, and a
    /// pod whose registration response was lost must be able to retry.
    pub async fn register(&self, id: &str, address: &str) -> RegisterOutcome {
        let mut members = self.members.write().await;

        if let Some(existing) = members.get_mut(id) {
            existing.address = address.to_string();
            existing.touch();
            return RegisterOutcome::Refreshed;
        }

        if members.len() >= self.capacity {
            return RegisterOutcome::Rejected {
                capacity: self.capacity,
            };
        }

        members.insert(
            id.to_string(),
            Member::new(id.to_string(), address.to_string()),
        );
        RegisterOutcome::Registered
    }

    /// Record a heartbeat. Unknown ids are reported, not treated as errors.
    pub async fn heartbeat(&self, id: &str) -> HeartbeatOutcome {
        let mut members = self.members.write().await;
        match members.get_mut(id) {
            Some(member) => {
                let was_active = member.is_active;
                member.touch();
                if was_active {
                    HeartbeatOutcome::Refreshed
                } else {
                    HeartbeatOutcome::Recovered
                }
            }
            None => HeartbeatOutcome::UnknownMember,
        }
    }

    /// Remove a pod, returning its last state
    pub async fn unregister(&self, id: &str) -> Option<Member> {
        self.members.write().await.remove(id)
    }

    /// Point-in-time copy of all pods, ordered by id
    pub async fn snapshot(&self) -> Vec<Member> {
        let members = self.members.read().await;
        let mut snapshot: Vec<Member> = members.values().cloned().collect();
        snapshot.sort_by(|a, b| a.id.cmp(&b.id));
        snapshot
    }

    /// Get a copy of one pod
    pub async fn get(&self, id: &str) -> Option<Member> {
        self.members.read().await.get(id).cloned()
    }

    /// Id of the active leader. Ties resolve to the smallest id.
    pub async fn leader(&self) -> Option<String> {
        active_leader(self.members.read().await.values())
    }

    /// Whether a pod is registered and active
    pub async fn is_active(&self, id: &str) -> bool {
        self.members
            .read()
            .await
            .get(id)
            .map(|m| m.is_active)
            .unwrap_or(false)
    }

    /// Number of registered pods
    pub async fn len(&self) -> usize {
        self.members.read().await.len()
    }

    /// Whether no pods are registered
    pub async fn is_empty(&self) -> bool {
        self.members.read().await.is_empty()
    }

    /// Number of active pods
    pub async fn active_count(&self) -> usize {
        self.members
            .read()
            .await
            .values()
            .filter(|m| m.is_active)
            .count()
    }

    /// Reclassify every pod by heartbeat recency as of `now`
    pub async fn sweep(&self, now: Instant, timeout: Duration) -> SweepReport {
        let mut members = self.members.write().await;
        let mut report = SweepReport::default();

        for (id, member) in members.iter_mut() {
            let elapsed = member.elapsed_at(now);

            if elapsed > timeout {
                if member.is_active {
                    tracing::warn!(
                        "Pod {} has not sent a heartbeat for {} ms, marking inactive",
                        id,
                        elapsed.as_millis()
                    );
                    member.is_active = false;
                    report.deactivated.push(id.clone());

                    if member.is_leader {
                        tracing::warn!("Leader pod {} is inactive, re-election needed", id);
                        report.leader_lost = true;
                    }
                }
            } else if !member.is_active {
                tracing::info!("Pod {} recovered, reactivating", id);
                member.is_active = true;
                report.recovered.push(id.clone());
            }
        }

        report.deactivated.sort();
        report.recovered.sort();
        report
    }

    /// Run `f` with exclusive access to the pod table
    pub(crate) async fn with_members_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut HashMap<String, Member>) -> R,
    {
        let mut members = self.members.write().await;
        f(&mut members)
    }
}
