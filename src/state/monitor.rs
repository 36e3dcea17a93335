//! Heartbeat Monitor
//!
//! Periodic liveness sweep over the pod registry. Each sweep reclassifies
//! pods as active or inactive and runs at most one election afterwards.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::config::RegistryConfig;
use crate::state::{ElectionEngine, ElectionOutcome, PodRegistry, SweepReport};

/// Monitor configuration
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Interval between sweeps
    pub interval: Duration,
    /// Pods silent for longer than this are marked inactive
    pub heartbeat_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            heartbeat_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&RegistryConfig> for MonitorConfig {
    fn from(config: &RegistryConfig) -> Self {
        Self {
            interval: config.monitor_interval(),
            heartbeat_timeout: config.heartbeat_timeout(),
        }
    }
}

/// Background liveness sweep
pub struct HeartbeatMonitor {
    registry: Arc<PodRegistry>,
    election: Arc<ElectionEngine>,
    config: MonitorConfig,
    running: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
}

impl HeartbeatMonitor {
    /// Create a new monitor
    pub fn new(
        registry: Arc<PodRegistry>,
        election: Arc<ElectionEngine>,
        config: MonitorConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            registry,
            election,
            config,
            running: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    /// Check if the loop is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the loop after the current sweep
    pub fn stop(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Run one sweep now
    pub async fn check_once(&self) -> (SweepReport, Option<ElectionOutcome>) {
        self.check_at(Instant::now()).await
    }

    /// Run one sweep as if the clock read `now`
    pub async fn check_at(&self, now: Instant) -> (SweepReport, Option<ElectionOutcome>) {
        let report = self
            .registry
            .sweep(now, self.config.heartbeat_timeout)
            .await;

        // One election per sweep, however many pods changed
        let outcome = if report.needs_election() {
            Some(self.election.elect().await)
        } else {
            None
        };

        (report, outcome)
    }

    /// Run sweeps until `stop` is called
    pub async fn run(&self) {
        self.running.store(true, Ordering::SeqCst);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(
            "Heartbeat monitor started (interval: {} ms, timeout: {} ms)",
            self.config.interval.as_millis(),
            self.config.heartbeat_timeout.as_millis()
        );

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    let (report, outcome) = self.check_once().await;
                    if !report.deactivated.is_empty() || !report.recovered.is_empty() {
                        tracing::debug!(
                            "Sweep: {} deactivated, {} recovered, leader: {:?}",
                            report.deactivated.len(),
                            report.recovered.len(),
                            outcome.as_ref().and_then(|o| o.leader())
                        );
                    }
                }
                _ = shutdown_rx.changed() => {
                    tracing::info!("Heartbeat monitor shutting down");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup(ids: &[&str]) -> (Arc<PodRegistry>, Arc<ElectionEngine>, HeartbeatMonitor) {
        let registry = Arc::new(PodRegistry::new(10));
        for id in ids {
            registry.register(id, "http://localhost").await;
        }
        let election = Arc::new(ElectionEngine::new(Arc::clone(&registry)));
        election.elect().await;

        let monitor = HeartbeatMonitor::new(
            Arc::clone(&registry),
            Arc::clone(&election),
            MonitorConfig {
                interval: Duration::from_millis(20),
                heartbeat_timeout: Duration::from_secs(5),
            },
        );
        (registry, election, monitor)
    }

    #[tokio::test]
    async fn test_stale_leader_is_replaced_by_next_smallest() {
        let (registry, _election, monitor) = setup(&["a", "b", "c"]).await;
        assert_eq!(registry.leader().await.as_deref(), Some("a"));

        let later = Instant::now() + Duration::from_secs(6);
        // b and c keep heartbeating; only a goes silent
        registry
            .with_members_mut(|m| {
                for id in ["b", "c"] {
                    m.get_mut(id).unwrap().touch_at(later);
                }
            })
            .await;

        let (report, outcome) = monitor.check_at(later).await;
        assert_eq!(report.deactivated, ["a"]);
        assert!(report.leader_lost);
        assert_eq!(outcome.unwrap().leader(), Some("b"));
        assert_eq!(registry.leader().await.as_deref(), Some("b"));
        assert!(!registry.is_active("a").await);
    }

    #[tokio::test]
    async fn test_losing_follower_triggers_no_election() {
        let (registry, election, monitor) = setup(&["a", "b"]).await;
        let later = Instant::now() + Duration::from_secs(6);
        registry
            .with_members_mut(|m| m.get_mut("a").unwrap().touch_at(later))
            .await;

        let (report, outcome) = monitor.check_at(later).await;
        assert_eq!(report.deactivated, ["b"]);
        assert!(outcome.is_none());
        assert_eq!(election.leader_changes(), 1);
    }

    #[tokio::test]
    async fn test_recovery_does_not_flap_leadership() {
        let (registry, _election, monitor) = setup(&["a", "b"]).await;

        // a goes stale, b takes over
        let later = Instant::now() + Duration::from_secs(6);
        registry
            .with_members_mut(|m| m.get_mut("b").unwrap().touch_at(later))
            .await;
        monitor.check_at(later).await;
        assert_eq!(registry.leader().await.as_deref(), Some("b"));

        // a's heartbeat lands but it is still flagged inactive when the sweep runs
        registry
            .with_members_mut(|m| {
                let a = m.get_mut("a").unwrap();
                a.touch_at(later);
                a.is_active = false;
            })
            .await;

        let (report, outcome) = monitor.check_at(later).await;
        assert_eq!(report.recovered, ["a"]);
        assert_eq!(
            outcome,
            Some(ElectionOutcome::Retained { leader: "b".into() })
        );
        assert!(registry.is_active("a").await);
        assert_eq!(registry.leader().await.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_everyone_stale_reports_no_leader() {
        let (registry, _election, monitor) = setup(&["a", "b"]).await;

        let later = Instant::now() + Duration::from_secs(60);
        let (report, outcome) = monitor.check_at(later).await;
        assert_eq!(report.deactivated, ["a", "b"]);
        assert_eq!(outcome, Some(ElectionOutcome::NoActiveMembers));
        assert!(registry.leader().await.is_none());
    }

    #[tokio::test]
    async fn test_run_and_stop() {
        let (_registry, _election, monitor) = setup(&["a"]).await;
        let monitor = Arc::new(monitor);

        let runner = Arc::clone(&monitor);
        let handle = tokio::spawn(async move { runner.run().await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(monitor.is_running());

        monitor.stop();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("monitor did not stop")
            .unwrap();
        assert!(!monitor.is_running());
    }
}
