//! Podcoord - Centralized Leader Election for Pod Fleets
//!
//! A single coordinator process tracks a fleet of worker pods through
//! periodic heartbeats and deterministically elects exactly one leader
//! among the pods that are currently alive.
//!
//! # Architecture
//!
//! Pods register with the coordinator, heartbeat on a fixed interval and
//! ask who the leader is. The coordinator owns an in-memory registry, sweeps
//! it periodically to mark silent pods inactive, and re-runs a serialized
//! election whenever leadership could change. The smallest active pod id
//! wins, and a healthy leader is never displaced.
//!
//! # Features
//!
//! - Capacity-bounded pod registry safe under concurrent access
//! - Heartbeat staleness detection with automatic failover
//! - Deterministic, serialized leader election
//! - HTTP API for registration, heartbeats and status
//! - Pod agent with automatic re-registration
//!
//! The coordinator keeps no persistent state; a restart forgets every pod.

pub mod config;
pub mod error;
pub mod state;
pub mod coordinator;
pub mod api;
pub mod agent;

pub use config::CoordinatorConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::CoordinatorConfig;
    pub use crate::error::{Error, Result};
    pub use crate::coordinator::{Coordinator, CoordinatorStatus, Registration};
    pub use crate::state::{ElectionEngine, HeartbeatMonitor, Member, PodRegistry};
    pub use crate::agent::{CoordinatorClient, PodAgent};
}
