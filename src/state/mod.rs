//! State Management Module
//!
//! In-memory pod membership, the liveness sweep and leader election.

mod registry;
pub mod election;
pub mod monitor;

pub use registry::{active_leader, HeartbeatOutcome, Member, PodRegistry, RegisterOutcome, SweepReport};
pub use election::{ElectionEngine, ElectionOutcome};
pub use monitor::{HeartbeatMonitor, MonitorConfig};
