//! Pod Agent Module
//!
//! The client side of coordination: an HTTP client for the coordinator API
//! and the agent loop that keeps a pod registered and tracks leadership.

mod client;
mod pod;

pub use client::{CoordinatorClient, MemberInfo, StatusInfo};
pub use pod::{serve_status, status_router, AgentStatus, PodAgent};
