//! HTTP API Module
//!
//! Provides the REST API pods and operators use to reach the coordinator.

mod http;

pub use http::{
    AckResponse, HttpServer, LeaderResponse, RegisterRequest, RegisterResponse,
};
