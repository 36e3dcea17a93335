//! Podcoord Configuration
//!
//! Configuration structures for the coordinator process and the pod agent.
//! Every section is optional; a missing file section falls back to defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main podcoord configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Registry and liveness tuning
    #[serde(default)]
    pub coordinator: RegistryConfig,

    /// HTTP API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Pod agent configuration
    #[serde(default)]
    pub agent: AgentConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Registry and liveness tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Maximum number of registered pods
    #[serde(default = "default_max_members")]
    pub max_members: usize,

    /// A pod without heartbeats for longer than this is marked inactive
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,

    /// Period of the liveness sweep
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Enable HTTP API
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// HTTP API bind address
    #[serde(default = "default_api_address")]
    pub bind_address: String,

    /// Enable CORS
    #[serde(default)]
    pub cors_enabled: bool,
}

/// Pod agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Pod identifier; generated when absent
    #[serde(default)]
    pub pod_id: Option<String>,

    /// Base URL of the coordinator
    #[serde(default = "default_coordinator_url")]
    pub coordinator_url: String,

    /// Address the agent's status API binds to
    #[serde(default = "default_agent_address")]
    pub bind_address: String,

    /// URL other pods use to reach this one (defaults to bind address)
    #[serde(default)]
    pub advertise_url: Option<String>,

    /// Heartbeat interval, must stay below the coordinator timeout
    #[serde(default = "default_agent_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Timeout for each request to the coordinator
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_max_members() -> usize {
    10
}

fn default_heartbeat_timeout_ms() -> u64 {
    5000
}

fn default_monitor_interval_ms() -> u64 {
    2000
}

fn default_true() -> bool {
    true
}

fn default_api_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_coordinator_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_agent_address() -> String {
    "0.0.0.0:8081".to_string()
}

fn default_agent_heartbeat_interval_ms() -> u64 {
    1000
}

fn default_request_timeout_ms() -> u64 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_members: default_max_members(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            monitor_interval_ms: default_monitor_interval_ms(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: default_api_address(),
            cors_enabled: false,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            pod_id: None,
            coordinator_url: default_coordinator_url(),
            bind_address: default_agent_address(),
            advertise_url: None,
            heartbeat_interval_ms: default_agent_heartbeat_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl RegistryConfig {
    /// Get heartbeat timeout as Duration
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    /// Get monitor interval as Duration
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }
}

impl AgentConfig {
    /// Pod id, generating a random one if none is configured
    pub fn resolve_pod_id(&self) -> String {
        match &self.pod_id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => format!("pod-{}", uuid::Uuid::new_v4()),
        }
    }

    /// URL advertised to the coordinator
    pub fn advertise_url(&self) -> String {
        if let Some(url) = &self.advertise_url {
            return url.clone();
        }
        // Wildcard binds are not reachable addresses
        let port = self.bind_address.rsplit(':').next().unwrap_or("8081");
        if self.bind_address.starts_with("0.0.0.0") {
            format!("http://localhost:{}", port)
        } else {
            format!("http://{}", self.bind_address)
        }
    }

    /// Get heartbeat interval as Duration
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl CoordinatorConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: CoordinatorConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.coordinator.max_members == 0 {
            return Err(crate::Error::Config(
                "coordinator.max_members must be at least 1".into(),
            ));
        }

        if self.coordinator.heartbeat_timeout_ms == 0 || self.coordinator.monitor_interval_ms == 0 {
            return Err(crate::Error::Config(
                "coordinator timeouts must be non-zero".into(),
            ));
        }

        if self.coordinator.monitor_interval_ms >= self.coordinator.heartbeat_timeout_ms {
            return Err(crate::Error::Config(format!(
                "coordinator.monitor_interval_ms ({}) must be shorter than heartbeat_timeout_ms ({})",
                self.coordinator.monitor_interval_ms, self.coordinator.heartbeat_timeout_ms
            )));
        }

        if self.agent.heartbeat_interval_ms == 0 {
            return Err(crate::Error::Config(
                "agent.heartbeat_interval_ms must be non-zero".into(),
            ));
        }

        if self.agent.heartbeat_interval_ms >= self.coordinator.heartbeat_timeout_ms {
            return Err(crate::Error::Config(format!(
                "agent.heartbeat_interval_ms ({}) must be shorter than coordinator.heartbeat_timeout_ms ({})",
                self.agent.heartbeat_interval_ms, self.coordinator.heartbeat_timeout_ms
            )));
        }

        if self.api.bind_address.is_empty() {
            return Err(crate::Error::Config("api.bind_address cannot be empty".into()));
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(crate::Error::Config(format!(
                "logging.format must be \"pretty\" or \"json\", got \"{}\"",
                self.logging.format
            )));
        }

        Ok(())
    }
}
