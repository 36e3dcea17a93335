//! Podcoord - Centralized Leader Election for Pod Fleets
//!
//! Runs either the coordinator or a pod agent.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use podcoord::agent::{serve_status, CoordinatorClient, PodAgent};
use podcoord::api::HttpServer;
use podcoord::config::CoordinatorConfig;
use podcoord::coordinator::Coordinator;
use podcoord::error::{Error, Result};

/// Podcoord - Centralized Leader Election for Pod Fleets
#[derive(Parser)]
#[command(name = "podcoord")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "podcoord.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error), overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the coordinator
    Coordinator {
        /// HTTP API bind address (overrides config)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Run a pod agent against a coordinator
    Agent {
        /// Pod id (overrides config)
        #[arg(long)]
        pod_id: Option<String>,

        /// Coordinator base URL (overrides config)
        #[arg(long)]
        coordinator: Option<String>,

        /// Agent status API bind address (overrides config)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Query a running coordinator's status
    Status {
        /// Coordinator base URL
        #[arg(short, long, default_value = "http://localhost:8080")]
        address: String,
    },

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "podcoord.toml")]
        output: PathBuf,

        /// Pod id for the agent section
        #[arg(long, default_value = "pod-1")]
        pod_id: String,
    },

    /// Validate configuration file
    Validate,

    /// Show effective configuration
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { output, pod_id } => run_init(output, pod_id),
        Commands::Validate => run_validate(&cli.config),
        Commands::Info => run_info(&cli.config),
        Commands::Status { address } => run_status(address).await,
        Commands::Coordinator { bind } => {
            let mut config = load_config(&cli.config)?;
            init_logging(cli.log_level.as_deref().unwrap_or(&config.logging.level), &config.logging.format);
            if let Some(bind) = bind {
                config.api.bind_address = bind;
            }
            run_coordinator(config).await
        }
        Commands::Agent { pod_id, coordinator, bind } => {
            let mut config = load_config(&cli.config)?;
            init_logging(cli.log_level.as_deref().unwrap_or(&config.logging.level), &config.logging.format);
            if pod_id.is_some() {
                config.agent.pod_id = pod_id;
            }
            if let Some(url) = coordinator {
                config.agent.coordinator_url = url;
            }
            if let Some(bind) = bind {
                config.agent.bind_address = bind;
            }
            run_agent(config).await
        }
    }
}

/// Initialize logging
fn init_logging(level: &str, format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Load the config file, falling back to defaults when it does not exist
fn load_config(path: &Path) -> Result<CoordinatorConfig> {
    if !path.exists() {
        eprintln!("Config file {:?} not found, using defaults", path);
        return Ok(CoordinatorConfig::default());
    }

    CoordinatorConfig::from_file(path).map_err(|e| {
        eprintln!("Failed to load configuration from {:?}: {}", path, e);
        e
    })
}

/// Run the coordinator until Ctrl+C
async fn run_coordinator(config: CoordinatorConfig) -> Result<()> {
    tracing::info!(
        "Starting coordinator (max pods: {}, heartbeat timeout: {} ms, sweep every {} ms)",
        config.coordinator.max_members,
        config.coordinator.heartbeat_timeout_ms,
        config.coordinator.monitor_interval_ms
    );

    let coordinator = Arc::new(Coordinator::new(config.coordinator.clone()));
    let monitor = Arc::new(coordinator.monitor());
    let http_server = HttpServer::new(config.api.clone(), Arc::clone(&coordinator));

    let monitor_task = Arc::clone(&monitor);
    let monitor_handle = tokio::spawn(async move { monitor_task.run().await });

    let result = tokio::select! {
        result = http_server.start() => {
            if let Err(e) = &result {
                tracing::error!("HTTP server error: {}", e);
            }
            result
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
            Ok(())
        }
    };

    // A disabled API returns immediately; keep sweeping until Ctrl+C
    if result.is_ok() && !config.api.enabled {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Received shutdown signal");
    }

    monitor.stop();
    let _ = monitor_handle.await;
    tracing::info!("Coordinator stopped");
    result
}

/// Run a pod agent until Ctrl+C
async fn run_agent(config: CoordinatorConfig) -> Result<()> {
    let agent = Arc::new(PodAgent::new(&config.agent)?);
    tracing::info!(
        "Starting pod agent {} advertising {}",
        agent.pod_id(),
        config.agent.advertise_url()
    );

    let listener = tokio::net::TcpListener::bind(&config.agent.bind_address).await?;
    tracing::info!("Agent status API listening on {}", config.agent.bind_address);
    let status_agent = Arc::clone(&agent);
    let status_handle = tokio::spawn(async move {
        if let Err(e) = serve_status(status_agent, listener).await {
            tracing::error!("{}", e);
        }
    });

    let runner = Arc::clone(&agent);
    let agent_handle = tokio::spawn(async move { runner.run().await });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal");

    agent.stop();
    agent_handle
        .await
        .map_err(|e| Error::Internal(format!("agent task failed: {}", e)))?;
    status_handle.abort();
    Ok(())
}

/// Check coordinator status
async fn run_status(address: String) -> Result<()> {
    let client = CoordinatorClient::new(&address, std::time::Duration::from_secs(5))?;

    match client.status().await {
        Ok(status) => {
            println!("Pods:    {} total, {} active", status.total_members, status.active_members);
            println!("Leader:  {}", status.leader.as_deref().unwrap_or("none"));
            Ok(())
        }
        Err(e) => {
            eprintln!("Failed to get status: {}", e);
            Err(e)
        }
    }
}

/// Initialize configuration file
fn run_init(output: PathBuf, pod_id: String) -> Result<()> {
    let config_content = format!(
        r#"# Podcoord Configuration
# Generated configuration file

[coordinator]
# Maximum number of registered pods
max_members = 10
# Pods silent for longer than this are marked inactive
heartbeat_timeout_ms = 5000
# Liveness sweep period (must be shorter than the timeout)
monitor_interval_ms = 2000

[api]
enabled = true
bind_address = "0.0.0.0:8080"
cors_enabled = false

[agent]
pod_id = "{pod_id}"
coordinator_url = "http://localhost:8080"
bind_address = "0.0.0.0:8081"
# Must be shorter than coordinator.heartbeat_timeout_ms
heartbeat_interval_ms = 1000
request_timeout_ms = 3000

[logging]
level = "info"
format = "pretty"
"#
    );

    std::fs::write(&output, config_content)?;
    println!("Configuration file created: {:?}", output);
    Ok(())
}

/// Validate configuration file
fn run_validate(config_path: &Path) -> Result<()> {
    match CoordinatorConfig::from_file(config_path) {
        Ok(_) => {
            println!("Configuration is valid: {:?}", config_path);
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            Err(e)
        }
    }
}

/// Show effective configuration
fn run_info(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;

    println!("Podcoord Configuration");
    println!("======================");
    println!();
    println!("Coordinator:");
    println!("  Max pods:          {}", config.coordinator.max_members);
    println!("  Heartbeat timeout: {} ms", config.coordinator.heartbeat_timeout_ms);
    println!("  Sweep interval:    {} ms", config.coordinator.monitor_interval_ms);
    println!();
    println!("API:");
    println!("  Enabled:           {}", config.api.enabled);
    println!("  Bind:              {}", config.api.bind_address);
    println!();
    println!("Agent:");
    println!("  Pod id:            {}", config.agent.pod_id.as_deref().unwrap_or("(generated)"));
    println!("  Coordinator:       {}", config.agent.coordinator_url);
    println!("  Advertise:         {}", config.agent.advertise_url());
    println!("  Heartbeat:         {} ms", config.agent.heartbeat_interval_ms);

    Ok(())
}
