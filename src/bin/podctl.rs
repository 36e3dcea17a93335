//! podctl - Command line tool for inspecting a podcoord coordinator
//!
//! Usage:
//!   podctl list              - Show registered pods
//!   podctl status            - Show coordinator status
//!   podctl leader            - Show the current leader
//!   podctl unregister <id>   - Remove a pod

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Deserialize;

use podcoord::agent::{CoordinatorClient, MemberInfo};

/// Podcoord Control Tool
#[derive(Parser)]
#[command(name = "podctl")]
#[command(about = "Inspect and manage a podcoord coordinator", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "podcoord.toml")]
    config: PathBuf,

    /// Coordinator endpoint (overrides config)
    #[arg(short, long)]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered pods
    List,
    /// Show coordinator status
    Status,
    /// Show the current leader
    Leader,
    /// Remove a pod from the registry
    Unregister {
        /// Pod id to remove
        pod_id: String,
    },
}

// ============ Config ============

#[derive(Debug, Deserialize)]
struct Config {
    #[serde(default)]
    api: ApiConfig,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfig {
    #[serde(default = "default_api_bind")]
    bind_address: String,
}

fn default_api_bind() -> String {
    "0.0.0.0:8080".to_string()
}

/// Endpoint from the config file's API bind address
fn endpoint_from_config(path: &std::path::Path) -> String {
    let bind = std::fs::read_to_string(path)
        .ok()
        .and_then(|content| toml::from_str::<Config>(&content).ok())
        .map(|config| config.api.bind_address)
        .unwrap_or_else(default_api_bind);

    // Convert bind address to localhost if it's 0.0.0.0
    if bind.starts_with("0.0.0.0") {
        format!("http://127.0.0.1:{}", bind.rsplit(':').next().unwrap_or("8080"))
    } else {
        format!("http://{}", bind)
    }
}

// ============ Main ============

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let endpoint = cli
        .endpoint
        .clone()
        .unwrap_or_else(|| endpoint_from_config(&cli.config));

    let result = match &cli.command {
        Commands::List => list_pods(&endpoint).await,
        Commands::Status => show_status(&endpoint).await,
        Commands::Leader => show_leader(&endpoint).await,
        Commands::Unregister { pod_id } => unregister(&endpoint, pod_id).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn client(endpoint: &str) -> anyhow::Result<CoordinatorClient> {
    CoordinatorClient::new(endpoint, Duration::from_secs(5))
        .with_context(|| format!("cannot create client for {}", endpoint))
}

// ============ Commands ============

async fn list_pods(endpoint: &str) -> anyhow::Result<()> {
    let members = client(endpoint)?
        .members()
        .await
        .with_context(|| format!("cannot list pods from {}", endpoint))?;

    println!();
    println!("Podcoord Pods (podctl v{})", env!("CARGO_PKG_VERSION"));
    println!("============================");
    println!();
    print_members(&members);
    Ok(())
}

async fn show_status(endpoint: &str) -> anyhow::Result<()> {
    let status = client(endpoint)?
        .status()
        .await
        .with_context(|| format!("cannot get status from {}", endpoint))?;

    println!();
    println!(
        "Total: {} pods  |  Active: {}  |  Capacity: {}",
        status.total_members, status.active_members, status.capacity
    );
    println!("Leader: {}", status.leader.as_deref().unwrap_or("NONE"));
    println!("Leader changes: {}", status.leader_changes);
    println!();
    print_members(&status.members);
    Ok(())
}

async fn show_leader(endpoint: &str) -> anyhow::Result<()> {
    let leader = client(endpoint)?
        .leader()
        .await
        .with_context(|| format!("cannot get leader from {}", endpoint))?;

    match leader {
        Some(id) => println!("{}", id),
        None => println!("No leader"),
    }
    Ok(())
}

async fn unregister(endpoint: &str, pod_id: &str) -> anyhow::Result<()> {
    client(endpoint)?
        .unregister(pod_id)
        .await
        .with_context(|| format!("cannot unregister {}", pod_id))?;

    println!("Pod {} unregistered", pod_id);
    Ok(())
}

fn print_members(members: &[MemberInfo]) {
    println!(
        "{:<24} {:<28} {:<10} {:<10} {}",
        "POD ID", "ADDRESS", "STATUS", "ROLE", "LAST HEARTBEAT"
    );
    println!("{}", "-".repeat(100));

    for member in members {
        // Pad before adding color codes
        let status_padded = format!("{:<10}", if member.is_active { "Active" } else { "Inactive" });
        let status_colored = if member.is_active {
            format!("\x1b[32m{}\x1b[0m", status_padded) // Green
        } else {
            format!("\x1b[31m{}\x1b[0m", status_padded) // Red
        };

        let role_padded = format!("{:<10}", if member.is_leader { "Leader" } else { "Follower" });
        let role_colored = if member.is_leader {
            format!("\x1b[1;34m{}\x1b[0m", role_padded) // Bold Blue
        } else {
            role_padded
        };

        println!(
            "{:<24} {:<28} {} {} {}",
            member.id,
            member.address,
            status_colored,
            role_colored,
            member.last_heartbeat_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    println!();
}
