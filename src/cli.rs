//! Command-line surface: makes the bridge a runnable binary, following a
//! `clap`-derived `Cli`/subcommand style.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;

use crate::config::Config;
use crate::error::Result;
use crate::supervisor::Supervisor;

#[derive(Debug, Parser)]
#[command(name = "brop-bridge", version, about = "Browser automation bridge: multiplexes CDP and BROP clients onto a single extension control channel")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the bridge: binds the CDP, BROP, extension, and discovery
    /// endpoints and runs until interrupted.
    Serve {
        /// Path to a TOML config file (defaults to ./bridge.toml if present).
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        cdp_port: Option<u16>,
        #[arg(long)]
        brop_port: Option<u16>,
        #[arg(long)]
        ext_port: Option<u16>,
        #[arg(long)]
        http_port: Option<u16>,
    },
    /// Query the discovery HTTP endpoint and report whether a bridge is
    /// reachable.
    Status {
        #[arg(long, default_value_t = 9225)]
        http_port: u16,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Serve {
                config,
                cdp_port,
                brop_port,
                ext_port,
                http_port,
            } => serve(config, cdp_port, brop_port, ext_port, http_port).await,
            Commands::Status { http_port } => status(http_port).await,
        }
    }
}

async fn serve(
    config_path: Option<PathBuf>,
    cdp_port: Option<u16>,
    brop_port: Option<u16>,
    ext_port: Option<u16>,
    http_port: Option<u16>,
) -> Result<()> {
    let mut config = Config::load(config_path.as_deref())?;
    if let Some(p) = cdp_port {
        config.cdp_port = p;
    }
    if let Some(p) = brop_port {
        config.brop_port = p;
    }
    if let Some(p) = ext_port {
        config.ext_port = p;
    }
    if let Some(p) = http_port {
        config.http_port = p;
    }

    println!();
    println!("  {}", "Browser Automation Bridge".bold());
    println!("  {}", "─".repeat(40).dimmed());
    println!();
    println!("  {}  CDP clients:        ws://127.0.0.1:{}", "◆".cyan(), config.cdp_port);
    println!("  {}  BROP clients:       ws://127.0.0.1:{}", "◆".cyan(), config.brop_port);
    println!("  {}  Extension control:  ws://127.0.0.1:{}", "◆".cyan(), config.ext_port);
    println!("  {}  Discovery HTTP:     http://127.0.0.1:{}", "◆".cyan(), config.http_port);
    println!();
    println!("  {}  PID: {}", "ℹ".dimmed(), std::process::id());
    println!("  {}  Press Ctrl+C to stop", "ℹ".dimmed());
    println!();

    let supervisor = Supervisor::new(config);
    supervisor.run().await
}

async fn status(http_port: u16) -> Result<()> {
    let url = format!("http://127.0.0.1:{http_port}/json/version");
    match version_probe(&url).await {
        Ok(body) => {
            println!("  {} Bridge is running on port {}", "✓".green(), http_port);
            if let Some(product) = body.get("Browser").and_then(|v| v.as_str()) {
                println!("  {}  {}", "ℹ".dimmed(), product);
            }
        }
        Err(_) => {
            println!("  {} Bridge is not reachable on port {}", "✗".red(), http_port);
            println!(
                "  {}  Start with: {}",
                "ℹ".dimmed(),
                "brop-bridge serve".dimmed()
            );
        }
    }
    Ok(())
}

/// Best-effort `GET /json/version` probe, mirroring the teacher's
/// `reqwest::Client::builder().no_proxy().timeout(...)` pattern in
/// `browser/cdp_http.rs`.
async fn version_probe(url: &str) -> Result<serde_json::Value> {
    let client = reqwest::Client::builder()
        .no_proxy()
        .timeout(std::time::Duration::from_secs(2))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new());

    client
        .get(url)
        .send()
        .await
        .map_err(|e| crate::error::BridgeError::internal(e.to_string()))?
        .json()
        .await
        .map_err(|e| crate::error::BridgeError::internal(e.to_string()))
}
