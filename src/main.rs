mod bridge;
mod call_log;
mod cli;
mod config;
mod console_log;
mod error;
mod extension;
mod ids;
mod model;
mod protocol;
mod registry;
mod router;
mod servers;
mod supervisor;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::Cli;
use error::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let cli = Cli::parse();
    cli.run().await
}
