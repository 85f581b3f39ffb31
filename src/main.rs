// Allow dead code for engine API functions not yet exposed via RPC
#![allow(dead_code)]

mod rpc;
mod srs;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "mnemos-core")]
#[command(about = "Mnemos Core - Backend engine for the Mnemos reading & learning workstation")]
struct Cli {
    #[arg(long, default_value = "http")]
    mode: String,

    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value = "21520")]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.mode.as_str() {
        "http" => {
            tracing::info!(
                "Starting mnemos-core HTTP server on {}:{}",
                cli.host,
                cli.port
            );
            rpc::run_http_server(&cli.host, cli.port).await
        }
        "stdio" => {
            tracing::info!("Starting mnemos-core JSON-RPC server (stdio mode)");
            rpc::run_stdio_server().await
        }
        _ => {
            anyhow::bail!("Invalid mode: {}. Use 'http' or 'stdio'", cli.mode)
        }
    }
}
