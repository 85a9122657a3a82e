//! peerport CLI
//!
//! Usage:
//!   peerport serve [--addr 127.0.0.1:8090]
//!   peerport config

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use peerport_cli::PeerportServer;
use peerport_config::{get_config_path, Config};

#[derive(Parser)]
#[command(name = "peerport")]
#[command(about = "Peer-to-peer command/event port over WebSocket", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the adapter on /ws
    Serve {
        /// Bind address (defaults to server.bind_address from config)
        #[arg(long)]
        addr: Option<String>,
    },
    /// Print the config path and effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("peerport=info".parse()?)
                .add_directive("peerport_cli=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { addr } => {
            let config = Config::load()?;
            let addr = addr.unwrap_or_else(|| config.server.bind_address.clone());

            PeerportServer::new(addr)
                .with_adapter_config(config.adapter.to_adapter_config())
                .run()
                .await?;
        }
        Commands::Config => {
            let config = Config::load_or_default();
            println!("# {}", get_config_path().display());
            print!(
                "{}",
                toml::to_string_pretty(&config).context("Failed to encode config")?
            );
        }
    }

    Ok(())
}
