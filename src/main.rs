//! Echotap CLI

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use echotap::app::App;
use echotap::config::Config;
use echotap::network::NetworkHandler;

#[derive(Parser)]
#[command(name = "echotap", version, about = "Capture HTTP traffic and stream it live")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the capture server
    Serve {
        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Listen address, overrides the configuration
        #[arg(short, long)]
        listen: Option<String>,
        /// History size, overrides the configuration
        #[arg(long)]
        max_logs: Option<usize>,
    },
    /// Check a configuration file and exit
    Validate {
        /// TOML configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("echotap=info")),
        )
        .init();

    match Cli::parse().command {
        Command::Serve {
            config,
            listen,
            max_logs,
        } => {
            let mut config = match config {
                Some(path) => Config::from_file(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => Config::default(),
            };
            if let Some(listen) = listen {
                config.server.listen_addr = listen;
            }
            if let Some(max_logs) = max_logs {
                config.capture.max_logs = max_logs;
            }
            config.validate()?;

            info!(
                "Echotap v{} starting (history {} records, events at {})",
                env!("CARGO_PKG_VERSION"),
                config.capture.max_logs,
                config.capture.events_path
            );

            let app = Arc::new(App::new(config));
            NetworkHandler::new(app).run().await?;
        }
        Command::Validate { config } => {
            Config::from_file(&config).with_context(|| format!("loading {}", config.display()))?;
            println!("{}: ok", config.display());
        }
    }

    Ok(())
}
