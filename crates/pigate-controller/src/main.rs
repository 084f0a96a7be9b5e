use anyhow::Context;
use clap::Parser;
use pigate_controller::{Controller, ControllerConfig};
use pigate_network::MemoryBroker;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pigate")]
#[command(about = "PiGate access control edge controller", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Use in-memory pins instead of GPIO
    #[arg(long)]
    mock_hardware: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ControllerConfig::load(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if cli.mock_hardware {
        config.mock_hardware = true;
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // TODO: connect to the site broker once a wire MQTT client implements
    // `pigate_network::Transport`; until then status, commands and update
    // notices only reach clients inside this process.
    warn!("No remote broker transport configured, messaging is in-process only");
    let broker = MemoryBroker::new();
    let controller = Controller::start(config, &broker)
        .await
        .context("Failed to start controller")?;

    let shutdown = controller.shutdown_token();
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            info!("Interrupt received");
        }
        _ = shutdown.cancelled() => {}
    }

    controller.shutdown().await
}
