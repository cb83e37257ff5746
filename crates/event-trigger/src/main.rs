//! CLI entry point for the event trigger simulator.

use anyhow::{Context, Result};
use clap::Parser;
use event_trigger::{run_simulation, MemoryTransport, SimulatorConfig, TcpTransport};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "event-trigger")]
#[command(about = "Synthetic module event generator for the EventMonitor")]
#[command(version)]
struct Cli {
    /// Configuration file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// EventMonitor host
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// EventMonitor port
    #[arg(short, long)]
    port: Option<u16>,

    /// Client ids to simulate, comma separated
    #[arg(long, value_delimiter = ',')]
    clients: Option<Vec<u32>>,

    /// Client whose CRITICAL halts all clients (default: last client)
    #[arg(long)]
    designated: Option<u32>,

    /// Seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Grace period before the fleet stops, in milliseconds
    #[arg(long)]
    grace_period_ms: Option<u64>,

    /// Keep CRITICAL out of the draw for this long after a module starts, in milliseconds
    #[arg(long)]
    critical_warmup_ms: Option<u64>,

    /// Log messages instead of connecting to the monitor
    #[arg(long)]
    dry_run: bool,

    /// Output file for the JSON report
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write the default configuration to this path and exit
    #[arg(long)]
    generate_config: Option<PathBuf>,
}

impl Cli {
    fn apply(&self, config: &mut SimulatorConfig) {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(clients) = &self.clients {
            config.clients = clients.clone();
        }
        if let Some(designated) = self.designated {
            config.designated_client = Some(designated);
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if let Some(grace) = self.grace_period_ms {
            config.timing.grace_period_ms = grace;
        }
        if let Some(warmup) = self.critical_warmup_ms {
            config.timing.critical_warmup_ms = warmup;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();

    if let Some(path) = &cli.generate_config {
        SimulatorConfig::write_default(path)
            .with_context(|| format!("writing {}", path.display()))?;
        info!("Default configuration written to {}", path.display());
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => SimulatorConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SimulatorConfig::default(),
    };
    cli.apply(&mut config);
    config.validate()?;

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let report = if cli.dry_run {
        info!("Dry run: messages are logged, not sent");
        run_simulation(config, Arc::new(MemoryTransport::echoing()), cancel).await?
    } else {
        let transport = Arc::new(TcpTransport::from_config(&config));
        run_simulation(config, transport, cancel).await?
    };

    report.print_summary();

    if let Some(path) = &cli.output {
        std::fs::write(path, report.to_json())
            .with_context(|| format!("writing {}", path.display()))?;
        info!("JSON report saved to: {}", path.display());
    }

    Ok(())
}

/// Cancels the simulation on SIGINT or SIGTERM.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("SIGINT received, stopping clients...");
        }
        _ = terminate => {
            info!("SIGTERM received, stopping clients...");
        }
    }

    cancel.cancel();
}
