//! apifleet: run a fleet of interval HTTP polling clients.
//!
//! Two roles share this binary:
//!   apifleet run     read the fleet config, spawn and supervise workers
//!   apifleet worker  run a single polling client (started by `run`)

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};

use apifleet::client::PollingClient;
use apifleet::config::{self, FleetConfig};
use apifleet::logging::{self, LogConfig};
use apifleet::orchestrator::{Orchestrator, ProcessSpawner, RUN_ID_ENV};
use apifleet::signal::ShutdownSignals;
use apifleet::transport::ReqwestTransport;

#[derive(Parser)]
#[command(name = "apifleet", version, about = "Supervised fleet of interval HTTP polling clients")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start every enabled client from the fleet configuration.
    Run {
        #[arg(short, long, default_value = "config.json", env = "APIFLEET_CONFIG")]
        config: PathBuf,
        /// Binary to launch workers with; defaults to this executable.
        #[arg(long)]
        worker_bin: Option<PathBuf>,
    },
    /// Run one polling client. Normally launched by `run`.
    #[command(hide = true)]
    Worker {
        #[arg(long)]
        log_file: Option<PathBuf>,
        name: String,
        client_config: String,
        #[arg(default_value = "{}")]
        auth_config: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Run { config, worker_bin } => run_fleet(config, worker_bin).await,
        Command::Worker {
            log_file,
            name,
            client_config,
            auth_config,
        } => run_worker(log_file, name, client_config, auth_config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("apifleet: {e:#}");
            ExitCode::FAILURE
        }
    }
}

// ── Orchestrator Role ───────────────────────────────────────────────

async fn run_fleet(config_path: PathBuf, worker_bin: Option<PathBuf>) -> Result<()> {
    let fleet = FleetConfig::load(&config_path)
        .with_context(|| format!("Failed to load fleet config from {}", config_path.display()))?;

    let log_file = fleet.log_file();
    let _guard = logging::init(&LogConfig {
        file: log_file.clone(),
    })?;

    let run_id = uuid::Uuid::new_v4().to_string();
    info!("🛰️  apifleet v{}", env!("CARGO_PKG_VERSION"));
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!(
        run_id = %run_id,
        config = %config_path.display(),
        clients = fleet.clients.len(),
        max_runtime_secs = fleet.max_runtime,
        "Fleet configuration loaded"
    );

    let program = match worker_bin {
        Some(path) => path,
        None => std::env::current_exe().context("Failed to locate the apifleet executable")?,
    };
    let mut signals = ShutdownSignals::install().context("Failed to install signal handlers")?;

    let spawner = Arc::new(ProcessSpawner::new(program, log_file, run_id));
    let mut orchestrator = Orchestrator::new(fleet, spawner);
    orchestrator.start_clients();

    orchestrator
        .run(async move {
            let signal = signals.recv().await;
            info!(signal = ?signal, "Signal received");
        })
        .await
}

// ── Worker Role ─────────────────────────────────────────────────────

async fn run_worker(
    log_file: Option<PathBuf>,
    name: String,
    client_json: String,
    auth_json: String,
) -> Result<()> {
    let _guard = logging::init(&LogConfig { file: log_file })?;

    let (client_config, auth) = config::parse_worker_args(&name, &client_json, &auth_json)
        .with_context(|| format!("Invalid configuration for client '{name}'"))?;

    let run_id = std::env::var(RUN_ID_ENV).unwrap_or_default();
    let span = info_span!("worker", client = %name, pid = std::process::id(), run_id = %run_id);

    async move {
        let stop = CancellationToken::new();
        let mut signals = ShutdownSignals::install().context("Failed to install signal handlers")?;
        let trigger = stop.clone();
        tokio::spawn(
            async move {
                let signal = signals.recv().await;
                info!(signal = ?signal, "Stop requested — finishing current tick");
                trigger.cancel();
            }
            .in_current_span(),
        );

        let transport = Arc::new(ReqwestTransport::new().context("Failed to build HTTP client")?);
        let mut client = PollingClient::new(name, client_config, auth, transport)?;

        let reason = client.run(stop).await;
        info!(reason = ?reason, "Client terminated");
        Ok::<_, anyhow::Error>(())
    }
    .instrument(span)
    .await
}
