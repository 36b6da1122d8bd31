//! botfleetd — the fleet demand controller daemon.
//!
//! Single binary that assembles the controller subsystems:
//! - Host gateway (HTTP to each bot host)
//! - Demand sampler (optional REST metric source)
//! - Scaling policy
//! - Controller loop
//! - REST API + Prometheus metrics
//!
//! # Usage
//!
//! ```text
//! botfleetd run --config /etc/botfleet/botfleet.toml
//! botfleetd check --config /etc/botfleet/botfleet.toml
//! ```

mod config;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::task::JoinHandle;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use botfleet_controller::Controller;
use botfleet_demand::{DemandSampler, RestDemandSource};
use botfleet_gateway::{AsfGateway, HostGateway};

use crate::config::FleetConfig;

const DEFAULT_LOG_FILTER: &str = "info,botfleetd=debug,botfleet=debug";

#[derive(Parser)]
#[command(name = "botfleetd", about = "Fleet demand controller daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Discover the fleet, serve the API, and run the control loop.
    Run {
        /// Path to botfleet.toml.
        #[arg(long, short)]
        config: PathBuf,

        /// Override `[api] listen`.
        #[arg(long)]
        listen: Option<SocketAddr>,
    },
    /// Load and validate configuration, then print a summary.
    Check {
        #[arg(long, short)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match cli.command {
        Command::Run { config, listen } => run(&config, listen).await,
        Command::Check { config } => check(&config),
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn check(path: &Path) -> anyhow::Result<()> {
    let config = FleetConfig::load(path)?;
    let controller = config.controller_config()?;

    println!("configuration OK: {}", path.display());
    println!("  hosts:         {}", config.hosts.len());
    println!("  max_workers:   {}", controller.max_workers);
    println!("  cycle_period:  {}s", controller.cycle_period.as_secs());
    println!("  max_batch:     {}", controller.max_batch);
    println!("  policy:        {}", config.policy.name());
    match &config.demand {
        Some(demand) => println!("  demand:        {}/{}", demand.url, demand.table),
        None => println!("  demand:        none"),
    }
    println!("  api:           {}", config.api.listen);
    Ok(())
}

async fn run(path: &Path, listen: Option<SocketAddr>) -> anyhow::Result<()> {
    info!(path = %path.display(), "botfleet daemon starting");

    let config = FleetConfig::load(path)?;
    let addr = match listen {
        Some(addr) => addr,
        None => config.listen_addr()?,
    };

    // ── Initialize subsystems ──────────────────────────────────

    let gateway: Arc<dyn HostGateway> = Arc::new(AsfGateway::new(
        config.hosts.clone(),
        config.request_timeout()?,
    ));
    info!(hosts = gateway.host_count(), "host gateway initialized");

    let mut controller = Controller::new(
        config.controller_config()?,
        config.policy.clone(),
        gateway,
    );
    if let Some(demand) = &config.demand {
        let source = RestDemandSource::new(demand.clone())?;
        controller = controller.with_sampler(DemandSampler::new(Box::new(source)));
        info!(url = %demand.url, table = %demand.table, "demand sampler initialized");
    }
    let controller = Arc::new(controller);

    // ── Bootstrap ──────────────────────────────────────────────

    let report = controller.bootstrap().await?;
    info!(
        workers = report.discovered,
        running = report.running,
        failed_hosts = ?report.failed_hosts,
        "fleet bootstrapped"
    );

    // ── Start background tasks ─────────────────────────────────

    let loop_controller = controller.clone();
    let loop_handle = tokio::spawn(async move {
        loop_controller.run().await;
    });

    // ── Start API server ───────────────────────────────────────

    let router = botfleet_api::build_router(controller.clone());
    info!(%addr, "API server starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let shutdown_controller = controller.clone();
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
        info!("shutdown signal received");
        shutdown_controller.shutdown();
    });

    server.await?;

    // Wait for the controller loop to finish its in-flight batch.
    await_control_loop(loop_handle).await;

    info!("botfleet daemon stopped");
    Ok(())
}

/// Wait for the control loop task. Returns `false` if it panicked or was
/// cancelled.
async fn await_control_loop(handle: JoinHandle<()>) -> bool {
    match handle.await {
        Ok(()) => true,
        Err(e) => {
            error!(error = %e, "controller loop terminated abnormally");
            false
        }
    }
}
