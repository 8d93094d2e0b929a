// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

mod scheduler_task;
mod tracker_task;

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, App, HttpServer};
use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use gs_core::config::ServerConfig;
use gs_core::logging::init_logging;
use gs_core::store::MemoryStore;
use gs_core::DynResult;
use gs_router::AppState;
use gs_session::ProcessManager;

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - ground station server");

#[derive(Debug, Parser)]
#[command(author = env!("CARGO_PKG_AUTHORS"), version = env!("CARGO_PKG_VERSION"), about = PKG_DESCRIPTION)]
struct Cli {
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print example configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// IP address for the HTTP/event listener
    #[arg(long = "host")]
    host: Option<IpAddr>,
    /// Port for the HTTP/event listener
    #[arg(long = "port")]
    port: Option<u16>,
    /// Path to the relational store database
    #[arg(long = "db")]
    db: Option<String>,
    /// Log level (error, warn, info, debug, trace)
    #[arg(long = "log-level")]
    log_level: Option<String>,
    /// Path to a file whose trimmed contents override the log level
    #[arg(long = "log-config")]
    log_config: Option<PathBuf>,
    /// Secret key used to sign session tokens
    #[arg(long = "secret-key")]
    secret_key: Option<String>,
    /// Tracker poll interval, seconds
    #[arg(long = "track-interval")]
    track_interval: Option<u64>,
    /// Enable background SoapySDR device discovery
    #[arg(long = "enable-soapy-discovery")]
    enable_soapy_discovery: bool,
    /// Run SoapySDR device discovery once at startup, then disable it
    #[arg(long = "runonce-soapy-discovery")]
    runonce_soapy_discovery: bool,
}

/// Resolved configuration after merging the config file and CLI overrides,
/// mirroring `trx-server::main::ResolvedConfig`'s CLI-wins-over-file shape.
struct ResolvedConfig {
    host: IpAddr,
    port: u16,
    log_level: Option<String>,
    regenerate_interval: Duration,
    start_lead: Duration,
    conflict_strategy: gs_core::ConflictStrategy,
    track_interval: Duration,
}

fn resolve_config(cli: &Cli, cfg: &ServerConfig) -> ResolvedConfig {
    let log_level = cli.log_level.clone().or_else(|| {
        cli.log_config
            .as_ref()
            .and_then(|path| std::fs::read_to_string(path).ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    });

    ResolvedConfig {
        host: cli.host.unwrap_or(cfg.listen.host),
        port: cli.port.unwrap_or(cfg.listen.port),
        log_level: log_level.or_else(|| cfg.general.log_level.clone()),
        regenerate_interval: Duration::from_secs(cfg.scheduler.regenerate_interval_hours as u64 * 3600),
        start_lead: Duration::from_secs(cfg.scheduler.start_lead_secs as u64),
        conflict_strategy: cfg.scheduler.conflict_strategy,
        track_interval: Duration::from_secs(cfg.tracker.track_interval_secs),
    }
}

#[tokio::main]
async fn main() -> DynResult<()> {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", ServerConfig::example_toml());
        return Ok(());
    }

    let (mut cfg, config_path) = if let Some(ref path) = cli.config {
        (ServerConfig::load_from_file(path)?, Some(path.clone()))
    } else {
        ServerConfig::load_from_default_paths()?
    };

    if let Some(ref db) = cli.db {
        cfg.general.db_path = db.clone();
    }
    if let Some(ref key) = cli.secret_key {
        cfg.general.secret_key = Some(key.clone());
    }
    if let Some(secs) = cli.track_interval {
        cfg.tracker.track_interval_secs = secs;
    }
    if cli.enable_soapy_discovery {
        cfg.tracker.enable_soapy_discovery = true;
    }
    if cli.runonce_soapy_discovery {
        cfg.tracker.runonce_soapy_discovery = true;
    }

    cfg.validate().map_err(|e| format!("Invalid server configuration: {}", e))?;

    let resolved = resolve_config(&cli, &cfg);
    init_logging(resolved.log_level.as_deref());

    if let Some(ref path) = config_path {
        info!("Loaded configuration from {}", path.display());
    }
    info!("Starting gs-server on {}:{}", resolved.host, resolved.port);

    let recordings_dir = PathBuf::from(&cfg.general.db_path).parent().map(|p| p.join("recordings")).unwrap_or_else(|| PathBuf::from("recordings"));
    std::fs::create_dir_all(&recordings_dir)?;

    let process_manager = Arc::new(ProcessManager::new());
    let memory_store = Arc::new(MemoryStore::new());
    let observation_store: Arc<dyn gs_core::store::ScheduledObservationStore> = memory_store.clone();
    let tracking_state_store: Arc<dyn gs_core::store::TrackingStateStore> = memory_store;
    let app_state: gs_router::SharedState = Arc::new(AppState::new(
        process_manager,
        observation_store,
        tracking_state_store,
        recordings_dir,
        env!("CARGO_PKG_VERSION").to_string(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut task_handles: Vec<JoinHandle<()>> = Vec::new();

    {
        let state = app_state.clone();
        let interval = resolved.regenerate_interval;
        let strategy = resolved.conflict_strategy;
        let shutdown_rx = shutdown_rx.clone();
        task_handles.push(tokio::spawn(async move {
            tokio::select! {
                _ = scheduler_task::run_generator_loop(state, interval, strategy) => {}
                _ = scheduler_task::wait_for_shutdown(shutdown_rx) => {}
            }
        }));
    }
    {
        let state = app_state.clone();
        let start_lead = resolved.start_lead;
        let shutdown_rx = shutdown_rx.clone();
        task_handles.push(tokio::spawn(async move {
            tokio::select! {
                _ = scheduler_task::run_executor_loop(state, start_lead) => {}
                _ = scheduler_task::wait_for_shutdown(shutdown_rx) => {}
            }
        }));
    }

    {
        let state = app_state.clone();
        let track_interval = resolved.track_interval;
        let shutdown_rx = shutdown_rx.clone();
        task_handles.push(tokio::spawn(async move {
            tokio::select! {
                _ = tracker_task::run_tracker_loop(state, track_interval) => {}
                _ = scheduler_task::wait_for_shutdown(shutdown_rx) => {}
            }
        }));
    }

    let bind_addr = (resolved.host, resolved.port);
    let http_state = app_state.clone();
    let server = HttpServer::new(move || App::new().app_data(web::Data::new(http_state.clone())).configure(gs_router::configure))
        .shutdown_timeout(1)
        .disable_signals()
        .bind(bind_addr)?
        .run();

    let server_handle = server.handle();
    let http_task = tokio::spawn(server);

    signal::ctrl_c().await?;
    info!("Ctrl+C received, shutting down");
    let _ = shutdown_tx.send(true);
    server_handle.stop(false).await;

    for handle in &task_handles {
        if !handle.is_finished() {
            handle.abort();
        }
    }
    for handle in task_handles {
        let _ = handle.await;
    }
    if let Err(err) = http_task.await {
        error!(error = %err, "HTTP server task join error");
    }

    Ok(())
}
