#![forbid(unsafe_code)]

//! `workqueue`: work-queue coordination server binary.
//!
//! Bootstraps configuration and the database, then runs the HTTP API, the
//! IPC server for `workqueue-ctl`, and the background lease sweeper until
//! ctrl-c or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use workqueue::clock::{Clock, SystemClock};
use workqueue::config::GlobalConfig;
use workqueue::coordination::sweeper;
use workqueue::persistence::db;
use workqueue::state::AppState;
use workqueue::{http, ipc, AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "workqueue", about = "Work-queue coordination server", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the configured database path.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Override the configured HTTP port.
    #[arg(long)]
    http_port: Option<u16>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("workqueue server bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    if let Some(db_path) = args.db_path {
        config.db_path = db_path;
    }
    if let Some(port) = args.http_port {
        config.http_port = port;
    }
    config.load_ipc_token();
    let config = Arc::new(config);
    info!(db_path = %config.db_path.display(), "configuration loaded");

    let db = Arc::new(db::connect(&config.db_path).await?);
    info!("database connected");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let state = AppState::build(&db, &clock, Arc::clone(&config)).await?;

    let ct = CancellationToken::new();

    let sweeper_handle = sweeper::spawn_lock_sweeper(
        state.services.locks.clone(),
        Duration::from_secs(config.locks.cleanup_interval_seconds),
        ct.clone(),
    );
    info!(
        interval_seconds = config.locks.cleanup_interval_seconds,
        "lock sweeper started"
    );

    let ipc_handle = ipc::server::spawn_ipc_server(Arc::clone(&state), ct.clone())?;

    let listener = http::bind(&config.bind_address, config.http_port).await?;
    let http_ct = ct.clone();
    let http_state = Arc::clone(&state);
    let http_handle = tokio::spawn(async move {
        if let Err(err) = http::serve(http_state, listener, http_ct).await {
            error!(%err, "http api failed");
        }
    });

    info!("workqueue server ready");

    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    let _ = tokio::join!(http_handle, ipc_handle, sweeper_handle);
    db.close().await;
    info!("workqueue shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
