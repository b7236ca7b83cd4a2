#![forbid(unsafe_code)]

//! `proactive-hub`: personal automation dashboard backend.
//!
//! Bootstraps configuration and storage, starts the reminder scheduler,
//! the intention daemon, the event pump, and the WebSocket gateway, then
//! shuts them down in order on ctrl-c or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use proactive_hub::agent::{ChatAgent, OpenAiCompatibleAgent};
use proactive_hub::config::GlobalConfig;
use proactive_hub::gateway::{server, spawn_event_pump, AppState, BroadcastHub};
use proactive_hub::intentions::{ExecutionRunner, IntentionDaemon, IntentionStore};
use proactive_hub::persistence::db;
use proactive_hub::persistence::intention_repo::IntentionRepo;
use proactive_hub::persistence::reminder_repo::ReminderRepo;
use proactive_hub::reminders::{ReminderScheduler, ReminderStore};
use proactive_hub::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "proactive-hub", about = "Reminders, scheduled intentions, and live event fan-out", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the HTTP port from the configuration file.
    #[arg(long)]
    port: Option<u16>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("proactive-hub bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => {
            info!("no config file given; using defaults");
            GlobalConfig::default()
        }
    };
    if let Some(port) = args.port {
        config.http_port = port;
    }
    config.load_credentials().await?;
    let config = Arc::new(config);
    info!(model = %config.agent.model, "configuration loaded");

    // ── Initialize database and stores ──────────────────
    let db = Arc::new(db::connect(&config.db_path).await?);
    info!(path = %config.db_path.display(), "database connected");

    let reminder_store = Arc::new(ReminderStore::load(ReminderRepo::new(Arc::clone(&db))).await?);
    let intention_store =
        Arc::new(IntentionStore::load(IntentionRepo::new(Arc::clone(&db))).await?);

    // ── Build components ────────────────────────────────
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let agent: Arc<dyn ChatAgent> = Arc::new(OpenAiCompatibleAgent::new(&config.agent)?);

    let scheduler = Arc::new(ReminderScheduler::new(
        reminder_store,
        config.reminder_poll_interval(),
    ));
    let daemon = Arc::new(IntentionDaemon::new(
        intention_store,
        ExecutionRunner::new(Arc::clone(&agent), events_tx.clone()),
        config.intention_poll_interval(),
        config.shutdown_grace(),
    ));
    let hub = Arc::new(BroadcastHub::new());

    let state = Arc::new(AppState {
        config: Arc::clone(&config),
        reminders: Arc::clone(&scheduler),
        daemon: Arc::clone(&daemon),
        agent,
        hub: Arc::clone(&hub),
    });

    // ── Start background services ───────────────────────
    let ct = CancellationToken::new();
    let pump_handle = spawn_event_pump(Arc::clone(&hub), events_rx, ct.clone());
    scheduler.start(events_tx);
    daemon.start();

    let server_ct = ct.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(err) = server::serve(state, server_ct).await {
            error!(%err, "gateway failed");
        }
    });

    info!("proactive-hub ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");

    // Stop producers before the pump so their last events still go out.
    daemon.stop().await;
    scheduler.stop().await;
    ct.cancel();

    let (server_result, pump_result) = tokio::join!(server_handle, pump_handle);
    for result in [server_result, pump_result] {
        if let Err(err) = result {
            warn!(%err, "background task ended abnormally");
        }
    }

    db.close().await;
    info!("proactive-hub shut down");
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
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                if let Err(err) = ctrl_c.await {
                    error!(%err, "ctrl-c signal handler failed");
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
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
