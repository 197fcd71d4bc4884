//! # ATK Daemon (atk-daemon)
//!
//! Long-lived personal audio daemon. Decodes local files, renders them to
//! the chosen output device, and serves playback-control commands over
//! named-pipe IPC with an optional event stream for subscribers.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use atk_daemon::config::Config;
use atk_daemon::daemon::Daemon;
use atk_daemon::engine::Engine;
use atk_daemon::ipc::{InstanceLock, PipeTransport};
use atk_daemon::session::Session;

#[derive(Parser, Debug)]
#[command(name = "atk-daemon")]
#[command(about = "ATK audio daemon - pipe-controlled playback engine")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Runtime directory for pipes and PID file (overrides config file)
    #[arg(long)]
    runtime_dir: Option<PathBuf>,

    /// Log level (overrides config file)
    #[arg(long)]
    log_level: Option<String>,

    /// Preferred output device name (overrides config file)
    #[arg(long)]
    device: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(
        args.config.as_deref(),
        args.runtime_dir,
        args.log_level,
        args.device,
    )?;

    // Log to stderr and to ${state}/daemon.log
    std::fs::create_dir_all(&config.state_dir)?;
    let file_appender = tracing_appender::rolling::never(&config.state_dir, "daemon.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env("ATK_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_filter())),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .init();

    info!("Starting ATK daemon");
    info!("Runtime directory: {}", config.runtime_dir.display());
    info!("State directory: {}", config.state_dir.display());
    info!("Data directory: {}", config.data_dir.display());

    // At-most-one running instance
    let lock = match InstanceLock::acquire(&config.runtime_dir) {
        Ok(lock) => lock,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let (transport, req_rx, outbound) = PipeTransport::start(&config.runtime_dir)?;

    let (engine, notices) = Engine::new();
    if let Some(device) = config.device.clone() {
        engine.set_device(Some(device)).await;
    }

    let shutdown = Arc::new(Notify::new());
    let mut session = Session::new(
        Arc::clone(&engine),
        outbound.clone(),
        Arc::clone(&shutdown),
        config.data_dir.clone(),
    );
    session.load_state();

    // SIGTERM/SIGINT request a clean shutdown
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => {}
                _ = sigint.recv() => {}
            }
            info!("Received shutdown signal");
            shutdown.notify_one();
        });
    }

    let mut daemon = Daemon::new(session, req_rx, notices, outbound, shutdown);
    info!("ATK daemon started");
    daemon.run().await;

    // Teardown: persist session state, stop audio, remove pipes + PID file
    info!("Stopping ATK daemon");
    if let Err(e) = daemon.session().save_state() {
        warn!("Failed to save session state: {}", e);
    }
    engine.stop().await;
    engine.shutdown();
    transport.shutdown();
    drop(lock);
    info!("ATK daemon stopped");

    // The pipe reader may be parked in a blocking FIFO open that nothing
    // will ever complete; exit without waiting for the blocking pool.
    std::process::exit(0);
}
