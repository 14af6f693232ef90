//! seek-ramp daemon - tap to seek, hold to fast-forward in mpv.
//!
//! Connects to mpv's JSON IPC socket, receives key and command script
//! messages, and ramps playback speed up while a key is held or the toggle
//! is on.

mod classifier;
mod config;
mod controller;
mod error;
mod feedback;
mod host;
mod logging;
mod mpv_ipc;
mod ramp;
mod timer;

use config::ConfigManager;
use controller::{Controller, SessionEnd};
use error::DaemonError;
use mpv_ipc::{MpvClient, MpvHost};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Delay between attempts to reach mpv's socket
const RECONNECT_INTERVAL_SECS: u64 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _log_guard = logging::init_logging().map_err(|e| {
        eprintln!("Failed to initialize logging: {}", e);
        e
    })?;

    info!("seek-ramp daemon starting...");

    let result = run_daemon().await;

    match &result {
        Ok(()) => info!("seek-ramp daemon shut down gracefully"),
        Err(e) => error!("seek-ramp daemon error: {}", e),
    }

    Ok(result?)
}

/// Serve one mpv session after another until a shutdown signal arrives.
async fn run_daemon() -> Result<(), DaemonError> {
    let config_path = ConfigManager::default_path();
    let config_manager = Arc::new(ConfigManager::load_or_default(&config_path)?);
    info!("Configuration loaded from {:?}", config_manager.path());

    // The sender stays alive here so a failed signal setup never reads as shutdown
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = setup_signal_handlers(signal_tx).await {
            error!("Signal handler error: {}", e);
        }
    });

    let retry_interval = Duration::from_secs(RECONNECT_INTERVAL_SECS);

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let config = config_manager.get();
        let socket_path = PathBuf::from(&config.socket_path);

        let (client, mut events) = match MpvClient::connect(&socket_path).await {
            Ok(connected) => connected,
            Err(e) if !e.is_retryable() => return Err(e.into()),
            Err(e) => {
                warn!("{}, retrying in {} seconds", e, RECONNECT_INTERVAL_SECS);
                if wait_or_shutdown(&mut shutdown_rx, retry_interval).await {
                    break;
                }
                continue;
            }
        };

        if let Err(e) = client.observe_properties().await {
            warn!("Failed to observe mpv properties: {}, reconnecting", e);
            if wait_or_shutdown(&mut shutdown_rx, retry_interval).await {
                break;
            }
            continue;
        }

        let host = MpvHost::new(client, config.feedback);
        let mut controller = Controller::new(host, Arc::clone(&config_manager));
        info!("Listening for {} script messages", mpv_ipc::MESSAGE_TARGET);

        match controller.run(&mut events, &mut shutdown_rx).await {
            SessionEnd::Shutdown => break,
            SessionEnd::HostClosed => {
                info!("mpv session ended, waiting for the next one");
                if wait_or_shutdown(&mut shutdown_rx, retry_interval).await {
                    break;
                }
            }
        }
    }

    Ok(())
}

/// Sleep for `duration`. Returns true if shutdown was requested meanwhile.
async fn wait_or_shutdown(shutdown_rx: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    tokio::select! {
        _ = shutdown_rx.changed() => *shutdown_rx.borrow(),
        _ = tokio::time::sleep(duration) => false,
    }
}

/// Set up signal handlers for graceful shutdown (SIGTERM and SIGINT).
async fn setup_signal_handlers(
    shutdown_tx: watch::Sender<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT");
        }
    }

    let _ = shutdown_tx.send(true);
    Ok(())
}
