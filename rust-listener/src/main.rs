//! Incubator Listener - async RabbitMQ listener for incubator records.
//!
//! Subscribes to the incubator exchange with an exclusive queue and emits
//! every received message once per tick until SIGINT/SIGTERM.

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use listener::{BrokerListener, ListenerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("listener_starting");

    let config = ListenerConfig::from_env();
    info!(
        host = %config.host,
        port = config.port,
        exchange = %config.exchange,
        routing_keys = ?config.routing_keys,
        tick_interval_ms = config.tick_interval.as_millis() as u64,
        "config_loaded"
    );

    let mut listener = BrokerListener::new(config);
    listener.subscribe(|message: &str| {
        info!(body_length = message.len(), message = %message, "message_emitted");
    });

    // Single attempt; the error has already been logged
    listener
        .start()
        .await
        .context("Failed to start listener")?;

    info!("listener_ready");

    let emitted = listener.run_until(shutdown_signal()).await;
    let connected = listener.is_connected();
    listener.shutdown().await;

    info!(
        emitted = emitted,
        connected_at_shutdown = connected,
        "listener_shutdown_complete"
    );
    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "sigint_handler_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "sigterm_handler_failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
