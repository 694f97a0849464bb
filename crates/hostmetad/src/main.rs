//! hostmetad — per-host metadata service.
//!
//! # Usage
//!
//! ```bash
//! # Serve a previously cached answers file
//! hostmetad --answers /var/lib/hostmeta/answers.json
//!
//! # Subscribe to the upstream and keep the snapshot fresh
//! HOSTMETA_URL=https://upstream.example \
//! HOSTMETA_ACCESS_KEY=ak HOSTMETA_SECRET_KEY=sk \
//! hostmetad --subscribe
//! ```
//!
//! Containers query `http://<host>/latest/self/...`; `POST /v1/reload` on
//! the loopback listener (or SIGHUP) forces a reload of the local sources.

mod connector;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hostmeta_server::{
    build_metadata_router, build_reload_router, AppState, ControllerConfig, MetadataController,
    SourceCoordinates,
};

use crate::connector::IdleConnector;

/// Per-host metadata service
#[derive(Parser, Debug)]
#[command(name = "hostmetad")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Address to serve metadata lookups on
    #[arg(long, default_value = "0.0.0.0:80")]
    listen: SocketAddr,

    /// Loopback address for reload requests
    #[arg(long, default_value = "127.0.0.1:8112")]
    listen_reload: SocketAddr,

    /// File caching the last delta across restarts
    #[arg(long, default_value = "./answers.json")]
    answers: String,

    /// Subscribe to the upstream event stream
    #[arg(long)]
    subscribe: bool,

    /// Minimum milliseconds between downloads per source
    #[arg(long, default_value_t = 1000)]
    reload_interval_ms: u64,

    /// Trust X-Forwarded-For for the client identity
    #[arg(long)]
    xff: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;
    info!("starting hostmetad");

    let local = SourceCoordinates {
        url: std::env::var("HOSTMETA_URL").unwrap_or_default(),
        access_key: std::env::var("HOSTMETA_ACCESS_KEY").unwrap_or_default(),
        secret_key: std::env::var("HOSTMETA_SECRET_KEY").unwrap_or_default(),
    };

    let controller = MetadataController::new(
        ControllerConfig {
            subscribe: cli.subscribe,
            answers_file_prefix: cli.answers.clone(),
            reload_interval: Duration::from_millis(cli.reload_interval_ms),
            local,
        },
        Arc::new(|_| Arc::new(IdleConnector)),
    );
    controller
        .start()
        .context("cannot start without a valid answers source")?;

    watch_signals(Arc::clone(&controller));

    let reload_app = build_reload_router(AppState::new(Arc::clone(&controller), cli.xff));
    let reload_listener = tokio::net::TcpListener::bind(cli.listen_reload)
        .await
        .with_context(|| format!("failed to bind reload listener {}", cli.listen_reload))?;
    info!("listening for reload on {}", cli.listen_reload);
    tokio::spawn(async move {
        if let Err(err) = axum::serve(reload_listener, reload_app).await {
            warn!(%err, "reload listener exited");
        }
    });

    let app = build_metadata_router(AppState::new(Arc::clone(&controller), cli.xff));
    let listener = tokio::net::TcpListener::bind(cli.listen)
        .await
        .with_context(|| format!("failed to bind {}", cli.listen))?;
    info!("listening on {}", cli.listen);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server exited")?;

    controller.stop();
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        warn!("failed to install shutdown handler");
        std::future::pending::<()>().await;
    }
}

/// SIGHUP reloads the local sources, same as `POST /v1/reload`.
#[cfg(unix)]
fn watch_signals(controller: Arc<MetadataController>) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(stream) => stream,
            Err(err) => {
                warn!(%err, "failed to install SIGHUP handler");
                return;
            }
        };
        while hangup.recv().await.is_some() {
            info!("received HUP signal, reloading");
            if let Err(err) = controller.reload_local() {
                warn!(%err, "reload failed");
            }
        }
    });
}

#[cfg(not(unix))]
fn watch_signals(_controller: Arc<MetadataController>) {}

/// Initialize the tracing subscriber for logging.
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|err| anyhow::anyhow!("invalid log level: {err}"))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();

    Ok(())
}
