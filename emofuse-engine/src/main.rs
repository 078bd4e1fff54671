//! emofuse - Main entry point
//!
//! Runs the fusion engine behind its HTTP/SSE API, with a background sweep
//! dropping stale observations.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

use emofuse_engine::api;
use emofuse_engine::config::{ConfigOverrides, ServiceConfig};
use emofuse_engine::fusion::{spawn_gc_task, FusionEngine};
use emofuse_engine::logging;

/// Command-line arguments for emofuse
#[derive(Parser, Debug)]
#[command(name = "emofuse")]
#[command(about = "Confidence-weighted face/audio emotion fusion service")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "EMOFUSE_PORT")]
    port: Option<u16>,

    /// Path to the TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing before loading config so config loading is logged
    let (subscriber, log_filter) =
        logging::subscriber(EnvFilter::try_from_default_env().ok(), std::io::stdout);
    subscriber.init();

    let config = ServiceConfig::load(&ConfigOverrides {
        port: args.port,
        config_path: args.config,
    })
    .context("Failed to load configuration")?;

    // RUST_LOG wins over the config file
    if let Err(e) = log_filter.apply(&config.log_directive) {
        warn!("Ignoring log level '{}': {}", config.log_directive, e);
    }

    info!("Starting emofuse v{} on port {}", env!("CARGO_PKG_VERSION"), config.port);
    info!(
        "Trigger policy {:?}, freshness window {} ms",
        config.engine.store.trigger_policy, config.engine.store.freshness_window_ms
    );

    let engine = Arc::new(FusionEngine::new(config.engine.clone()));
    let gc_task = spawn_gc_task(Arc::clone(&engine), config.gc_interval, config.max_age);

    let app = api::create_router(api::AppState {
        engine,
        port: config.port,
        keep_alive: config.keep_alive,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    gc_task.abort();
    info!("emofuse stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM, letting in-flight requests and SSE
/// streams finish
async fn shutdown_signal() {
    let interrupt = async {
        signal::ctrl_c()
            .await
            .expect("Ctrl+C listener unavailable");
    };

    #[cfg(unix)]
    let sigterm = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM listener unavailable")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    let source = tokio::select! {
        _ = interrupt => "interrupt",
        _ = sigterm => "SIGTERM",
    };
    info!("emofuse stopping on {}, draining connections", source);
}
