//! CellGate
//!
//! REST gateway that maps path-addressed cell operations onto a wide-column store.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │                      CELLGATE                         │
//!                 │                                                       │
//!   Client ───────┼─▶ net (keep-alive listeners, one accept loop each)    │
//!                 │      │                                                │
//!                 │      ▼                                                │
//!                 │   http::access_log ─▶ tower-http layers               │
//!                 │      │                                                │
//!                 │      ▼                                                │
//!                 │   http::request (address + operation)                 │
//!                 │      │                                                │
//!                 │      ▼                                                │
//!                 │   http::handlers ─▶ store (get / put / delete / scan) │
//!                 │                                                       │
//!                 │   config · lifecycle · observability                  │
//!                 └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::task::JoinSet;

use cellgate::config::{self, GatewayConfig};
use cellgate::http::RestServer;
use cellgate::lifecycle::{signals, startup};
use cellgate::observability::{self, LoggingError};

/// Exit status when a listener cannot be bound.
const EXIT_BIND_FAILURE: u8 = 255;
/// Exit status when the access log cannot be opened.
const EXIT_ACCESS_LOG: u8 = 2;

#[derive(Parser)]
#[command(name = "cellgate", version)]
#[command(about = "REST gateway for a wide-column store", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on; repeat for several. Replaces configured addresses.
    #[arg(short, long)]
    listen: Vec<String>,

    /// Append access log lines to this file instead of stdout.
    #[arg(long)]
    access_log: Option<PathBuf>,

    /// Runtime worker threads.
    #[arg(short, long)]
    workers: Option<usize>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("cellgate: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = observability::init_logging(&config.observability) {
        eprintln!("cellgate: {}", e);
        return match e {
            LoggingError::AccessLog { .. } => ExitCode::from(EXIT_ACCESS_LOG),
            _ => ExitCode::FAILURE,
        };
    }

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(threads) = config.runtime.worker_threads {
        builder.worker_threads(threads);
    }
    let runtime = match builder.build() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build runtime");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(serve(config))
}

/// Config file (or defaults), then command-line overrides, then validation.
fn load(cli: &Cli) -> Result<GatewayConfig, config::ConfigError> {
    let mut config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => GatewayConfig::default(),
    };

    if !cli.listen.is_empty() {
        config.listener.addresses = cli.listen.clone();
    }
    if let Some(path) = &cli.access_log {
        config.observability.access_log = Some(path.clone());
    }
    if let Some(workers) = cli.workers {
        config.runtime.worker_threads = Some(workers);
    }

    config::validate_config(&config).map_err(config::ConfigError::Validation)?;
    Ok(config)
}

async fn serve(config: GatewayConfig) -> ExitCode {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        addresses = ?config.listener.addresses,
        keepalive_secs = config.listener.keepalive_secs,
        strict_write_ack = config.http.strict_write_ack,
        "cellgate starting"
    );

    let store = match startup::open_store(&config.store).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %e, "Failed to open store");
            return ExitCode::FAILURE;
        }
    };

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => observability::metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let mut server = match RestServer::bind(&config, store).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "Failed to bind listeners");
            return ExitCode::from(EXIT_BIND_FAILURE);
        }
    };

    let mut tasks = JoinSet::new();
    if let Err(e) = server.start(&mut tasks) {
        tracing::error!(error = %e, "Failed to start server");
        return ExitCode::from(EXIT_BIND_FAILURE);
    }
    tracing::info!(addresses = ?server.local_addrs(), "Listening for connections");

    let mut status = ExitCode::SUCCESS;
    tokio::select! {
        _ = signals::wait_for_signal() => {}
        Some(joined) = tasks.join_next() => {
            tracing::error!(result = ?joined, "Accept loop exited unexpectedly");
            status = ExitCode::FAILURE;
        }
    }

    server.stop();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Accept loop failed"),
            Err(e) => tracing::error!(error = %e, "Accept loop panicked"),
        }
    }

    tracing::info!("Shutdown complete");
    status
}
