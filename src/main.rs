//! Payments Pipeline CLI
//!
//! Runs the payments pipeline as a long-lived service.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- --config pipeline.toml
//! cargo run -- --config pipeline.toml --log-format json --log-level payments_pipeline=debug
//! PIPELINE_PIPELINE__BATCH_TARGET=sql cargo run
//! ```
//!
//! The program polls the configured drop directory, transforms each payment
//! batch and delivers it to the queue, from where every message is stored with
//! the configured SQL statement. It runs until interrupted with Ctrl-C.
//!
//! # Exit Codes
//!
//! - 0: Clean shutdown
//! - 1: Error (invalid configuration, database unavailable, runtime failure, etc.)

use payments_pipeline::cli::{self, CliArgs, LogFormat};
use payments_pipeline::{Application, RoutingConfig};
use std::process;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(args: &CliArgs) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match args.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn run(args: &CliArgs) -> payments_pipeline::Result<()> {
    let config = RoutingConfig::load(args.config.as_deref())?;
    let app = Application::build(config)?;

    // Multi-threaded runtime with the configured number of worker threads
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(args.worker_threads())
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl-C"),
                Err(e) => {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                    return;
                }
            }
            signal.cancel();
        });

        app.run(shutdown).await
    })
}

fn main() {
    // Parse command-line arguments using clap
    let args = cli::parse_args();
    init_logging(&args);

    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
