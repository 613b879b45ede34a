//! `media-server` binary entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise the telemetry pipeline (OTEL + tracing).
//! 3. Load TLS material, the file root and the catalog; bind the listener.
//! 4. Serve until Ctrl-C, then stop accepting.
//!
//! Each startup failure exits with the code given by [`BootstrapError::exit_code`].

use std::process::ExitCode;

use tracing::{error, info};

use server::{telemetry, BootstrapError, Config};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "startup failed");
            eprintln!("ERROR: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), BootstrapError> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(BootstrapError::Config)?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(cfg.otel_exporter_otlp_endpoint.as_deref(), &cfg.log_level)
        .map_err(BootstrapError::Telemetry)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = cfg.port,
        "media-server starting"
    );

    // -----------------------------------------------------------------------
    // 3. TLS, responders, catalog, listener
    // -----------------------------------------------------------------------
    let running = server::start(&cfg).await?;

    // -----------------------------------------------------------------------
    // 4. Serve until interrupted
    // -----------------------------------------------------------------------
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutdown requested");
    running.stop().await;

    Ok(())
}
