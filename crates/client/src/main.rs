//! `media-client` binary entry point.
//!
//! Startup sequence:
//! 1. Parse the command line.
//! 2. Load and validate [`Config`] from environment variables.
//! 3. Initialise structured JSON logging.
//! 4. Build the HTTPS client and run the requested command.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use common::QueryCriteria;
use tracing::error;

use client::{telemetry, Config, HttpsClient};

#[derive(Parser)]
#[command(name = "media-client")]
#[command(about = "Download recordings and query recording metadata over HTTPS", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a file from the server's download area
    Download {
        /// Path below the download prefix, e.g. `2024/01/call.mp3`
        remote: String,
        /// Local file to create; must not exist
        dest: PathBuf,
    },
    /// Query recording metadata and print the results as JSON
    Query {
        #[arg(long)]
        project_id: String,
        #[arg(long)]
        date_from: String,
        #[arg(long)]
        date_to: String,
        #[arg(long)]
        theme: Option<String>,
        #[arg(long)]
        pin: Option<String>,
        /// May be repeated
        #[arg(long = "agent-id")]
        agent_id: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // -----------------------------------------------------------------------
    // 1. Command line
    // -----------------------------------------------------------------------
    let cli = Cli::parse();

    // -----------------------------------------------------------------------
    // 2. Configuration
    // -----------------------------------------------------------------------
    let cfg = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("ERROR: client configuration invalid: {e:#}");
            return ExitCode::from(2);
        }
    };

    // -----------------------------------------------------------------------
    // 3. Telemetry
    // -----------------------------------------------------------------------
    if let Err(e) = telemetry::init(&cfg.log_level) {
        eprintln!("ERROR: {e:#}");
        return ExitCode::from(3);
    }

    // -----------------------------------------------------------------------
    // 4. Client + command
    // -----------------------------------------------------------------------
    let client = match HttpsClient::from_config(&cfg) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %format!("{e:#}"), "failed to build client");
            return ExitCode::from(4);
        }
    };

    let outcome = match cli.command {
        Commands::Download { remote, dest } => client
            .download(&remote, &dest)
            .await
            .map(|bytes| println!("{bytes} bytes written to {}", dest.display())),
        Commands::Query {
            project_id,
            date_from,
            date_to,
            theme,
            pin,
            agent_id,
        } => {
            let criteria = QueryCriteria {
                theme,
                pin,
                agent_id,
                ..QueryCriteria::new(project_id, date_from, date_to)
            };
            client.query(&criteria).await.and_then(|results| {
                println!("{}", serde_json::to_string_pretty(&results)?);
                Ok(())
            })
        }
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "request failed");
            eprintln!("ERROR: {e}");
            ExitCode::FAILURE
        }
    }
}
