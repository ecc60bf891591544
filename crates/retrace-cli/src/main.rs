//! `retrace` – compliant trajectory replay, from the command line.
//!
//! One invocation performs one replay run:
//!
//! 1. Initialise structured logging (`RUST_LOG` filter; set
//!    `RETRACE_LOG_FORMAT=json` for newline-delimited JSON suitable for
//!    log aggregators).
//! 2. Load and validate the TOML configuration, apply environment
//!    overrides (`RETRACE_DATA_DIR`, `RETRACE_TELEMETRY_PATH`).
//! 3. Install a Ctrl-C handler that raises the shutdown flag; the replay
//!    loop observes it at the next tick boundary and stops.
//! 4. Submit the run and map its outcome to the exit code: 0 when the
//!    trajectory completed, 1 when it stopped early (halt, force/torque
//!    limit, cancellation, shutdown), 2 on a fault.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;

use clap::Parser;
use tracing::{error, info, warn};

use retrace_engine::config::ReplayConfig;
use retrace_engine::controller::ReplayController;
use retrace_types::RunRequest;

#[derive(Parser)]
#[command(name = "retrace")]
#[command(about = "Replay a recorded trajectory with force/torque compliance", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "retrace.toml")]
    config: PathBuf,

    /// Recording prefix; arm files are read from
    /// `<data_dir>/<prefix>_arm<N>_processed.csv`
    prefix: String,
}

fn init_logging() {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    if std::env::var("RETRACE_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .compact()
            .init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    // `load` validates and applies the RETRACE_* environment overrides.
    let config = match ReplayConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!(path = %cli.config.display(), error = %e, "cannot load configuration");
            return ExitCode::from(2);
        }
    };

    let controller = match ReplayController::new(config) {
        Ok(controller) => controller,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::from(2);
        }
    };

    // Ctrl-C requests a graceful stop: the loop observes the flag at its
    // next tick boundary rather than the process dying mid-command.
    let shutdown = controller.shutdown_flag();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("Ctrl-C received, stopping replay …");
        shutdown.store(true, Ordering::Release);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    let request = RunRequest::new(&cli.prefix);
    info!(request = %request.id, prefix = %cli.prefix, "submitting replay run");

    match controller.run(request).await {
        Ok(outcome) if outcome.successful => {
            info!("trajectory replay completed");
            ExitCode::SUCCESS
        }
        Ok(outcome) => {
            warn!(reason = ?outcome.reason, "trajectory replay stopped early");
            ExitCode::from(1)
        }
        Err(e) => {
            error!(error = %e, "trajectory replay failed");
            ExitCode::from(2)
        }
    }
}
