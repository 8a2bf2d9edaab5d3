//! Runpilot - command-line client for projects, jobs and runs

use clap::Parser;
use runpilot::cli::{self, Cli, ExitStatus};
use runpilot::config::ConfigLoader;
use std::process::ExitCode;
use tracing::{debug, warn};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Cli::parse();

    let config = match ConfigLoader::load_or_default(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitStatus::Failure.into();
        }
    };

    if let Err(e) = runpilot::logging::init(&config.logging, args.log_level.as_deref()) {
        eprintln!("error: {}", e);
        return ExitStatus::Usage.into();
    }
    debug!(
        version = runpilot::VERSION,
        config = %args.config.display(),
        "Starting runpilot"
    );

    let status = cli::execute(args.command, config).await;

    if let Some(path) = &args.metrics_out {
        if let Err(e) = runpilot::metrics::write_to_file(path) {
            warn!(error = %e, path = %path.display(), "Failed to write metrics");
        }
    }

    status.into()
}
