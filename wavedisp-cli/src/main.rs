//! wavedisp CLI entry point

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::error;
use tracing_subscriber::util::SubscriberInitExt;

use wavedisp_cli::logging::{open_log_file, subscriber};
use wavedisp_cli::{run, Cli, RunConfig};

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config = RunConfig::from_cli(&cli)?;

    let dir = &config.output.dir;
    let log_file = open_log_file(dir)
        .with_context(|| format!("opening log file in {}", dir.display()))?;
    subscriber(cli.silent, Some(log_file)).init();

    let outcome = match run(&config) {
        Ok(outcome) => outcome,
        Err(err) => {
            error!("{err:#}");
            return Err(err);
        }
    };

    if outcome.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        error!(status = ?outcome.result.status, "sweep did not complete");
        Ok(ExitCode::FAILURE)
    }
}
