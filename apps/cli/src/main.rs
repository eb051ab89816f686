//! opwatch: wait for long-running cloud operations to settle.
//!
//! Usage:
//!   opwatch wait --preset infra-manager -- gcloud infra-manager deployments describe web --format=json
//!   opwatch wait --in-progress Progressing --succeeded Healthy --failed Degraded -- ./health.sh
//!   opwatch presets

mod cli;
mod commands;
mod settings;

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use crate::cli::{Cli, Command};
use crate::commands::wait::EXIT_ERROR;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guard = match opwatch_log::init(opwatch_log::Config::from_env().with_service("opwatch"))
    {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("opwatch: logging disabled: {err}");
            None
        }
    };

    let token = CancellationToken::new();
    let on_interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, stopping");
            on_interrupt.cancel();
        }
    });

    let result = match cli.command {
        Command::Wait(args) => commands::wait::run(&args, &token).await,
        Command::Presets => commands::presets::run(&mut io::stdout().lock())
            .map(|()| ExitCode::SUCCESS)
            .map_err(Into::into),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("opwatch: {err:#}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}
