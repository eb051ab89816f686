//! `opwatch wait`

use std::process::ExitCode;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use opwatch_deploy::{ProcessRunner, TokioProcessRunner};
use opwatch_poll::{BoxError, LoggingHook, OperationPoller, OutcomeKind, PollHooks, PollOutcome};

use crate::cli::WaitArgs;
use crate::settings::Settings;

/// Exit status of a resource that failed or did not settle in time.
pub const EXIT_FAILED: u8 = 1;
/// Exit status when the outcome could not be determined.
pub const EXIT_ERROR: u8 = 2;

pub async fn run(args: &WaitArgs, token: &CancellationToken) -> anyhow::Result<ExitCode> {
    let plan = Settings::load(args.config.as_deref())?
        .with_flags(args)
        .resolve()?;
    let program = args.command.first().map_or("command", String::as_str);

    tracing::info!(
        %program,
        interval = ?plan.config.interval(),
        timeout = ?plan.config.total_timeout(),
        resource = plan.classifier.resource(),
        "waiting for a terminal state"
    );

    let mut poller = OperationPoller::new(plan.config, plan.classifier)
        .with_label(program)
        .with_hooks(PollHooks::new().with_hook(Arc::new(LoggingHook::new())));
    if plan.retry_fetch_errors {
        poller = poller.retry_fetch_errors(|_| true);
    }

    let runner = TokioProcessRunner::new();
    let pointer = plan.state_pointer.as_deref();
    let outcome = poller
        .poll_with_cancel(|| fetch_state(&runner, &args.command, pointer), token)
        .await;

    println!("{}", outcome.describe());
    Ok(exit_code(&outcome))
}

async fn fetch_state<P: ProcessRunner>(
    runner: &P,
    argv: &[String],
    pointer: Option<&str>,
) -> Result<String, BoxError> {
    let program = argv.first().map_or("command", String::as_str);
    let stdout = runner.run(argv).await?.into_stdout(program)?;
    extract_state(&stdout, pointer)
}

/// The state reported in a status command's output.
pub fn extract_state(stdout: &str, pointer: Option<&str>) -> Result<String, BoxError> {
    let Some(pointer) = pointer else {
        let state = stdout.trim();
        if state.is_empty() {
            return Err("status command printed nothing".into());
        }
        return Ok(state.to_string());
    };

    let document: Value = serde_json::from_str(stdout)?;
    match document.pointer(pointer) {
        Some(Value::String(state)) => Ok(state.clone()),
        None | Some(Value::Null) => Err(format!("no state at {pointer} in status output").into()),
        Some(other) => Ok(other.to_string()),
    }
}

pub fn exit_code<T>(outcome: &PollOutcome<T>) -> ExitCode {
    match outcome.kind() {
        OutcomeKind::Succeeded => ExitCode::SUCCESS,
        OutcomeKind::Failed | OutcomeKind::TimedOut => ExitCode::from(EXIT_FAILED),
        OutcomeKind::FetchError | OutcomeKind::UnknownState | OutcomeKind::Cancelled => {
            ExitCode::from(EXIT_ERROR)
        }
    }
}
