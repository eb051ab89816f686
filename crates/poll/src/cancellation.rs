//! Cancellable waits shared by the poller and the retrier
//!
//! Both suspension points of a poll session go through here: the in-flight
//! fetch and the inter-attempt sleep. Each races the caller's token and the
//! session deadline, so neither a cancellation nor an expiring budget waits
//! for a blind sleep to finish.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

/// Why a wait ended early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Interrupted {
    /// The caller's token fired.
    Cancelled,
    /// The session deadline passed.
    Deadline,
}

/// Sleep for `delay`, or until `deadline` / cancellation, whichever is first.
///
/// Returns `Ok(())` only when the full delay elapsed before the deadline. A
/// delay past the clock's range never elapses.
pub(crate) async fn wait(
    delay: Duration,
    deadline: Option<Instant>,
    token: &CancellationToken,
) -> Result<(), Interrupted> {
    let wake = Instant::now().checked_add(delay);
    let (until, hits_deadline) = match (wake, deadline) {
        (Some(wake), Some(deadline)) if deadline <= wake => (Some(deadline), true),
        (None, Some(deadline)) => (Some(deadline), true),
        (wake, _) => (wake, false),
    };

    tokio::select! {
        biased;
        () = token.cancelled() => Err(Interrupted::Cancelled),
        () = sleep_until_or_never(until) => {
            if hits_deadline {
                Err(Interrupted::Deadline)
            } else {
                Ok(())
            }
        }
    }
}

async fn sleep_until_or_never(until: Option<Instant>) {
    match until {
        Some(until) => sleep_until(until).await,
        None => std::future::pending::<()>().await,
    }
}

/// Drive `future` to completion unless cancelled or the deadline passes first.
///
/// Cancellation wins ties, then the future, then the deadline.
pub(crate) async fn run_until<F>(
    future: F,
    deadline: Option<Instant>,
    token: &CancellationToken,
) -> Result<F::Output, Interrupted>
where
    F: Future,
{
    tokio::select! {
        biased;
        () = token.cancelled() => Err(Interrupted::Cancelled),
        output = future => Ok(output),
        () = sleep_until_or_never(deadline) => Err(Interrupted::Deadline),
    }
}
