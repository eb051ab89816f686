//! Integration tests for `OperationPoller`.
//!
//! All tests run on paused tokio time, so `interval` and `total_timeout`
//! elapse instantly and deterministically.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use opwatch_poll::{
    BoxError, FetchError, OperationError, OperationHandle, OperationPoller, OperationStatus,
    PollConfig, PollOutcome, StateClassifier,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn deployments() -> StateClassifier<String> {
    StateClassifier::builder("deployment")
        .in_progress(["CREATING".to_string(), "UPDATING".to_string()])
        .succeeded(["ACTIVE".to_string()])
        .failed([
            "FAILED".to_string(),
            "SUSPENDED".to_string(),
            "DELETED".to_string(),
            "DELETING".to_string(),
        ])
        .build()
        .unwrap()
}

fn config(interval_secs: u64, total_secs: u64) -> PollConfig {
    PollConfig::new(
        Duration::from_secs(interval_secs),
        Duration::from_secs(total_secs),
    )
    .unwrap()
}

/// Fetch that always reports `state` and counts its calls.
fn constant(
    state: &'static str,
    calls: &Arc<AtomicU32>,
) -> impl FnMut() -> std::future::Ready<Result<String, BoxError>> + use<> {
    let calls = Arc::clone(calls);
    move || {
        calls.fetch_add(1, Ordering::SeqCst);
        std::future::ready(Ok(state.to_string()))
    }
}

// ===========================================================================
// Terminal states
// ===========================================================================

/// A resource that is already terminal costs exactly one fetch and no sleep.
#[tokio::test(start_paused = true)]
async fn immediate_success_fetches_once() {
    let calls = Arc::new(AtomicU32::new(0));
    let started = Instant::now();

    let outcome = OperationPoller::new(config(30, 1800), deployments())
        .poll(constant("ACTIVE", &calls))
        .await;

    assert!(matches!(outcome, PollOutcome::TerminalSuccess(ref s) if s == "ACTIVE"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn failed_operation_carries_structured_diagnostics() {
    let poller = OperationPoller::new(config(15, 1800), StateClassifier::operations());

    let outcome = poller
        .poll(|| async {
            Ok::<_, BoxError>(OperationHandle::<()>::failed(
                "projects/p/locations/l/operations/42",
                OperationError {
                    code: 9,
                    message: "model is serving traffic".into(),
                    details: vec!["traffic split 100% to model 7".into()],
                },
            ))
        })
        .await;

    match outcome {
        PollOutcome::TerminalFailure { state, details } => {
            assert_eq!(state.status(), OperationStatus::Failed);
            assert_eq!(details.code.as_deref(), Some("9"));
            assert_eq!(details.details, vec!["traffic split 100% to model 7"]);
        }
        other => panic!("expected TerminalFailure, got {other:?}"),
    }
}

/// Polling an operation that is already done yields the same outcome every
/// time, with no extra fetches.
#[tokio::test(start_paused = true)]
async fn polling_a_done_operation_is_idempotent() {
    let poller = OperationPoller::new(config(15, 1800), StateClassifier::operations());
    let calls = Arc::new(AtomicU32::new(0));

    for round in 1..=3 {
        let counter = Arc::clone(&calls);
        let outcome = poller
            .poll(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, BoxError>(OperationHandle::succeeded("op-1", "endpoint-9")) }
            })
            .await;

        assert_eq!(
            outcome.success().and_then(OperationHandle::response),
            Some(&"endpoint-9")
        );
        assert_eq!(calls.load(Ordering::SeqCst), round);
    }
}

// ===========================================================================
// Timeouts
// ===========================================================================

/// A resource stuck in progress times out with the last observed state, after
/// roughly `total_timeout / interval` fetches.
#[tokio::test(start_paused = true)]
async fn stuck_resource_times_out_with_last_state() {
    let calls = Arc::new(AtomicU32::new(0));
    let started = Instant::now();

    let outcome = OperationPoller::new(config(30, 1800), deployments())
        .poll(constant("CREATING", &calls))
        .await;

    let fetches = calls.load(Ordering::SeqCst);
    assert!((59..=61).contains(&fetches), "fetched {fetches} times");
    match outcome {
        PollOutcome::TimedOut {
            last_observed,
            attempts,
            elapsed,
        } => {
            assert_eq!(last_observed.as_deref(), Some("CREATING"));
            assert_eq!(attempts, fetches);
            assert_eq!(elapsed, Duration::from_secs(1800));
        }
        other => panic!("expected TimedOut, got {other:?}"),
    }
    assert_eq!(started.elapsed(), Duration::from_secs(1800));
}

/// An uneven budget still fetches within one of `floor(total / interval)`.
#[tokio::test(start_paused = true)]
async fn uneven_budget_stays_within_one_fetch() {
    let calls = Arc::new(AtomicU32::new(0));

    let outcome = OperationPoller::new(config(30, 100), deployments())
        .poll(constant("UPDATING", &calls))
        .await;

    assert!(matches!(outcome, PollOutcome::TimedOut { .. }));
    let fetches = calls.load(Ordering::SeqCst);
    assert!((2..=4).contains(&fetches), "fetched {fetches} times");
}

/// The total budget interrupts a fetch that never returns.
#[tokio::test(start_paused = true)]
async fn total_timeout_interrupts_hanging_fetch() {
    let started = Instant::now();

    let outcome = OperationPoller::new(config(10, 60), deployments())
        .poll(|| std::future::pending::<Result<String, BoxError>>())
        .await;

    match outcome {
        PollOutcome::TimedOut {
            last_observed,
            attempts,
            ..
        } => {
            assert_eq!(last_observed, None);
            assert_eq!(attempts, 1);
        }
        other => panic!("expected TimedOut, got {other:?}"),
    }
    assert_eq!(started.elapsed(), Duration::from_secs(60));
}

/// A fetch that overruns `per_attempt_timeout` is a fetch error for that
/// attempt.
#[tokio::test(start_paused = true)]
async fn slow_fetch_is_a_fetch_error() {
    let config = config(10, 600)
        .with_per_attempt_timeout(Duration::from_secs(5))
        .unwrap();

    let outcome = OperationPoller::new(config, deployments())
        .poll(|| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<_, BoxError>("ACTIVE".to_string())
        })
        .await;

    match outcome {
        PollOutcome::FetchError(err) => {
            assert!(err.is_attempt_timeout());
            assert_eq!(err.attempt, 1);
        }
        other => panic!("expected FetchError, got {other:?}"),
    }
}

/// With a retry predicate, a slow attempt is retried and the session goes on.
#[tokio::test(start_paused = true)]
async fn attempt_timeouts_can_be_retried() {
    let config = config(10, 600)
        .with_per_attempt_timeout(Duration::from_secs(5))
        .unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);

    let outcome = OperationPoller::new(config, deployments())
        .retry_fetch_errors(FetchError::is_attempt_timeout)
        .poll(move || {
            let call = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if call == 0 {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                }
                Ok::<_, BoxError>("ACTIVE".to_string())
            }
        })
        .await;

    assert!(outcome.is_success());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// ===========================================================================
// Fetch errors
// ===========================================================================

/// Without a retry policy the first fetch error ends the session at once.
#[tokio::test(start_paused = true)]
async fn fetch_error_is_not_retried_by_default() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let started = Instant::now();

    let outcome = OperationPoller::new(config(30, 1800), deployments())
        .poll(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<String, _>("connection refused") }
        })
        .await;

    match outcome {
        PollOutcome::FetchError(err) => {
            assert_eq!(err.attempt, 1);
            assert_eq!(
                err.remote_error().map(ToString::to_string).as_deref(),
                Some("connection refused")
            );
        }
        other => panic!("expected FetchError, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(started.elapsed(), Duration::ZERO);
}

/// A predicate can pick which fetch errors are worth another attempt.
#[tokio::test(start_paused = true)]
async fn retry_predicate_is_selective() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);

    let outcome = OperationPoller::new(config(10, 600), deployments())
        .retry_fetch_errors(|err| {
            err.remote_error()
                .is_some_and(|source| source.to_string().contains("503"))
        })
        .poll(move || {
            let call = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                match call {
                    0 => Err("503 service unavailable"),
                    _ => Err("403 permission denied"),
                }
                .map(|()| String::new())
            }
        })
        .await;

    match outcome {
        PollOutcome::FetchError(err) => assert_eq!(err.attempt, 2),
        other => panic!("expected FetchError, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// ===========================================================================
// Durations at the edge of the clock
// ===========================================================================

/// A budget too large to add to the clock means "no deadline", not a panic.
#[tokio::test(start_paused = true)]
async fn unbounded_total_timeout_still_polls() {
    let calls = Arc::new(AtomicU32::new(0));
    let config = PollConfig::new(Duration::from_millis(1), Duration::MAX).unwrap();

    let outcome = OperationPoller::new(config, deployments())
        .poll(constant("ACTIVE", &calls))
        .await;

    assert!(matches!(outcome, PollOutcome::TerminalSuccess(ref s) if s == "ACTIVE"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// An interval past the clock's range sleeps until the budget runs out.
#[tokio::test(start_paused = true)]
async fn unbounded_interval_times_out_on_budget() {
    let calls = Arc::new(AtomicU32::new(0));
    let started = Instant::now();
    let config = PollConfig::new(Duration::MAX, Duration::from_millis(50)).unwrap();

    let outcome = OperationPoller::new(config, deployments())
        .poll(constant("CREATING", &calls))
        .await;

    match outcome {
        PollOutcome::TimedOut {
            last_observed,
            attempts,
            ..
        } => {
            assert_eq!(last_observed.as_deref(), Some("CREATING"));
            assert_eq!(attempts, 1);
        }
        other => panic!("expected TimedOut, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(started.elapsed(), Duration::from_millis(50));
}

// ===========================================================================
// Cancellation
// ===========================================================================

/// Cancelling during the inter-attempt sleep ends the session promptly.
#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_the_sleep() {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(45)).await;
        trigger.cancel();
    });
    let calls = Arc::new(AtomicU32::new(0));
    let started = Instant::now();

    let outcome = OperationPoller::new(config(30, 1800), deployments())
        .poll_with_cancel(constant("CREATING", &calls), &token)
        .await;

    match outcome {
        PollOutcome::Cancelled {
            last_observed,
            attempts,
        } => {
            assert_eq!(last_observed.as_deref(), Some("CREATING"));
            assert_eq!(attempts, 2);
        }
        other => panic!("expected Cancelled, got {other:?}"),
    }
    assert_eq!(started.elapsed(), Duration::from_secs(45));
}

#[tokio::test(start_paused = true)]
async fn already_cancelled_token_never_fetches() {
    let token = CancellationToken::new();
    token.cancel();
    let calls = Arc::new(AtomicU32::new(0));

    let outcome = OperationPoller::new(config(30, 1800), deployments())
        .poll_with_cancel(constant("ACTIVE", &calls), &token)
        .await;

    assert!(matches!(outcome, PollOutcome::Cancelled { attempts: 0, .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
