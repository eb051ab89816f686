//! Single-operation poller
//!
//! [`OperationPoller`] drives one long-running remote operation to a terminal
//! state. It fetches immediately, classifies what it sees, and sleeps
//! `interval` between in-progress observations until the resource is terminal,
//! `total_timeout` expires, a fetch fails, or the caller cancels.
//!
//! Fetches within one session are strictly sequential.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::cancellation::{Interrupted, run_until, wait};
use crate::classify::{Bucket, Classify};
use crate::config::PollConfig;
use crate::error::{BoxError, FetchError};
use crate::observability::{PollEvent, PollHooks};
use crate::observation::Observation;
use crate::outcome::PollOutcome;
use crate::timeout::bounded;

type FetchRetryPolicy = Arc<dyn Fn(&FetchError) -> bool + Send + Sync>;

/// Polls one remote operation until it is terminal.
///
/// Cloning is cheap; clones share the classifier table, retry policy and
/// hooks.
#[derive(Clone)]
pub struct OperationPoller<C> {
    config: PollConfig,
    classifier: C,
    label: String,
    retry_fetch: Option<FetchRetryPolicy>,
    hooks: PollHooks,
}

impl<C> OperationPoller<C> {
    /// Poller using `classifier` under `config`.
    ///
    /// Fetch errors are fatal unless [`retry_fetch_errors`](Self::retry_fetch_errors)
    /// says otherwise.
    pub fn new(config: PollConfig, classifier: C) -> Self {
        Self {
            config,
            classifier,
            label: String::from("operation"),
            retry_fetch: None,
            hooks: PollHooks::new(),
        }
    }

    /// Label used in logs and hook events.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Keep polling after a fetch error whenever `predicate` returns `true`.
    ///
    /// Retried errors wait the normal interval and still count against
    /// `total_timeout`. Per-attempt timeouts go through the same predicate
    /// (see [`FetchError::is_attempt_timeout`]).
    pub fn retry_fetch_errors<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&FetchError) -> bool + Send + Sync + 'static,
    {
        self.retry_fetch = Some(Arc::new(predicate));
        self
    }

    /// Attach observability hooks.
    pub fn with_hooks(mut self, hooks: PollHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Polling parameters.
    pub const fn config(&self) -> &PollConfig {
        &self.config
    }

    /// State classifier.
    pub const fn classifier(&self) -> &C {
        &self.classifier
    }

    /// Label used in logs and hook events.
    pub fn label(&self) -> &str {
        &self.label
    }

    fn should_retry(&self, err: &FetchError) -> bool {
        self.retry_fetch
            .as_ref()
            .is_some_and(|predicate| predicate(err))
    }

    /// Poll until terminal, timeout or fetch error.
    pub async fn poll<F, Fut, T, E>(&self, fetch: F) -> PollOutcome<T>
    where
        C: Classify<T::State>,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<BoxError>,
        T: Observation,
        T::State: fmt::Display,
    {
        self.poll_with_cancel(fetch, &CancellationToken::new()).await
    }

    /// Like [`poll`](Self::poll), but stops with [`PollOutcome::Cancelled`]
    /// as soon as `token` fires, whether the session is fetching or sleeping.
    #[tracing::instrument(skip_all, fields(operation = %self.label))]
    pub async fn poll_with_cancel<F, Fut, T, E>(
        &self,
        mut fetch: F,
        token: &CancellationToken,
    ) -> PollOutcome<T>
    where
        C: Classify<T::State>,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<BoxError>,
        T: Observation,
        T::State: fmt::Display,
    {
        let started = Instant::now();
        // A budget past the clock's range never expires.
        let deadline = started.checked_add(self.config.total_timeout());
        let mut attempts: u32 = 0;
        let mut last_observed: Option<T> = None;

        let outcome = loop {
            if token.is_cancelled() {
                break PollOutcome::Cancelled {
                    last_observed,
                    attempts,
                };
            }

            attempts = attempts.saturating_add(1);
            self.hooks.emit(PollEvent::AttemptStarted {
                operation: self.label.clone(),
                attempt: attempts,
            });

            let attempt = bounded(self.config.per_attempt_timeout(), fetch());
            let failure = match run_until(attempt, deadline, token).await {
                Err(Interrupted::Cancelled) => {
                    break PollOutcome::Cancelled {
                        last_observed,
                        attempts,
                    };
                }
                Err(Interrupted::Deadline) => {
                    break PollOutcome::TimedOut {
                        last_observed,
                        attempts,
                        elapsed: started.elapsed(),
                    };
                }
                Ok(Err(timeout)) => Some(FetchError::attempt_timed_out(attempts, timeout.limit)),
                Ok(Ok(Err(err))) => Some(FetchError::remote(attempts, err)),
                Ok(Ok(Ok(value))) => {
                    let state = value.state();
                    match self.classifier.classify(&state) {
                        Ok(Bucket::Succeeded) => break PollOutcome::TerminalSuccess(value),
                        Ok(Bucket::Failed) => {
                            let details = value.diagnostics();
                            break PollOutcome::TerminalFailure {
                                state: value,
                                details,
                            };
                        }
                        Err(error) => {
                            break PollOutcome::UnknownState {
                                observed: value,
                                error,
                            };
                        }
                        Ok(Bucket::InProgress) => {
                            tracing::debug!(attempt = attempts, %state, "operation still in progress");
                            self.hooks.emit(PollEvent::InProgress {
                                operation: self.label.clone(),
                                attempt: attempts,
                                state: state.to_string(),
                            });
                            last_observed = Some(value);
                            None
                        }
                    }
                }
            };

            if let Some(err) = failure {
                let retrying = self.should_retry(&err);
                tracing::warn!(attempt = attempts, error = %err, retrying, "status fetch failed");
                self.hooks.emit(PollEvent::FetchFailed {
                    operation: self.label.clone(),
                    attempt: attempts,
                    error: err.to_string(),
                    retrying,
                });
                if !retrying {
                    break PollOutcome::FetchError(err);
                }
            }

            match wait(self.config.interval(), deadline, token).await {
                Ok(()) => {}
                Err(Interrupted::Deadline) => {
                    break PollOutcome::TimedOut {
                        last_observed,
                        attempts,
                        elapsed: started.elapsed(),
                    };
                }
                Err(Interrupted::Cancelled) => {
                    break PollOutcome::Cancelled {
                        last_observed,
                        attempts,
                    };
                }
            }
        };

        let elapsed = started.elapsed();
        if outcome.is_terminal() {
            tracing::info!(attempts, ?elapsed, "{}", outcome.describe());
        } else {
            tracing::warn!(attempts, ?elapsed, "{}", outcome.describe());
        }
        self.hooks.emit(PollEvent::Finished {
            operation: self.label.clone(),
            attempts,
            outcome: outcome.kind(),
            elapsed,
        });

        outcome
    }
}

impl<C: fmt::Debug> fmt::Debug for OperationPoller<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationPoller")
            .field("config", &self.config)
            .field("classifier", &self.classifier)
            .field("label", &self.label)
            .field("retry_fetch", &self.retry_fetch.is_some())
            .field("hooks", &self.hooks)
            .finish()
    }
}

/// Poll `fetch` once to completion with a fresh [`OperationPoller`].
pub async fn poll<C, F, Fut, T, E>(fetch: F, config: PollConfig, classifier: C) -> PollOutcome<T>
where
    C: Classify<T::State>,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<BoxError>,
    T: Observation,
    T::State: fmt::Display,
{
    OperationPoller::new(config, classifier).poll(fetch).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::StateClassifier;
    use crate::error::UnknownState;
    use crate::observability::PollHook;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn jobs() -> StateClassifier<String> {
        StateClassifier::builder("job")
            .in_progress(["PENDING".to_string(), "RUNNING".to_string()])
            .succeeded(["DONE".to_string()])
            .failed(["FAILED".to_string()])
            .build()
            .unwrap()
    }

    fn config() -> PollConfig {
        PollConfig::new(Duration::from_secs(10), Duration::from_secs(60)).unwrap()
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<PollEvent>>);

    impl PollHook for Recorder {
        fn on_event(&self, event: &PollEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn walks_through_in_progress_states() {
        let script = Mutex::new(vec!["DONE", "RUNNING", "PENDING"]);
        let poller = OperationPoller::new(config(), jobs());
        let started = Instant::now();

        let outcome = poller
            .poll(|| {
                let next = script.lock().unwrap().pop().unwrap_or("DONE").to_string();
                async move { Ok::<_, BoxError>(next) }
            })
            .await;

        assert_eq!(outcome.success().map(String::as_str), Some("DONE"));
        assert_eq!(started.elapsed(), Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn retried_fetch_errors_keep_polling() {
        let calls = AtomicU32::new(0);
        let poller = OperationPoller::new(config(), jobs()).retry_fetch_errors(|_| true);

        let outcome = poller
            .poll(|| {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if call < 2 {
                        Err("503 service unavailable")
                    } else {
                        Ok(String::from("DONE"))
                    }
                }
            })
            .await;

        assert!(outcome.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn unknown_state_is_fatal() {
        let outcome = poll(
            || async { Ok::<_, BoxError>(String::from("ARCHIVED")) },
            config(),
            jobs(),
        )
        .await;

        match outcome {
            PollOutcome::UnknownState { observed, error } => {
                assert_eq!(observed, "ARCHIVED");
                assert_eq!(error, UnknownState::new("job", "ARCHIVED"));
            }
            other => panic!("expected UnknownState, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hooks_observe_the_session() {
        let recorder = Arc::new(Recorder::default());
        let poller = OperationPoller::new(config(), jobs())
            .with_label("nightly-build")
            .with_hooks(PollHooks::new().with_hook(recorder.clone()));
        let script = Mutex::new(vec!["FAILED", "RUNNING"]);

        let outcome = poller
            .poll(|| {
                let next = script.lock().unwrap().pop().unwrap_or("FAILED").to_string();
                async move { Ok::<_, BoxError>(next) }
            })
            .await;
        assert!(matches!(outcome, PollOutcome::TerminalFailure { .. }));

        let events = recorder.0.lock().unwrap();
        assert_eq!(events.len(), 4);
        assert_eq!(
            events[1],
            PollEvent::InProgress {
                operation: "nightly-build".into(),
                attempt: 1,
                state: "RUNNING".into(),
            }
        );
        assert!(matches!(
            events[3],
            PollEvent::Finished {
                attempts: 2,
                outcome: crate::OutcomeKind::Failed,
                ..
            }
        ));
    }
}
