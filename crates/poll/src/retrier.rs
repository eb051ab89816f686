//! Fixed-delay retry bounded by an attempt count
//!
//! Used to long-poll a resource's coarse state when there is no operation
//! handle: the action reports "still in progress" as a typed retryable
//! error, and a confirmed terminal failure as one the predicate refuses.
//!
//! ```rust
//! use std::time::Duration;
//! use opwatch_poll::{BoundedRetrier, RetryError};
//!
//! #[derive(Debug, PartialEq)]
//! enum Phase {
//!     InProgress,
//!     Failed,
//! }
//!
//! impl std::fmt::Display for Phase {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{self:?}")
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread", start_paused = true)]
//! # async fn main() {
//! let retrier = BoundedRetrier::new(3, Duration::from_secs(10)).unwrap();
//! let result: Result<(), _> = retrier
//!     .retry(|| async { Err(Phase::InProgress) }, |err| *err == Phase::InProgress)
//!     .await;
//! assert!(matches!(result, Err(RetryError::Exhausted { attempts: 3, .. })));
//! # }
//! ```

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::cancellation::{run_until, wait};
use crate::config::PollConfig;
use crate::error::{ConfigError, RetryError};

/// Retries an action with a fixed delay while a predicate allows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedRetrier {
    max_attempts: u32,
    delay: Duration,
}

impl BoundedRetrier {
    /// At most `max_attempts` calls, `delay` apart.
    pub fn new(max_attempts: u32, delay: Duration) -> Result<Self, ConfigError> {
        if max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        Ok(Self {
            max_attempts,
            delay,
        })
    }

    /// Bound and delay taken from a poll config's `max_attempts` and
    /// `interval`.
    pub fn from_config(config: &PollConfig) -> Self {
        Self {
            max_attempts: config.max_attempts(),
            delay: config.interval(),
        }
    }

    /// Maximum number of calls.
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay between calls.
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Call `action` until it succeeds, `should_retry` refuses its error, or
    /// the attempts run out.
    pub async fn retry<F, Fut, T, E, P>(&self, action: F, should_retry: P) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
        P: FnMut(&E) -> bool,
    {
        self.retry_with_cancel(action, should_retry, &CancellationToken::new())
            .await
    }

    /// Like [`retry`](Self::retry); cancelling `token` interrupts both the
    /// running action and the delay.
    #[tracing::instrument(skip_all, fields(max_attempts = self.max_attempts))]
    pub async fn retry_with_cancel<F, Fut, T, E, P>(
        &self,
        mut action: F,
        mut should_retry: P,
        token: &CancellationToken,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
        P: FnMut(&E) -> bool,
    {
        let mut attempt: u32 = 0;
        let mut last: Option<E> = None;

        loop {
            if token.is_cancelled() {
                return Err(RetryError::Cancelled {
                    attempts: attempt,
                    last,
                });
            }
            attempt += 1;

            let Ok(result) = run_until(action(), None, token).await else {
                tracing::info!(attempt, "retry cancelled");
                return Err(RetryError::Cancelled {
                    attempts: attempt,
                    last,
                });
            };

            match result {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(attempt, "succeeded after retrying");
                    }
                    return Ok(value);
                }
                Err(error) if !should_retry(&error) => {
                    tracing::warn!(attempt, %error, "non-retryable error, stopping");
                    return Err(RetryError::Aborted { attempt, error });
                }
                Err(error) if attempt >= self.max_attempts => {
                    tracing::warn!(attempts = attempt, %error, "retry attempts exhausted");
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: error,
                    });
                }
                Err(error) => {
                    tracing::debug!(attempt, %error, delay = ?self.delay, "retrying");
                    last = Some(error);
                }
            }

            if wait(self.delay, None, token).await.is_err() {
                tracing::info!(attempt, "retry cancelled");
                return Err(RetryError::Cancelled {
                    attempts: attempt,
                    last,
                });
            }
        }
    }
}

/// One-shot retry with an ad hoc bound; `max_attempts` below 1 is treated as 1.
pub async fn retry<F, Fut, T, E, P>(
    action: F,
    should_retry: P,
    max_attempts: u32,
    delay: Duration,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
    P: FnMut(&E) -> bool,
{
    let retrier = BoundedRetrier {
        max_attempts: max_attempts.max(1),
        delay,
    };
    retrier.retry(action, should_retry).await
}
