//! Error types for polling, fan-out and retry operations.

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use crate::classify::Bucket;

/// Transport or API error returned by a caller-supplied fetch function.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Invalid poll, retry or classifier configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A duration that drives the polling cadence or budget was zero.
    #[error("{field} must be greater than zero")]
    ZeroDuration {
        /// Name of the offending option.
        field: &'static str,
    },

    /// An attempt bound of zero would never call the action.
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,

    /// A classifier table assigned one state to two buckets.
    #[error("state {state} is mapped to both {first} and {second}")]
    ConflictingState {
        /// Rendered state value.
        state: String,
        /// Bucket the state was first assigned to.
        first: Bucket,
        /// Conflicting bucket.
        second: Bucket,
    },
}

/// A single status fetch ran past its per-attempt deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("attempt exceeded its deadline of {limit:?}")]
pub struct AttemptTimeout {
    /// The per-attempt deadline that was exceeded.
    pub limit: Duration,
}

/// Why a status fetch failed.
#[derive(Debug, thiserror::Error)]
pub enum FetchErrorKind {
    /// The remote call itself returned an error.
    #[error("remote error: {0}")]
    Remote(#[source] BoxError),

    /// The remote call did not answer within `per_attempt_timeout`.
    #[error(transparent)]
    AttemptTimedOut(#[from] AttemptTimeout),

    /// A fan-out worker panicked before reporting an outcome.
    #[error("poll worker panicked before reporting an outcome")]
    WorkerPanicked,
}

/// Failure to determine an operation's current status.
///
/// Distinct from a deployment failure: the caller could not even learn
/// where the remote operation stands.
#[derive(Debug, thiserror::Error)]
#[error("status fetch failed on attempt {attempt}: {kind}")]
pub struct FetchError {
    /// 1-based attempt number on which the fetch failed.
    pub attempt: u32,
    /// What went wrong.
    #[source]
    pub kind: FetchErrorKind,
}

impl FetchError {
    /// Wrap a remote error observed on `attempt`.
    pub fn remote(attempt: u32, error: impl Into<BoxError>) -> Self {
        Self {
            attempt,
            kind: FetchErrorKind::Remote(error.into()),
        }
    }

    /// A fetch that overran its per-attempt deadline.
    pub fn attempt_timed_out(attempt: u32, limit: Duration) -> Self {
        Self {
            attempt,
            kind: FetchErrorKind::AttemptTimedOut(AttemptTimeout { limit }),
        }
    }

    pub(crate) fn worker_panicked() -> Self {
        Self {
            attempt: 0,
            kind: FetchErrorKind::WorkerPanicked,
        }
    }

    /// Whether the fetch failed by exceeding `per_attempt_timeout`.
    pub fn is_attempt_timeout(&self) -> bool {
        matches!(self.kind, FetchErrorKind::AttemptTimedOut(_))
    }

    /// The underlying remote error, if the remote call returned one.
    pub fn remote_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match &self.kind {
            FetchErrorKind::Remote(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

/// A classifier met a state value outside its known domain.
///
/// Always fatal to a poll session: guessing "in progress" risks polling
/// forever, guessing "succeeded" risks accepting a broken deployment.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {resource} state {state}")]
pub struct UnknownState {
    /// Resource type whose classifier rejected the state.
    pub resource: String,
    /// Rendered state value.
    pub state: String,
}

impl UnknownState {
    /// Build from a resource name and the offending state.
    pub fn new(resource: impl Into<String>, state: impl fmt::Display) -> Self {
        Self {
            resource: resource.into(),
            state: state.to_string(),
        }
    }
}

/// Terminal error of a [`BoundedRetrier`](crate::BoundedRetrier) run.
///
/// Every variant reports how many attempts were made.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Every allowed attempt failed with a retryable error.
    #[error("still failing after {attempts} attempts: {last}")]
    Exhausted {
        /// Attempts made, equal to the configured maximum.
        attempts: u32,
        /// Error from the final attempt.
        last: E,
    },

    /// The predicate refused to retry: a confirmed terminal failure.
    #[error("stopped at attempt {attempt} on a non-retryable error: {error}")]
    Aborted {
        /// Attempt on which the non-retryable error occurred.
        attempt: u32,
        /// The non-retryable error.
        error: E,
    },

    /// The caller cancelled the run.
    #[error("cancelled after {attempts} attempts")]
    Cancelled {
        /// Attempts started before cancellation.
        attempts: u32,
        /// Most recent error, if any attempt had failed.
        last: Option<E>,
    },
}

impl<E> RetryError<E> {
    /// Number of attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } | Self::Cancelled { attempts, .. } => *attempts,
            Self::Aborted { attempt, .. } => *attempt,
        }
    }

    /// The last error produced by the action, if any.
    pub fn last_error(&self) -> Option<&E> {
        match self {
            Self::Exhausted { last, .. } => Some(last),
            Self::Aborted { error, .. } => Some(error),
            Self::Cancelled { last, .. } => last.as_ref(),
        }
    }

    /// Consume into the last error produced by the action, if any.
    pub fn into_last_error(self) -> Option<E> {
        match self {
            Self::Exhausted { last, .. } => Some(last),
            Self::Aborted { error, .. } => Some(error),
            Self::Cancelled { last, .. } => last,
        }
    }

    /// Whether the run stopped because the predicate saw a terminal error.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}

/// One operation of a fan-out that did not reach terminal success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedOperation {
    /// Rendered operation key.
    pub key: String,
    /// Human-readable description of its outcome.
    pub summary: String,
}

/// Combined failure of a fan-out: lists every failed operation, not just the first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanOutError {
    /// Number of operations that were polled.
    pub total: usize,
    /// Every operation that did not succeed, in launch order.
    pub failures: Vec<FailedOperation>,
}

impl fmt::Display for FanOutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} operations did not succeed",
            self.failures.len(),
            self.total
        )?;
        for (i, failure) in self.failures.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{} ({})", failure.key, failure.summary)?;
        }
        Ok(())
    }
}

impl StdError for FanOutError {}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn fetch_error_display_includes_attempt() {
        let err = FetchError::remote(3, "connection reset");
        assert_eq!(
            err.to_string(),
            "status fetch failed on attempt 3: remote error: connection reset"
        );
        assert!(err.remote_error().is_some());
        assert!(!err.is_attempt_timeout());
    }

    #[test]
    fn attempt_timeout_is_flagged() {
        let err = FetchError::attempt_timed_out(2, Duration::from_secs(5));
        assert!(err.is_attempt_timeout());
        assert!(err.remote_error().is_none());
        assert!(err.to_string().contains("5s"));
    }

    #[test]
    fn retry_error_reports_attempt_count() {
        let err: RetryError<&str> = RetryError::Exhausted {
            attempts: 5,
            last: "deployment still in progress",
        };
        assert_eq!(
            err.to_string(),
            "still failing after 5 attempts: deployment still in progress"
        );
        assert_eq!(err.attempts(), 5);

        let err: RetryError<&str> = RetryError::Aborted {
            attempt: 2,
            error: "FAILED",
        };
        assert!(err.is_aborted());
        assert_eq!(err.into_last_error(), Some("FAILED"));
    }

    #[test]
    fn fan_out_error_lists_every_failure() {
        let err = FanOutError {
            total: 3,
            failures: vec![
                FailedOperation {
                    key: "b".into(),
                    summary: "failed in state FAILED".into(),
                },
                FailedOperation {
                    key: "c".into(),
                    summary: "timed out".into(),
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "2 of 3 operations did not succeed: b (failed in state FAILED); c (timed out)"
        );
    }
}
