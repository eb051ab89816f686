//! Result of one poll session.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FetchError, UnknownState};
use crate::observation::{Diagnostics, Observation};

/// How a poll session ended.
///
/// Exactly one variant is produced per session. Every variant is a value:
/// a failed deployment is not an `Err`.
#[derive(Debug)]
pub enum PollOutcome<T> {
    /// The resource reached a succeeded state.
    TerminalSuccess(T),

    /// The resource reached a failed state.
    TerminalFailure {
        /// Final observed value.
        state: T,
        /// Structured diagnostics exposed by the remote API.
        details: Diagnostics,
    },

    /// `total_timeout` expired while the resource was still in progress.
    TimedOut {
        /// Last value observed before the budget ran out, if any fetch
        /// completed.
        last_observed: Option<T>,
        /// Fetches started.
        attempts: u32,
        /// Wall-clock time spent in the session.
        elapsed: Duration,
    },

    /// The status could not be fetched.
    FetchError(FetchError),

    /// The classifier rejected the observed state.
    UnknownState {
        /// Value carrying the unrecognised state.
        observed: T,
        /// Classifier rejection.
        error: UnknownState,
    },

    /// The caller cancelled the session.
    Cancelled {
        /// Last value observed before cancellation.
        last_observed: Option<T>,
        /// Fetches started.
        attempts: u32,
    },
}

/// Variant tag of a [`PollOutcome`], for logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// [`PollOutcome::TerminalSuccess`].
    Succeeded,
    /// [`PollOutcome::TerminalFailure`].
    Failed,
    /// [`PollOutcome::TimedOut`].
    TimedOut,
    /// [`PollOutcome::FetchError`].
    FetchError,
    /// [`PollOutcome::UnknownState`].
    UnknownState,
    /// [`PollOutcome::Cancelled`].
    Cancelled,
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::FetchError => "fetch_error",
            Self::UnknownState => "unknown_state",
            Self::Cancelled => "cancelled",
        })
    }
}

impl<T> PollOutcome<T> {
    /// Variant tag.
    pub const fn kind(&self) -> OutcomeKind {
        match self {
            Self::TerminalSuccess(_) => OutcomeKind::Succeeded,
            Self::TerminalFailure { .. } => OutcomeKind::Failed,
            Self::TimedOut { .. } => OutcomeKind::TimedOut,
            Self::FetchError(_) => OutcomeKind::FetchError,
            Self::UnknownState { .. } => OutcomeKind::UnknownState,
            Self::Cancelled { .. } => OutcomeKind::Cancelled,
        }
    }

    /// Whether the resource reached a succeeded state.
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::TerminalSuccess(_))
    }

    /// Whether the remote resource itself reached a terminal state.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::TerminalSuccess(_) | Self::TerminalFailure { .. })
    }

    /// Whether the outcome is an infrastructure problem rather than a verdict
    /// about the remote resource.
    pub const fn is_infrastructure_error(&self) -> bool {
        matches!(
            self,
            Self::FetchError(_) | Self::UnknownState { .. } | Self::Cancelled { .. }
        )
    }

    /// The final value, if the session succeeded.
    pub fn success(&self) -> Option<&T> {
        match self {
            Self::TerminalSuccess(value) => Some(value),
            _ => None,
        }
    }

    /// Consume into the final value, if the session succeeded.
    pub fn into_success(self) -> Option<T> {
        match self {
            Self::TerminalSuccess(value) => Some(value),
            _ => None,
        }
    }

    /// Most recent value observed, whatever the outcome.
    pub fn last_observed(&self) -> Option<&T> {
        match self {
            Self::TerminalSuccess(value)
            | Self::TerminalFailure { state: value, .. }
            | Self::UnknownState {
                observed: value, ..
            } => Some(value),
            Self::TimedOut { last_observed, .. } | Self::Cancelled { last_observed, .. } => {
                last_observed.as_ref()
            }
            Self::FetchError(_) => None,
        }
    }
}

impl<T> PollOutcome<T>
where
    T: Observation,
    T::State: fmt::Display,
{
    /// One-line human readable summary, e.g.
    /// `timed out after 60 attempts (30m) in state CREATING`.
    pub fn describe(&self) -> String {
        match self {
            Self::TerminalSuccess(value) => format!("succeeded in state {}", value.state()),
            Self::TerminalFailure { state, details } if details.is_empty() => {
                format!("failed in state {}", state.state())
            }
            Self::TerminalFailure { state, details } => {
                format!("failed in state {}: {details}", state.state())
            }
            Self::TimedOut {
                last_observed,
                attempts,
                elapsed,
            } => {
                let elapsed = Duration::from_secs(elapsed.as_secs());
                match last_observed {
                    Some(value) => format!(
                        "timed out after {attempts} attempts ({elapsed:?}) in state {}",
                        value.state()
                    ),
                    None => format!(
                        "timed out after {attempts} attempts ({elapsed:?}) before any state was observed"
                    ),
                }
            }
            Self::FetchError(err) => err.to_string(),
            Self::UnknownState { error, .. } => error.to_string(),
            Self::Cancelled { attempts, .. } => format!("cancelled after {attempts} attempts"),
        }
    }
}
