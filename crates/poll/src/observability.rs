//! Observability hooks for poll sessions
//!
//! Hooks receive a [`PollEvent`] at each step of a session so callers can
//! count attempts or export metrics without parsing logs.
//!
//! ```rust
//! use std::sync::Arc;
//! use opwatch_poll::observability::{LoggingHook, PollHooks};
//!
//! let hooks = PollHooks::new().with_hook(Arc::new(LoggingHook::new()));
//! assert!(!hooks.is_empty());
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::outcome::OutcomeKind;

/// A step in a poll session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEvent {
    /// A status fetch is about to start.
    AttemptStarted {
        /// Label of the polled operation.
        operation: String,
        /// 1-based attempt number.
        attempt: u32,
    },

    /// A fetch observed a non-terminal state.
    InProgress {
        /// Label of the polled operation.
        operation: String,
        /// 1-based attempt number.
        attempt: u32,
        /// Rendered state.
        state: String,
    },

    /// A fetch failed.
    FetchFailed {
        /// Label of the polled operation.
        operation: String,
        /// 1-based attempt number.
        attempt: u32,
        /// Rendered error.
        error: String,
        /// Whether the session keeps polling.
        retrying: bool,
    },

    /// The session ended.
    Finished {
        /// Label of the polled operation.
        operation: String,
        /// Fetches started.
        attempts: u32,
        /// How the session ended.
        outcome: OutcomeKind,
        /// Time spent in the session.
        elapsed: Duration,
    },
}

impl fmt::Display for PollEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AttemptStarted { operation, attempt } => {
                write!(f, "[{operation}] attempt {attempt} started")
            }
            Self::InProgress {
                operation,
                attempt,
                state,
            } => write!(f, "[{operation}] attempt {attempt}: still {state}"),
            Self::FetchFailed {
                operation,
                attempt,
                error,
                retrying,
            } => {
                let next = if *retrying { "retrying" } else { "giving up" };
                write!(f, "[{operation}] attempt {attempt} failed ({next}): {error}")
            }
            Self::Finished {
                operation,
                attempts,
                outcome,
                elapsed,
            } => write!(
                f,
                "[{operation}] finished as {outcome} after {attempts} attempts in {elapsed:?}"
            ),
        }
    }
}

/// Receiver of [`PollEvent`]s.
pub trait PollHook: Send + Sync {
    /// Called for every event of every session the hook is attached to.
    fn on_event(&self, event: &PollEvent);
}

/// Collection of hooks shared by clones of a poller.
#[derive(Clone, Default)]
pub struct PollHooks {
    hooks: Arc<Vec<Arc<dyn PollHook>>>,
}

impl PollHooks {
    /// No hooks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a hook.
    pub fn with_hook(mut self, hook: Arc<dyn PollHook>) -> Self {
        Arc::make_mut(&mut self.hooks).push(hook);
        self
    }

    /// Deliver `event` to every hook.
    pub fn emit(&self, event: PollEvent) {
        for hook in self.hooks.iter() {
            hook.on_event(&event);
        }
    }

    /// Whether no hook is registered.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Number of registered hooks.
    pub fn len(&self) -> usize {
        self.hooks.len()
    }
}

impl fmt::Debug for PollHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollHooks")
            .field("count", &self.hooks.len())
            .finish()
    }
}

/// Hook that forwards every event to `tracing`.
///
/// Fetch failures are logged at `warn`, finished sessions at `info`, the rest
/// at `debug`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHook;

impl LoggingHook {
    /// Create a logging hook.
    pub const fn new() -> Self {
        Self
    }
}

impl PollHook for LoggingHook {
    fn on_event(&self, event: &PollEvent) {
        match event {
            PollEvent::FetchFailed { .. } => tracing::warn!(target: "opwatch::poll", "{event}"),
            PollEvent::Finished { .. } => tracing::info!(target: "opwatch::poll", "{event}"),
            _ => tracing::debug!(target: "opwatch::poll", "{event}"),
        }
    }
}
