//! Terminal-state classification
//!
//! Every provider has its own state enum, but the poller only cares which of
//! three buckets a state falls into. The mapping is supplied as data (a
//! [`StateClassifier`] table) so one polling algorithm serves every provider.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, UnknownState};

/// Abstract progress bucket of a remote resource state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    /// Not yet terminal; always re-polled.
    InProgress,
    /// Terminal success.
    Succeeded,
    /// Terminal failure (failed, suspended, deleted, ...).
    Failed,
}

impl Bucket {
    /// Whether no further autonomous transition is expected.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProgress => write!(f, "in-progress"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Maps a state value to its [`Bucket`].
///
/// Implemented by [`StateClassifier`] and by any
/// `Fn(&S) -> Result<Bucket, UnknownState>` closure.
pub trait Classify<S> {
    /// Classify `state`, or reject it as outside the known domain.
    fn classify(&self, state: &S) -> Result<Bucket, UnknownState>;

    /// Whether `state` is terminal.
    fn is_terminal(&self, state: &S) -> Result<bool, UnknownState> {
        self.classify(state).map(Bucket::is_terminal)
    }
}

impl<S, F> Classify<S> for F
where
    F: Fn(&S) -> Result<Bucket, UnknownState>,
{
    fn classify(&self, state: &S) -> Result<Bucket, UnknownState> {
        self(state)
    }
}

/// Table-driven classifier for one resource type.
///
/// Cloning is cheap: the table is shared.
#[derive(Debug, Clone)]
pub struct StateClassifier<S> {
    resource: Arc<str>,
    table: Arc<HashMap<S, Bucket>>,
}

impl<S> StateClassifier<S>
where
    S: Eq + Hash + fmt::Display,
{
    /// Start a table for `resource` (used in [`UnknownState`] messages).
    pub fn builder(resource: impl Into<String>) -> ClassifierBuilder<S> {
        ClassifierBuilder {
            resource: resource.into(),
            entries: Vec::new(),
        }
    }

    /// Wrap an already-built table.
    ///
    /// A map assigns each state exactly once, so this cannot conflict.
    pub fn from_map(resource: impl Into<String>, table: HashMap<S, Bucket>) -> Self {
        Self {
            resource: Arc::from(resource.into()),
            table: Arc::new(table),
        }
    }

    /// Resource type this table classifies.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Bucket for `state`, if mapped.
    pub fn get(&self, state: &S) -> Option<Bucket> {
        self.table.get(state).copied()
    }

    /// Every mapped state with its bucket, in no particular order.
    pub fn entries(&self) -> impl Iterator<Item = (&S, Bucket)> {
        self.table.iter().map(|(state, bucket)| (state, *bucket))
    }

    /// States mapped to `bucket`.
    pub fn states_in(&self, bucket: Bucket) -> impl Iterator<Item = &S> {
        self.entries()
            .filter(move |(_, b)| *b == bucket)
            .map(|(state, _)| state)
    }

    /// Number of mapped states.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether the table maps no states at all.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl<S> Classify<S> for StateClassifier<S>
where
    S: Eq + Hash + fmt::Display,
{
    fn classify(&self, state: &S) -> Result<Bucket, UnknownState> {
        self.get(state)
            .ok_or_else(|| UnknownState::new(self.resource.as_ref(), state))
    }
}

/// Builder for [`StateClassifier`].
#[derive(Debug, Clone)]
pub struct ClassifierBuilder<S> {
    resource: String,
    entries: Vec<(S, Bucket)>,
}

impl<S> ClassifierBuilder<S>
where
    S: Eq + Hash + fmt::Display,
{
    /// Map a single state.
    pub fn state(mut self, state: S, bucket: Bucket) -> Self {
        self.entries.push((state, bucket));
        self
    }

    /// Map `states` to [`Bucket::InProgress`].
    pub fn in_progress(self, states: impl IntoIterator<Item = S>) -> Self {
        self.states(states, Bucket::InProgress)
    }

    /// Map `states` to [`Bucket::Succeeded`].
    pub fn succeeded(self, states: impl IntoIterator<Item = S>) -> Self {
        self.states(states, Bucket::Succeeded)
    }

    /// Map `states` to [`Bucket::Failed`].
    pub fn failed(self, states: impl IntoIterator<Item = S>) -> Self {
        self.states(states, Bucket::Failed)
    }

    fn states(mut self, states: impl IntoIterator<Item = S>, bucket: Bucket) -> Self {
        self.entries
            .extend(states.into_iter().map(|state| (state, bucket)));
        self
    }

    /// Finish the table.
    ///
    /// Repeating a state in the same bucket is harmless; mapping it to two
    /// different buckets is a [`ConfigError::ConflictingState`].
    pub fn build(self) -> Result<StateClassifier<S>, ConfigError> {
        let mut table = HashMap::with_capacity(self.entries.len());
        for (state, bucket) in self.entries {
            match table.entry(state) {
                Entry::Vacant(slot) => {
                    slot.insert(bucket);
                }
                Entry::Occupied(slot) if *slot.get() == bucket => {}
                Entry::Occupied(slot) => {
                    return Err(ConfigError::ConflictingState {
                        state: slot.key().to_string(),
                        first: *slot.get(),
                        second: bucket,
                    });
                }
            }
        }

        Ok(StateClassifier {
            resource: Arc::from(self.resource),
            table: Arc::new(table),
        })
    }
}
