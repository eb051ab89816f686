//! Fetched values and the structured diagnostics they carry
//!
//! A status fetch returns some provider-specific value: an operation handle,
//! a deployment resource, a bare state string. [`Observation`] is the narrow
//! view the poller needs of it: the state to classify, and whatever
//! diagnostics to report if that state turns out to be a failure.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::classify::{Bucket, StateClassifier};

/// A value returned by one status fetch.
pub trait Observation {
    /// State value handed to the classifier.
    type State;

    /// Current state of the observed resource.
    fn state(&self) -> Self::State;

    /// Structured failure details exposed by the remote API.
    ///
    /// Only consulted when the state classifies as failed.
    fn diagnostics(&self) -> Diagnostics {
        Diagnostics::default()
    }
}

impl Observation for String {
    type State = Self;

    fn state(&self) -> Self {
        self.clone()
    }
}

/// Structured diagnostics attached to a failed resource.
///
/// Kept as separate records rather than one flattened string so callers can
/// log each line on its own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Provider error code, if any.
    pub code: Option<String>,
    /// Top-level human readable message.
    pub message: Option<String>,
    /// Per-item error descriptions.
    pub details: Vec<String>,
}

impl Diagnostics {
    /// Empty diagnostics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the provider error code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Set the top-level message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Append one per-item detail.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.details.push(detail.into());
        self
    }

    /// Whether nothing at all was reported.
    pub fn is_empty(&self) -> bool {
        self.code.is_none() && self.message.is_none() && self.details.is_empty()
    }

    /// Every diagnostic as its own line: code, message, then details.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.details.len() + 2);
        if let Some(code) = &self.code {
            lines.push(format!("error code: {code}"));
        }
        if let Some(message) = &self.message {
            lines.push(message.clone());
        }
        lines.extend(self.details.iter().cloned());
        lines
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lines().join("; "))
    }
}

/// Error payload of a finished operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationError {
    /// Provider status code.
    pub code: i32,
    /// Error message.
    pub message: String,
    /// Additional detail records.
    #[serde(default)]
    pub details: Vec<String>,
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// Handle to a remote asynchronous operation.
///
/// Owned by the remote API; pollers only read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationHandle<R> {
    /// Opaque operation identifier.
    pub name: String,
    /// Whether the operation has finished.
    pub done: bool,
    /// Result or error, present once `done`.
    pub result: Option<Result<R, OperationError>>,
}

impl<R> OperationHandle<R> {
    /// A handle that has not finished yet.
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            done: false,
            result: None,
        }
    }

    /// A finished handle carrying its response.
    pub fn succeeded(name: impl Into<String>, response: R) -> Self {
        Self {
            name: name.into(),
            done: true,
            result: Some(Ok(response)),
        }
    }

    /// A finished handle carrying an error.
    pub fn failed(name: impl Into<String>, error: OperationError) -> Self {
        Self {
            name: name.into(),
            done: true,
            result: Some(Err(error)),
        }
    }

    /// Status derived from `done` and the payload.
    pub fn status(&self) -> OperationStatus {
        match (self.done, &self.result) {
            (false, _) => OperationStatus::Running,
            (true, Some(Ok(_))) => OperationStatus::Succeeded,
            (true, Some(Err(_))) => OperationStatus::Failed,
            (true, None) => OperationStatus::Incomplete,
        }
    }

    /// The response, if the operation succeeded.
    pub fn response(&self) -> Option<&R> {
        self.result.as_ref().and_then(|result| result.as_ref().ok())
    }

    /// The error, if the operation failed.
    pub fn error(&self) -> Option<&OperationError> {
        self.result.as_ref().and_then(|result| result.as_ref().err())
    }
}

impl<R> Observation for OperationHandle<R> {
    type State = OperationStatus;

    fn state(&self) -> OperationStatus {
        self.status()
    }

    fn diagnostics(&self) -> Diagnostics {
        match self.error() {
            Some(err) => Diagnostics {
                code: Some(err.code.to_string()),
                message: Some(err.message.clone()),
                details: err.details.clone(),
            },
            None => Diagnostics::default(),
        }
    }
}

/// State of an [`OperationHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    /// `done == false`.
    Running,
    /// Done with a response.
    Succeeded,
    /// Done with an error.
    Failed,
    /// Done but carrying neither a response nor an error.
    Incomplete,
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Incomplete => "INCOMPLETE",
        })
    }
}

impl StateClassifier<OperationStatus> {
    /// Classifier for [`OperationHandle`] polling.
    ///
    /// [`OperationStatus::Incomplete`] is left unmapped, so a handle that
    /// claims to be done without a payload surfaces as an unknown state.
    pub fn operations() -> Self {
        Self::from_map(
            "operation",
            HashMap::from([
                (OperationStatus::Running, Bucket::InProgress),
                (OperationStatus::Succeeded, Bucket::Succeeded),
                (OperationStatus::Failed, Bucket::Failed),
            ]),
        )
    }
}
