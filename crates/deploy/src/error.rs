//! Error types for deploy handlers and their collaborators.
//!
//! A [`DeployError`] is an infrastructure error: the handler could not
//! determine or report the outcome. A deployment that ran and failed is not
//! an error here; it is a [`DeployResult`](crate::DeployResult) with status
//! `FAILED`.

use opwatch_poll::{BoxError, ConfigError, FanOutError, FetchError, UnknownState};

/// Object store failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No object at the given URI.
    #[error("object not found: {uri}")]
    NotFound {
        /// URI that was looked up.
        uri: String,
    },

    /// The backend rejected or failed the request.
    #[error("object store request for {uri} failed: {source}")]
    Backend {
        /// URI the request targeted.
        uri: String,
        /// Backend error.
        #[source]
        source: BoxError,
    },
}

/// External command failure.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// An empty argument vector has no program to run.
    #[error("no command given")]
    EmptyCommand,

    /// The program could not be started.
    #[error("failed to execute {program}: {source}")]
    Spawn {
        /// Program name.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The program ran past the runner's deadline and was killed.
    #[error("{program} timed out after {limit:?}")]
    TimedOut {
        /// Program name.
        program: String,
        /// Deadline that was exceeded.
        limit: std::time::Duration,
    },

    /// The program exited unsuccessfully.
    #[error("{program} exited with status {status}: {stderr}")]
    Failed {
        /// Program name.
        program: String,
        /// Exit status, `-1` when killed by a signal.
        status: i32,
        /// Trimmed standard error.
        stderr: String,
    },
}

/// Invalid or missing deploy parameters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParamsError {
    /// A required variable was not set.
    #[error("required parameter {name} is not set")]
    Missing {
        /// Variable name.
        name: String,
    },

    /// A variable was set to something unusable.
    #[error("parameter {name} has invalid value {value:?}: {reason}")]
    Invalid {
        /// Variable name.
        name: String,
        /// Offending value.
        value: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl ParamsError {
    pub(crate) fn missing(name: impl Into<String>) -> Self {
        Self::Missing { name: name.into() }
    }

    pub(crate) fn invalid(
        name: impl Into<String>,
        value: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Self::Invalid {
            name: name.into(),
            value: value.into(),
            reason: reason.to_string(),
        }
    }
}

/// Infrastructure error of a deploy handler.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Bad deploy parameters.
    #[error(transparent)]
    Params(#[from] ParamsError),

    /// Parameters produced an invalid poll configuration.
    #[error("invalid poll configuration: {0}")]
    Config(#[from] ConfigError),

    /// Reading the manifest or writing the result failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A remote call outside the poll loop failed.
    #[error("{action} failed: {source}")]
    Remote {
        /// What was being attempted.
        action: &'static str,
        /// Remote error.
        #[source]
        source: BoxError,
    },

    /// Handler invoked for a request type it does not serve.
    #[error("{handler} cannot serve a {actual} request")]
    UnsupportedRequest {
        /// Handler name.
        handler: &'static str,
        /// Request type received.
        actual: String,
    },

    /// The status fetch failed and the outcome is unknown.
    #[error("could not determine the outcome: {0}")]
    Fetch(#[from] FetchError),

    /// The remote resource reported a state outside its known domain.
    #[error(transparent)]
    UnknownState(#[from] UnknownState),

    /// The handler was cancelled before the outcome was known.
    #[error("cancelled after {attempts} attempts")]
    Cancelled {
        /// Attempts started before cancellation.
        attempts: u32,
    },

    /// Some operations of a fan-out did not succeed.
    #[error(transparent)]
    FanOut(#[from] FanOutError),

    /// The result could not be encoded.
    #[error("failed to encode deploy result: {0}")]
    Encode(#[from] serde_json::Error),
}

impl DeployError {
    pub(crate) fn remote(action: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Remote {
            action,
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn params_error_names_variable() {
        let err = ParamsError::missing("CLOUD_DEPLOY_PROJECT");
        assert_eq!(
            err.to_string(),
            "required parameter CLOUD_DEPLOY_PROJECT is not set"
        );

        let err = ParamsError::invalid("CLOUD_DEPLOY_REQUEST_TYPE", "DESTROY", "unknown request type");
        assert_eq!(
            err.to_string(),
            "parameter CLOUD_DEPLOY_REQUEST_TYPE has invalid value \"DESTROY\": unknown request type"
        );
    }

    #[test]
    fn process_timeout_names_limit() {
        let err = ProcessError::TimedOut {
            program: "kubectl".into(),
            limit: std::time::Duration::from_secs(90),
        };
        assert_eq!(err.to_string(), "kubectl timed out after 90s");
    }

    #[test]
    fn remote_error_keeps_action() {
        let err = DeployError::remote("list deployed models", "permission denied");
        assert_eq!(err.to_string(), "list deployed models failed: permission denied");
    }
}
