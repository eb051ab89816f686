//! Deploy results reported back to the delivery service
//!
//! The service reads `results.json` from the request's output path. A
//! deployment that failed or timed out is still a successfully reported
//! result; only an outcome that could not be determined is an error.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use opwatch_poll::{Observation, PollOutcome};

use crate::error::DeployError;
use crate::store::{ObjectStore, join_uri};

/// File name of the result object.
pub const RESULTS_FILE: &str = "results.json";

/// An observed resource that can describe itself in a deploy result.
pub trait Reportable: Observation {
    /// Key/value metadata reported with a successful deploy.
    fn metadata(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

impl Reportable for String {}

/// Final status of a deploy request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultStatus {
    /// The resource reached its success state.
    Succeeded,
    /// The resource failed or did not settle in time.
    Failed,
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        })
    }
}

/// Contents of `results.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployResult {
    /// Final status.
    pub result_status: ResultStatus,
    /// Manifest that was deployed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_file: Option<String>,
    /// Why the deploy failed, one diagnostic per line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
    /// Provider outputs worth surfacing.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl DeployResult {
    /// Successful deploy of `manifest_file`.
    pub const fn succeeded(
        manifest_file: Option<String>,
        metadata: BTreeMap<String, String>,
    ) -> Self {
        Self {
            result_status: ResultStatus::Succeeded,
            manifest_file,
            failure_message: None,
            metadata,
        }
    }

    /// Failed deploy.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            result_status: ResultStatus::Failed,
            manifest_file: None,
            failure_message: Some(message.into()),
            metadata: BTreeMap::new(),
        }
    }

    /// Turn a poll outcome into a result.
    ///
    /// Terminal failures and timeouts become `FAILED` results whose message
    /// names the final state, the provider error code and every diagnostic
    /// on its own line. Fetch errors, unknown states and cancellation are
    /// returned as errors: the deployment's fate is not known.
    pub fn from_outcome<T>(
        outcome: PollOutcome<T>,
        manifest_file: Option<String>,
    ) -> Result<Self, DeployError>
    where
        T: Reportable,
        T::State: fmt::Display,
    {
        match outcome {
            PollOutcome::TerminalSuccess(resource) => {
                Ok(Self::succeeded(manifest_file, resource.metadata()))
            }
            PollOutcome::TerminalFailure { ref state, ref details } => {
                let mut lines = vec![format!("deploy failed in state {}", state.state())];
                lines.extend(details.lines());
                Ok(Self::failed(lines.join("\n")))
            }
            PollOutcome::TimedOut { .. } => Ok(Self::failed(format!("deploy {}", outcome.describe()))),
            PollOutcome::FetchError(err) => Err(err.into()),
            PollOutcome::UnknownState { error, .. } => Err(error.into()),
            PollOutcome::Cancelled { attempts, .. } => Err(DeployError::Cancelled { attempts }),
        }
    }

    /// Write this result as `<output_path>/results.json`; returns its URI.
    pub async fn upload<S>(&self, store: &S, output_path: &str) -> Result<String, DeployError>
    where
        S: ObjectStore + ?Sized,
    {
        let uri = join_uri(output_path, RESULTS_FILE);
        let body = serde_json::to_vec(self)?;
        store.put(&uri, body).await?;
        tracing::info!(%uri, status = %self.result_status, "deploy result uploaded");
        Ok(uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use opwatch_poll::{Diagnostics, FetchError, UnknownState};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn serializes_camel_case_and_skips_empty_fields() {
        let result = DeployResult::succeeded(
            Some("gs://b/manifest.tf".into()),
            BTreeMap::from([("url".to_string(), "https://web".to_string())]),
        );
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            serde_json::json!({
                "resultStatus": "SUCCEEDED",
                "manifestFile": "gs://b/manifest.tf",
                "metadata": {"url": "https://web"}
            })
        );

        assert_eq!(
            serde_json::to_value(DeployResult::failed("boom")).unwrap(),
            serde_json::json!({"resultStatus": "FAILED", "failureMessage": "boom"})
        );
    }

    #[test]
    fn result_status_is_succeeded_or_failed() {
        let status: ResultStatus = serde_json::from_str(r#""FAILED""#).unwrap();
        assert_eq!(status, ResultStatus::Failed);
        assert!(serde_json::from_str::<ResultStatus>(r#""SKIPPED""#).is_err());
    }

    #[test]
    fn terminal_failure_lists_code_and_each_detail() {
        let outcome = PollOutcome::TerminalFailure {
            state: "FAILED".to_string(),
            details: Diagnostics::new()
                .with_code("APPLY_FAILED")
                .with_detail("bucket already exists")
                .with_detail("quota exceeded"),
        };
        let result = DeployResult::from_outcome(outcome, None).unwrap();
        assert_eq!(result.result_status, ResultStatus::Failed);
        assert_eq!(
            result.failure_message.as_deref(),
            Some(
                "deploy failed in state FAILED\n\
                 error code: APPLY_FAILED\n\
                 bucket already exists\n\
                 quota exceeded"
            )
        );
    }

    #[test]
    fn timeout_is_a_failed_result() {
        let outcome = PollOutcome::TimedOut {
            last_observed: Some("CREATING".to_string()),
            attempts: 60,
            elapsed: Duration::from_secs(1800),
        };
        let result = DeployResult::from_outcome(outcome, None).unwrap();
        assert_eq!(result.result_status, ResultStatus::Failed);
        let message = result.failure_message.unwrap();
        assert!(message.starts_with("deploy timed out after 60 attempts"), "{message}");
        assert!(message.contains("CREATING"), "{message}");
    }

    #[test]
    fn undetermined_outcomes_are_errors() {
        let fetch = DeployResult::from_outcome(
            PollOutcome::<String>::FetchError(FetchError::remote(1, "connection refused")),
            None,
        );
        assert!(matches!(fetch, Err(DeployError::Fetch(_))));

        let unknown = DeployResult::from_outcome(
            PollOutcome::UnknownState {
                observed: "RECONCILING".to_string(),
                error: UnknownState::new("deployment", "RECONCILING"),
            },
            None,
        );
        assert!(matches!(unknown, Err(DeployError::UnknownState(_))));

        let cancelled = DeployResult::from_outcome(
            PollOutcome::<String>::Cancelled {
                last_observed: None,
                attempts: 3,
            },
            None,
        );
        assert!(matches!(cancelled, Err(DeployError::Cancelled { attempts: 3 })));
    }

    #[tokio::test]
    async fn upload_writes_results_json() {
        let store = MemoryStore::new();
        let uri = DeployResult::failed("boom")
            .upload(&store, "gs://b/out/")
            .await
            .unwrap();
        assert_eq!(uri, "gs://b/out/results.json");

        let written: DeployResult =
            serde_json::from_slice(&store.get(&uri).await.unwrap()).unwrap();
        assert_eq!(written, DeployResult::failed("boom"));
    }
}
