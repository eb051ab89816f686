//! Vertex AI endpoints and pipeline jobs
//!
//! Undeploying a model returns a long-running operation handle. Retiring
//! every stale model on an endpoint fans those handles out to one
//! [`FanOutPoller`] so each model's outcome is reported on its own.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{self, BoxFuture};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use opwatch_poll::{
    BoxError, Diagnostics, FanOutPoller, Observation, OperationError, OperationHandle,
    OperationPoller, PollConfig, PollHooks, PollOutcome, StateClassifier,
};

use super::{table, wire_enum};
use crate::error::DeployError;
use crate::presets;
use crate::result::Reportable;

wire_enum! {
    /// State of a Vertex AI pipeline job.
    PipelineState {
        /// Never sent by a healthy API.
        Unspecified => "PIPELINE_STATE_UNSPECIFIED",
        /// Accepted, not yet scheduled.
        Queued => "PIPELINE_STATE_QUEUED",
        /// Waiting for resources.
        Pending => "PIPELINE_STATE_PENDING",
        /// Executing.
        Running => "PIPELINE_STATE_RUNNING",
        /// Finished successfully.
        Succeeded => "PIPELINE_STATE_SUCCEEDED",
        /// Finished with an error.
        Failed => "PIPELINE_STATE_FAILED",
        /// Cancel requested, not yet done.
        Cancelling => "PIPELINE_STATE_CANCELLING",
        /// Cancelled.
        Cancelled => "PIPELINE_STATE_CANCELLED",
        /// Paused by the user.
        Paused => "PIPELINE_STATE_PAUSED",
    }
}

impl PipelineState {
    /// Pipeline job state table; `UNSPECIFIED` is left unmapped.
    pub fn classifier() -> StateClassifier<Self> {
        table(
            "pipeline job",
            &[
                Self::Queued,
                Self::Pending,
                Self::Running,
                Self::Cancelling,
                Self::Paused,
            ],
            &[Self::Succeeded],
            &[Self::Failed, Self::Cancelled],
        )
    }
}

/// Vertex AI pipeline job resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineJob {
    /// Full resource name.
    pub name: String,
    /// Current state.
    pub state: PipelineState,
    /// Set when the job failed.
    #[serde(default)]
    pub error: Option<OperationError>,
}

impl Observation for PipelineJob {
    type State = PipelineState;

    fn state(&self) -> PipelineState {
        self.state.clone()
    }

    fn diagnostics(&self) -> Diagnostics {
        self.error.as_ref().map_or_else(Diagnostics::new, |err| Diagnostics {
            code: Some(err.code.to_string()),
            message: Some(err.message.clone()),
            details: err.details.clone(),
        })
    }
}

impl Reportable for PipelineJob {
    fn metadata(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("pipelineJob".to_string(), self.name.clone())])
    }
}

/// A model serving on an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployedModel {
    /// Deployed model id, unique within the endpoint.
    pub id: String,
    /// Model resource name.
    pub model: String,
    /// Display name, if set.
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Vertex AI API surface used by [`ModelUndeployer`].
#[async_trait]
pub trait EndpointClient: Send + Sync + 'static {
    /// Models currently deployed to `endpoint`.
    async fn list_deployed_models(&self, endpoint: &str) -> Result<Vec<DeployedModel>, BoxError>;

    /// Start undeploying one model; returns the operation tracking it.
    async fn undeploy_model(
        &self,
        endpoint: &str,
        deployed_model_id: &str,
    ) -> Result<OperationHandle<()>, BoxError>;

    /// Fetch a long-running operation by name.
    async fn get_operation(&self, name: &str) -> Result<OperationHandle<()>, BoxError>;

    /// Fetch a pipeline job by name.
    async fn get_pipeline_job(&self, name: &str) -> Result<PipelineJob, BoxError>;
}

/// Retires stale models and waits on pipeline jobs.
pub struct ModelUndeployer<C> {
    client: Arc<C>,
    config: PollConfig,
    hooks: PollHooks,
}

impl<C: EndpointClient> ModelUndeployer<C> {
    /// Undeployer polling at the Vertex preset cadence.
    pub fn new(client: Arc<C>) -> Self {
        Self::with_config(client, presets::vertex())
    }

    /// Undeployer with an explicit poll configuration.
    pub fn with_config(client: Arc<C>, config: PollConfig) -> Self {
        Self {
            client,
            config,
            hooks: PollHooks::default(),
        }
    }

    /// Observe every poll session this undeployer runs.
    #[must_use]
    pub fn with_hooks(mut self, hooks: PollHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Undeploy every model on `endpoint` except `keep`.
    ///
    /// All undeploys run concurrently. Returns the retired deployed-model ids
    /// in listing order, or a [`DeployError::FanOut`] naming every model that
    /// did not undeploy cleanly.
    pub async fn undeploy_stale(
        &self,
        endpoint: &str,
        keep: &str,
    ) -> Result<Vec<String>, DeployError> {
        self.undeploy_stale_with_cancel(endpoint, keep, &CancellationToken::new())
            .await
    }

    /// Like [`undeploy_stale`](Self::undeploy_stale), cancellable.
    #[tracing::instrument(skip(self, token))]
    pub async fn undeploy_stale_with_cancel(
        &self,
        endpoint: &str,
        keep: &str,
        token: &CancellationToken,
    ) -> Result<Vec<String>, DeployError> {
        let models = self
            .client
            .list_deployed_models(endpoint)
            .await
            .map_err(|err| DeployError::remote("list deployed models", err))?;

        let stale: Vec<String> = models
            .into_iter()
            .map(|model| model.id)
            .filter(|id| id != keep)
            .collect();
        if stale.is_empty() {
            tracing::info!("no stale models to undeploy");
            return Ok(Vec::new());
        }
        tracing::info!(count = stale.len(), "undeploying stale models");

        // Starts are not bounded by the per-attempt timeout; only reads are.
        let starts = future::join_all(
            stale
                .iter()
                .map(|id| self.client.undeploy_model(endpoint, id)),
        );
        let started = tokio::select! {
            biased;
            () = token.cancelled() => return Err(DeployError::Cancelled { attempts: 0 }),
            started = starts => started,
        };

        let operations = stale.into_iter().zip(started).map(|(id, start)| {
            let fetch = watch_undeploy(Arc::clone(&self.client), id.clone(), start);
            (id, fetch)
        });

        let poller = OperationPoller::new(self.config, StateClassifier::operations())
            .with_hooks(self.hooks.clone());
        let results = FanOutPoller::from_poller(poller)
            .poll_all_with_cancel(operations, token)
            .await;

        Ok(results
            .into_result()?
            .into_iter()
            .map(|(id, _)| id)
            .collect())
    }

    /// Poll a pipeline job until it is terminal.
    pub async fn await_pipeline(&self, job: &str) -> PollOutcome<PipelineJob> {
        self.await_pipeline_with_cancel(job, &CancellationToken::new())
            .await
    }

    /// Like [`await_pipeline`](Self::await_pipeline), cancellable.
    pub async fn await_pipeline_with_cancel(
        &self,
        job: &str,
        token: &CancellationToken,
    ) -> PollOutcome<PipelineJob> {
        let poller = OperationPoller::new(self.config, PipelineState::classifier())
            .with_label(job)
            .with_hooks(self.hooks.clone());
        poller
            .poll_with_cancel(
                || {
                    let client = Arc::clone(&self.client);
                    let job = job.to_string();
                    async move { client.get_pipeline_job(&job).await }
                },
                token,
            )
            .await
    }
}

/// Fetch for one stale model: the first call reports how its undeploy
/// started, later calls re-read the operation it returned.
fn watch_undeploy<C: EndpointClient>(
    client: Arc<C>,
    deployed_model_id: String,
    start: Result<OperationHandle<()>, BoxError>,
) -> impl FnMut() -> BoxFuture<'static, Result<OperationHandle<()>, BoxError>> + Send + 'static {
    let operation = start.as_ref().ok().map(|handle| handle.name.clone());
    let mut start = Some(start);
    move || {
        if let Some(start) = start.take() {
            if let Ok(handle) = &start {
                tracing::debug!(deployed_model = %deployed_model_id, operation = %handle.name, "undeploy started");
            }
            return future::ready(start).boxed();
        }
        let client = Arc::clone(&client);
        let operation = operation.clone();
        let id = deployed_model_id.clone();
        async move {
            match operation {
                Some(name) => client.get_operation(&name).await,
                None => Err(format!("undeploy of {id} never started").into()),
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opwatch_poll::{Bucket, Classify};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(PipelineState::Queued, Bucket::InProgress)]
    #[case(PipelineState::Pending, Bucket::InProgress)]
    #[case(PipelineState::Running, Bucket::InProgress)]
    #[case(PipelineState::Cancelling, Bucket::InProgress)]
    #[case(PipelineState::Paused, Bucket::InProgress)]
    #[case(PipelineState::Succeeded, Bucket::Succeeded)]
    #[case(PipelineState::Failed, Bucket::Failed)]
    #[case(PipelineState::Cancelled, Bucket::Failed)]
    fn pipeline_table(#[case] state: PipelineState, #[case] expected: Bucket) {
        assert_eq!(PipelineState::classifier().classify(&state), Ok(expected));
    }

    #[test]
    fn unspecified_pipeline_state_is_unmapped() {
        let classifier = PipelineState::classifier();
        assert!(classifier.classify(&PipelineState::Unspecified).is_err());
        assert_eq!(classifier.len(), PipelineState::KNOWN.len() - 1);
    }

    #[test]
    fn pipeline_job_parses_wire_state() {
        let job: PipelineJob = serde_json::from_value(serde_json::json!({
            "name": "projects/p/locations/l/pipelineJobs/train-7",
            "state": "PIPELINE_STATE_FAILED",
            "error": { "code": 3, "message": "component train failed", "details": [] }
        }))
        .unwrap();
        assert_eq!(job.state, PipelineState::Failed);
        assert_eq!(job.diagnostics().code.as_deref(), Some("3"));
    }
}
