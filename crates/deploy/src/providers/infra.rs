//! Infrastructure Manager deployments
//!
//! A deployment is applied once, then its coarse `state` is polled until it
//! settles. On failure the resource carries an error code, a state detail and
//! one error record per Terraform resource that failed to apply.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use opwatch_poll::{
    BoxError, Diagnostics, Observation, OperationPoller, PollHooks, StateClassifier,
};

use super::{table, wire_enum};
use crate::error::DeployError;
use crate::params::{DeployParams, RequestType};
use crate::presets;
use crate::result::{DeployResult, Reportable};
use crate::store::ObjectStore;

wire_enum! {
    /// Lifecycle state of an Infrastructure Manager deployment.
    DeploymentState {
        /// Never sent by a healthy API.
        Unspecified => "STATE_UNSPECIFIED",
        /// First apply running.
        Creating => "CREATING",
        /// Applied successfully.
        Active => "ACTIVE",
        /// Re-apply running.
        Updating => "UPDATING",
        /// Delete running.
        Deleting => "DELETING",
        /// Apply failed.
        Failed => "FAILED",
        /// Locked by the provider.
        Suspended => "SUSPENDED",
        /// Gone.
        Deleted => "DELETED",
    }
}

impl DeploymentState {
    /// Deployment state table.
    ///
    /// `DELETING` counts as failed: a deploy that finds its target being torn
    /// down will not become active. `STATE_UNSPECIFIED` is left unmapped.
    pub fn classifier() -> StateClassifier<Self> {
        table(
            "deployment",
            &[Self::Creating, Self::Updating],
            &[Self::Active],
            &[Self::Failed, Self::Suspended, Self::Deleted, Self::Deleting],
        )
    }
}

/// One Terraform resource that failed to apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TfError {
    /// Terraform address, e.g. `google_storage_bucket.logs`.
    pub resource_address: String,
    /// HTTP status of the failing provider call, if any.
    #[serde(default)]
    pub http_response_code: Option<i32>,
    /// Provider error text.
    pub error_description: String,
}

impl std::fmt::Display for TfError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.resource_address)?;
        if let Some(code) = self.http_response_code {
            write!(f, " (HTTP {code})")?;
        }
        write!(f, ": {}", self.error_description)
    }
}

/// Infrastructure Manager deployment resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    /// Full resource name.
    pub name: String,
    /// Lifecycle state.
    pub state: DeploymentState,
    /// Provider error code, set on failure.
    #[serde(default)]
    pub error_code: Option<String>,
    /// Human readable state explanation.
    #[serde(default)]
    pub state_detail: Option<String>,
    /// Per-resource apply errors.
    #[serde(default)]
    pub tf_errors: Vec<TfError>,
    /// Terraform outputs of the latest successful apply.
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
}

impl Observation for Deployment {
    type State = DeploymentState;

    fn state(&self) -> DeploymentState {
        self.state.clone()
    }

    fn diagnostics(&self) -> Diagnostics {
        let mut diagnostics = Diagnostics::new();
        diagnostics.code.clone_from(&self.error_code);
        diagnostics.message.clone_from(&self.state_detail);
        diagnostics.details = self.tf_errors.iter().map(ToString::to_string).collect();
        diagnostics
    }
}

impl Reportable for Deployment {
    fn metadata(&self) -> BTreeMap<String, String> {
        self.outputs.clone()
    }
}

/// Request to create or update a deployment from a rendered manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyRequest {
    /// Full deployment name.
    pub deployment: String,
    /// Rendered Terraform blueprint.
    pub manifest: Vec<u8>,
}

/// Infrastructure Manager API surface used by [`InfraDeployer`].
#[async_trait]
pub trait InfraClient: Send + Sync {
    /// Start an apply. Returns once the API has accepted it.
    async fn apply(&self, request: &ApplyRequest) -> Result<(), BoxError>;

    /// Fetch the current deployment resource.
    async fn get_deployment(&self, name: &str) -> Result<Deployment, BoxError>;
}

/// Applies a manifest and waits for the deployment to settle.
pub struct InfraDeployer<C, S: ?Sized> {
    client: Arc<C>,
    store: Arc<S>,
    hooks: PollHooks,
}

impl<C, S> InfraDeployer<C, S>
where
    C: InfraClient,
    S: ObjectStore + ?Sized,
{
    /// Deployer reading manifests from and writing results to `store`.
    pub fn new(client: Arc<C>, store: Arc<S>) -> Self {
        Self {
            client,
            store,
            hooks: PollHooks::default(),
        }
    }

    /// Observe the deployment's poll session.
    #[must_use]
    pub fn with_hooks(mut self, hooks: PollHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Apply the release manifest and report how the deployment ended.
    ///
    /// A failed or timed-out deployment is an `Ok` result with status
    /// `FAILED`; `Err` means the outcome could not be determined or reported.
    pub async fn deploy(&self, params: &DeployParams) -> Result<DeployResult, DeployError> {
        self.deploy_with_cancel(params, &CancellationToken::new())
            .await
    }

    /// Like [`deploy`](Self::deploy), stopping early if `token` is cancelled.
    #[tracing::instrument(skip_all, fields(project = %params.project, location = %params.location))]
    pub async fn deploy_with_cancel(
        &self,
        params: &DeployParams,
        token: &CancellationToken,
    ) -> Result<DeployResult, DeployError> {
        if params.request_type != RequestType::Deploy {
            return Err(DeployError::UnsupportedRequest {
                handler: "infra deployer",
                actual: params.request_type.to_string(),
            });
        }

        let manifest_uri = params.require_manifest()?;
        let name = deployment_name(params)?;
        let config = params.poll_config(presets::infra_manager())?;
        let manifest = self.store.get(manifest_uri).await?;

        tracing::info!(deployment = %name, manifest = %manifest_uri, "applying deployment");
        self.client
            .apply(&ApplyRequest {
                deployment: name.clone(),
                manifest,
            })
            .await
            .map_err(|err| DeployError::remote("apply deployment", err))?;

        let poller = OperationPoller::new(config, DeploymentState::classifier())
            .with_label(name.clone())
            .with_hooks(self.hooks.clone());
        let outcome = poller
            .poll_with_cancel(
                || {
                    let client = Arc::clone(&self.client);
                    let name = name.clone();
                    async move { client.get_deployment(&name).await }
                },
                token,
            )
            .await;

        let result = DeployResult::from_outcome(outcome, Some(manifest_uri.to_string()))?;
        result.upload(self.store.as_ref(), &params.output_path).await?;
        Ok(result)
    }
}

/// `projects/<project>/locations/<location>/deployments/<id>`.
fn deployment_name(params: &DeployParams) -> Result<String, DeployError> {
    let id = params.require_custom("deploymentId")?;
    Ok(format!(
        "projects/{}/locations/{}/deployments/{id}",
        params.project, params.location
    ))
}
