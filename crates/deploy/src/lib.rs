//! # opwatch-deploy
//!
//! Custom deploy-target handlers built on [`opwatch_poll`].
//!
//! - [`InfraDeployer`] applies a Terraform manifest through Infrastructure
//!   Manager and waits for the deployment to settle.
//! - [`ModelUndeployer`] retires stale models from a Vertex AI endpoint
//!   concurrently and waits on pipeline jobs.
//! - [`ArgoSyncWatcher`] waits for an Argo CD application to finish syncing.
//!
//! Remote APIs are reached through narrow traits ([`InfraClient`],
//! [`EndpointClient`], [`ObjectStore`], [`ProcessRunner`]) so handlers can be
//! driven by in-memory fakes.
//!
//! ## Results
//!
//! A handler reports through [`DeployResult`]: a deployment that failed or
//! timed out is an `Ok` result with status `FAILED` and the provider's
//! diagnostics. `Err(DeployError)` is reserved for outcomes that could not be
//! determined (fetch errors, unknown states, cancellation) or reported.

#![deny(missing_docs)]

pub mod error;
pub mod params;
pub mod presets;
pub mod process;
pub mod providers;
pub mod result;
pub mod store;

pub use error::{DeployError, ParamsError, ProcessError, StoreError};
pub use params::{DeployParams, PollOverrides, RequestType};
pub use presets::{Preset, UnknownPreset};
pub use process::{ProcessOutput, ProcessRunner, TokioProcessRunner};
pub use providers::argo::{ArgoSyncWatcher, SyncError, SyncPhase, SyncStatus};
pub use providers::infra::{
    ApplyRequest, Deployment, DeploymentState, InfraClient, InfraDeployer, TfError,
};
pub use providers::vertex::{
    DeployedModel, EndpointClient, ModelUndeployer, PipelineJob, PipelineState,
};
pub use result::{DeployResult, Reportable, ResultStatus};
pub use store::{MemoryStore, ObjectStore};
