//! Argo CD application sync
//!
//! Argo exposes no operation handle, only the application's coarse
//! `.status.operationState.phase`, read here through `kubectl`. The phase is
//! re-read with a [`BoundedRetrier`]: "still syncing" is the retryable
//! [`SyncError::InProgress`], a failed phase ends the wait at once.

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use opwatch_poll::{BoundedRetrier, Bucket, Classify, RetryError, StateClassifier, UnknownState};

use super::{table, wire_enum};
use crate::error::ProcessError;
use crate::presets;
use crate::process::ProcessRunner;

wire_enum! {
    /// Phase of an Argo CD sync operation.
    SyncPhase {
        /// Sync running.
        Running => "Running",
        /// Sync being aborted.
        Terminating => "Terminating",
        /// Sync finished successfully.
        Succeeded => "Succeeded",
        /// Sync finished with a resource failure.
        Failed => "Failed",
        /// Sync could not run.
        Error => "Error",
    }
}

impl SyncPhase {
    /// Sync phase table.
    pub fn classifier() -> StateClassifier<Self> {
        table(
            "sync",
            &[Self::Running, Self::Terminating],
            &[Self::Succeeded],
            &[Self::Failed, Self::Error],
        )
    }
}

/// Settled sync of an application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    /// Final phase, always [`SyncPhase::Succeeded`].
    pub phase: SyncPhase,
    /// Operation message, if Argo set one.
    pub message: Option<String>,
    /// Git revision that was synced.
    pub revision: Option<String>,
}

/// Why one sync check did not return a settled sync.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The sync has not settled yet.
    #[error("sync is still {phase}")]
    InProgress {
        /// Phase observed.
        phase: SyncPhase,
    },

    /// The application has no sync operation recorded yet.
    #[error("application has no sync operation yet")]
    NotStarted,

    /// The sync settled in a failed phase.
    #[error("sync ended in phase {phase}{}", suffix(.message))]
    Failed {
        /// Phase observed.
        phase: SyncPhase,
        /// Argo's operation message.
        message: Option<String>,
    },

    /// Argo reported a phase outside the table.
    #[error(transparent)]
    Unknown(#[from] UnknownState),

    /// `kubectl` could not be run or exited unsuccessfully.
    #[error(transparent)]
    Command(#[from] ProcessError),

    /// `kubectl` printed something that is not an application object.
    #[error("unreadable application status: {0}")]
    Parse(String),
}

fn suffix(message: &Option<String>) -> String {
    message.as_deref().map(|m| format!(": {m}")).unwrap_or_default()
}

impl SyncError {
    /// Whether another check may still see the sync settle.
    #[must_use]
    pub const fn is_in_progress(&self) -> bool {
        matches!(self, Self::InProgress { .. } | Self::NotStarted)
    }
}

/// Waits for an Argo CD application to finish syncing.
#[derive(Debug, Clone)]
pub struct ArgoSyncWatcher<P> {
    runner: P,
    retrier: BoundedRetrier,
    namespace: String,
    classifier: StateClassifier<SyncPhase>,
}

impl<P: ProcessRunner> ArgoSyncWatcher<P> {
    /// Watcher for applications in the `argocd` namespace, checking at the
    /// Argo preset cadence.
    pub fn new(runner: P) -> Self {
        Self {
            runner,
            retrier: BoundedRetrier::from_config(&presets::argo()),
            namespace: "argocd".to_string(),
            classifier: SyncPhase::classifier(),
        }
    }

    /// Look applications up in `namespace`.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Replace the check bound and delay.
    #[must_use]
    pub const fn with_retrier(mut self, retrier: BoundedRetrier) -> Self {
        self.retrier = retrier;
        self
    }

    /// Check `app` until its sync succeeds, fails, or the checks run out.
    pub async fn wait_for_sync(&self, app: &str) -> Result<SyncStatus, RetryError<SyncError>> {
        self.wait_for_sync_with_cancel(app, &CancellationToken::new())
            .await
    }

    /// Like [`wait_for_sync`](Self::wait_for_sync), cancellable.
    #[tracing::instrument(skip(self, token), fields(namespace = %self.namespace))]
    pub async fn wait_for_sync_with_cancel(
        &self,
        app: &str,
        token: &CancellationToken,
    ) -> Result<SyncStatus, RetryError<SyncError>> {
        let result = self
            .retrier
            .retry_with_cancel(|| self.check(app), SyncError::is_in_progress, token)
            .await;
        match &result {
            Ok(status) => tracing::info!(revision = ?status.revision, "application synced"),
            Err(err) => tracing::warn!(attempts = err.attempts(), error = %err, "application did not sync"),
        }
        result
    }

    async fn check(&self, app: &str) -> Result<SyncStatus, SyncError> {
        let argv = [
            "kubectl",
            "get",
            "application",
            app,
            "--namespace",
            self.namespace.as_str(),
            "--output",
            "json",
        ]
        .map(String::from);
        let stdout = self.runner.run(&argv).await?.into_stdout("kubectl")?;
        let object: Value =
            serde_json::from_str(&stdout).map_err(|err| SyncError::Parse(err.to_string()))?;
        self.read_status(&object)
    }

    fn read_status(&self, object: &Value) -> Result<SyncStatus, SyncError> {
        let text = |pointer: &str| {
            object
                .pointer(pointer)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let Some(phase) = text("/status/operationState/phase").map(SyncPhase::from) else {
            return Err(SyncError::NotStarted);
        };
        let message = text("/status/operationState/message");

        match self.classifier.classify(&phase)? {
            Bucket::InProgress => {
                tracing::debug!(%phase, "sync in progress");
                Err(SyncError::InProgress { phase })
            }
            Bucket::Failed => Err(SyncError::Failed { phase, message }),
            Bucket::Succeeded => Ok(SyncStatus {
                phase,
                message,
                revision: text("/status/sync/revision"),
            }),
        }
    }
}
