//! Built-in poll presets
//!
//! Each provider has a cadence that suits it and a state table. [`Preset`]
//! bundles both, keyed by wire strings, for callers that only see state as
//! text (the `opwatch` command line).

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use opwatch_poll::{PollConfig, StateClassifier};

use crate::providers::argo::SyncPhase;
use crate::providers::by_wire_name;
use crate::providers::infra::DeploymentState;
use crate::providers::vertex::PipelineState;

/// Infrastructure Manager: every 30s for up to 30 minutes.
pub fn infra_manager() -> PollConfig {
    PollConfig::default()
}

/// Vertex AI operations and pipeline jobs: every 15s for up to 30 minutes.
pub fn vertex() -> PollConfig {
    PollConfig::new(Duration::from_secs(15), Duration::from_secs(30 * 60)).unwrap_or_default()
}

/// Argo CD sync: 30 checks, 10s apart.
pub fn argo() -> PollConfig {
    PollConfig::new(Duration::from_secs(10), Duration::from_secs(5 * 60))
        .and_then(|config| config.with_max_attempts(30))
        .unwrap_or_default()
}

/// A named provider preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    /// Infrastructure Manager deployment.
    InfraManager,
    /// Vertex AI pipeline job.
    VertexPipeline,
    /// Argo CD application sync.
    ArgoSync,
}

impl Preset {
    /// Every preset, in display order.
    pub const ALL: [Self; 3] = [Self::InfraManager, Self::VertexPipeline, Self::ArgoSync];

    /// Name accepted by [`FromStr`].
    pub const fn name(self) -> &'static str {
        match self {
            Self::InfraManager => "infra-manager",
            Self::VertexPipeline => "vertex-pipeline",
            Self::ArgoSync => "argo-sync",
        }
    }

    /// Poll cadence and budget.
    pub fn config(self) -> PollConfig {
        match self {
            Self::InfraManager => infra_manager(),
            Self::VertexPipeline => vertex(),
            Self::ArgoSync => argo(),
        }
    }

    /// State table keyed by wire string.
    pub fn classifier(self) -> StateClassifier<String> {
        match self {
            Self::InfraManager => by_wire_name(&DeploymentState::classifier()),
            Self::VertexPipeline => by_wire_name(&PipelineState::classifier()),
            Self::ArgoSync => by_wire_name(&SyncPhase::classifier()),
        }
    }

    /// JSON pointer of the state field in the resource's JSON form.
    pub const fn state_pointer(self) -> &'static str {
        match self {
            Self::InfraManager | Self::VertexPipeline => "/state",
            Self::ArgoSync => "/status/operationState/phase",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Name that matches no [`Preset`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown preset {0:?}; expected one of infra-manager, vertex-pipeline, argo-sync")]
pub struct UnknownPreset(pub String);

impl FromStr for Preset {
    type Err = UnknownPreset;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|preset| preset.name() == s)
            .ok_or_else(|| UnknownPreset(s.to_string()))
    }
}
