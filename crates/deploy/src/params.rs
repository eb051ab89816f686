//! Deploy parameters passed to a custom target through its environment
//!
//! The delivery service runs the target's container with `CLOUD_DEPLOY_*`
//! variables describing the request. Parameters set on the target itself
//! arrive as `CLOUD_DEPLOY_customTarget_<key>`; four of those override the
//! poll cadence:
//!
//! | key                  | example | meaning                     |
//! |----------------------|---------|-----------------------------|
//! | `pollInterval`       | `15s`   | delay between status checks |
//! | `pollTimeout`        | `45m`   | total wait budget           |
//! | `pollMaxAttempts`    | `30`    | cap on status checks        |
//! | `pollAttemptTimeout` | `10s`   | deadline of one check       |

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use opwatch_poll::{ConfigError, PollConfig};

use crate::error::ParamsError;

const PREFIX: &str = "CLOUD_DEPLOY_";
const CUSTOM_PREFIX: &str = "CLOUD_DEPLOY_customTarget_";

/// What the delivery service asks the target to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestType {
    /// Produce the manifest to deploy.
    Render,
    /// Deploy a previously rendered manifest.
    Deploy,
}

impl FromStr for RequestType {
    type Err = ParamsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RENDER" => Ok(Self::Render),
            "DEPLOY" => Ok(Self::Deploy),
            other => Err(ParamsError::invalid(
                var("REQUEST_TYPE"),
                other,
                "expected RENDER or DEPLOY",
            )),
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Render => "RENDER",
            Self::Deploy => "DEPLOY",
        })
    }
}

/// Poll settings overridden by target parameters; unset fields keep the
/// provider preset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollOverrides {
    /// `pollInterval`.
    pub interval: Option<Duration>,
    /// `pollTimeout`.
    pub total_timeout: Option<Duration>,
    /// `pollMaxAttempts`.
    pub max_attempts: Option<u32>,
    /// `pollAttemptTimeout`.
    pub per_attempt_timeout: Option<Duration>,
}

impl PollOverrides {
    /// Whether no override is set.
    pub const fn is_empty(&self) -> bool {
        self.interval.is_none()
            && self.total_timeout.is_none()
            && self.max_attempts.is_none()
            && self.per_attempt_timeout.is_none()
    }

    /// `base` with every set override applied.
    pub fn apply(&self, base: PollConfig) -> Result<PollConfig, ConfigError> {
        let mut config = PollConfig::new(
            self.interval.unwrap_or(base.interval()),
            self.total_timeout.unwrap_or(base.total_timeout()),
        )?;
        if let Some(limit) = self.per_attempt_timeout.or(base.per_attempt_timeout()) {
            config = config.with_per_attempt_timeout(limit)?;
        }
        let max_attempts = self
            .max_attempts
            .or_else(|| base.has_explicit_max_attempts().then(|| base.max_attempts()));
        if let Some(max_attempts) = max_attempts {
            config = config.with_max_attempts(max_attempts)?;
        }
        Ok(config)
    }
}

/// One deploy request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployParams {
    /// `CLOUD_DEPLOY_REQUEST_TYPE`.
    pub request_type: RequestType,
    /// `CLOUD_DEPLOY_PROJECT`.
    pub project: String,
    /// `CLOUD_DEPLOY_LOCATION`.
    pub location: String,
    /// `CLOUD_DEPLOY_OUTPUT_GCS_PATH`: where results are written.
    pub output_path: String,
    /// `CLOUD_DEPLOY_MANIFEST_GCS_PATH`: rendered manifest, deploy only.
    pub manifest_path: Option<String>,
    /// `CLOUD_DEPLOY_DELIVERY_PIPELINE`.
    pub pipeline: Option<String>,
    /// `CLOUD_DEPLOY_RELEASE`.
    pub release: Option<String>,
    /// `CLOUD_DEPLOY_TARGET`.
    pub target: Option<String>,
    /// Every `CLOUD_DEPLOY_customTarget_*` parameter, keyed without prefix.
    pub custom: BTreeMap<String, String>,
    /// Poll overrides parsed from the custom parameters.
    pub poll: PollOverrides,
}

impl DeployParams {
    /// Parse from the process environment.
    pub fn from_env() -> Result<Self, ParamsError> {
        Self::from_env_map(&std::env::vars().collect())
    }

    /// Parse from an explicit variable map.
    pub fn from_env_map(vars: &HashMap<String, String>) -> Result<Self, ParamsError> {
        let optional = |suffix: &str| {
            vars.get(&var(suffix))
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let required = |suffix: &str| optional(suffix).ok_or_else(|| ParamsError::missing(var(suffix)));

        let request_type: RequestType = required("REQUEST_TYPE")?.parse()?;
        let manifest_path = optional("MANIFEST_GCS_PATH");
        if request_type == RequestType::Deploy && manifest_path.is_none() {
            return Err(ParamsError::missing(var("MANIFEST_GCS_PATH")));
        }

        let custom: BTreeMap<String, String> = vars
            .iter()
            .filter_map(|(name, value)| {
                name.strip_prefix(CUSTOM_PREFIX)
                    .map(|key| (key.to_string(), value.clone()))
            })
            .collect();
        let poll = PollOverrides {
            interval: parse_custom(&custom, "pollInterval", parse_duration)?,
            total_timeout: parse_custom(&custom, "pollTimeout", parse_duration)?,
            max_attempts: parse_custom(&custom, "pollMaxAttempts", parse_attempts)?,
            per_attempt_timeout: parse_custom(&custom, "pollAttemptTimeout", parse_duration)?,
        };

        Ok(Self {
            request_type,
            project: required("PROJECT")?,
            location: required("LOCATION")?,
            output_path: required("OUTPUT_GCS_PATH")?,
            manifest_path,
            pipeline: optional("DELIVERY_PIPELINE"),
            release: optional("RELEASE"),
            target: optional("TARGET"),
            custom,
            poll,
        })
    }

    /// Custom target parameter `key`, if set.
    pub fn custom(&self, key: &str) -> Option<&str> {
        self.custom.get(key).map(String::as_str)
    }

    /// Custom target parameter `key`, or [`ParamsError::Missing`].
    pub fn require_custom(&self, key: &str) -> Result<&str, ParamsError> {
        self.custom(key)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ParamsError::missing(format!("{CUSTOM_PREFIX}{key}")))
    }

    /// The rendered manifest path, or [`ParamsError::Missing`].
    pub fn require_manifest(&self) -> Result<&str, ParamsError> {
        self.manifest_path
            .as_deref()
            .ok_or_else(|| ParamsError::missing(var("MANIFEST_GCS_PATH")))
    }

    /// `base` with this request's poll overrides applied.
    pub fn poll_config(&self, base: PollConfig) -> Result<PollConfig, ConfigError> {
        if !self.poll.is_empty() {
            tracing::debug!(overrides = ?self.poll, "applying poll overrides");
        }
        self.poll.apply(base)
    }
}

fn var(suffix: &str) -> String {
    format!("{PREFIX}{suffix}")
}

fn parse_custom<T>(
    custom: &BTreeMap<String, String>,
    key: &str,
    parse: fn(&str) -> Result<T, String>,
) -> Result<Option<T>, ParamsError> {
    custom
        .get(key)
        .map(|raw| parse(raw.trim()).map_err(|reason| ParamsError::invalid(format!("{CUSTOM_PREFIX}{key}"), raw.as_str(), reason)))
        .transpose()
}

fn parse_duration(raw: &str) -> Result<Duration, String> {
    humantime::parse_duration(raw).map_err(|err| err.to_string())
}

fn parse_attempts(raw: &str) -> Result<u32, String> {
    raw.parse::<u32>().map_err(|err| err.to_string())
}
