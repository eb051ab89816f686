//! Layered settings for `opwatch wait`
//!
//! Precedence, lowest first: built-in defaults (the preset's cadence, or
//! 30s / 30m), `opwatch.toml`, `OPWATCH_*` environment variables, flags.
//!
//! ```toml
//! interval = "15s"
//! timeout = "45m"
//! state_pointer = "/state"
//!
//! [states]
//! in_progress = ["CREATING", "UPDATING"]
//! succeeded = ["ACTIVE"]
//! failed = ["FAILED"]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::{Deserialize, Serialize};

use opwatch_deploy::{PollOverrides, Preset};
use opwatch_poll::{PollConfig, StateClassifier};

use crate::cli::WaitArgs;

/// Config file read from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "opwatch.toml";

const ENV_PREFIX: &str = "OPWATCH_";
const ENV_KEYS: &[&str] = &[
    "preset",
    "state_pointer",
    "interval",
    "timeout",
    "attempt_timeout",
    "retry_fetch_errors",
];

/// Settings shared by the file, the environment and the flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub preset: Option<String>,
    pub state_pointer: Option<String>,
    #[serde(with = "humantime_serde")]
    pub interval: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub attempt_timeout: Option<Duration>,
    pub retry_fetch_errors: bool,
    pub states: Option<StateLists>,
}

/// An ad hoc state table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StateLists {
    pub in_progress: Vec<String>,
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
}

impl StateLists {
    fn is_empty(&self) -> bool {
        self.in_progress.is_empty() && self.succeeded.is_empty() && self.failed.is_empty()
    }
}

/// Everything a wait needs, resolved.
#[derive(Debug, Clone)]
pub struct WaitPlan {
    pub config: PollConfig,
    pub classifier: StateClassifier<String>,
    pub state_pointer: Option<String>,
    pub retry_fetch_errors: bool,
}

impl Settings {
    /// File and environment layers. An explicit `config_file` must exist.
    pub fn figment(config_file: Option<&Path>) -> anyhow::Result<Figment> {
        let file = match config_file {
            Some(path) if !path.is_file() => bail!("config file {} not found", path.display()),
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };
        Ok(Figment::new()
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).only(ENV_KEYS)))
    }

    /// Load file and environment layers.
    pub fn load(config_file: Option<&Path>) -> anyhow::Result<Self> {
        Self::figment(config_file)?
            .extract()
            .context("invalid opwatch configuration")
    }

    /// Overlay command-line flags.
    #[must_use]
    pub fn with_flags(mut self, args: &WaitArgs) -> Self {
        let flag_states = StateLists {
            in_progress: args.in_progress.clone(),
            succeeded: args.succeeded.clone(),
            failed: args.failed.clone(),
        };
        if !flag_states.is_empty() {
            self.states = Some(flag_states);
            self.preset = None;
        }
        if args.preset.is_some() {
            self.preset.clone_from(&args.preset);
            self.states = None;
        }
        if args.state_pointer.is_some() {
            self.state_pointer.clone_from(&args.state_pointer);
        }
        self.interval = args.interval.or(self.interval);
        self.timeout = args.timeout.or(self.timeout);
        self.attempt_timeout = args.attempt_timeout.or(self.attempt_timeout);
        self.retry_fetch_errors |= args.retry_fetch_errors;
        self
    }

    /// Pick the state table and build the poll configuration.
    pub fn resolve(&self) -> anyhow::Result<WaitPlan> {
        let preset = self
            .preset
            .as_deref()
            .map(str::parse::<Preset>)
            .transpose()?;

        let (classifier, base, default_pointer) = match (&self.states, preset) {
            (Some(states), _) if !states.is_empty() => {
                (custom_table(states)?, PollConfig::default(), None)
            }
            (_, Some(preset)) => (
                preset.classifier(),
                preset.config(),
                Some(preset.state_pointer().to_string()),
            ),
            _ => bail!(
                "no state table: pass --preset, or --in-progress/--succeeded/--failed, \
                 or set [states] in {DEFAULT_CONFIG_FILE}"
            ),
        };

        let overrides = PollOverrides {
            interval: self.interval,
            total_timeout: self.timeout,
            max_attempts: None,
            per_attempt_timeout: self.attempt_timeout,
        };
        let config = overrides
            .apply(base)
            .context("invalid poll configuration")?;

        let state_pointer = self.state_pointer.clone().or(default_pointer);
        if let Some(pointer) = &state_pointer
            && !pointer.is_empty()
            && !pointer.starts_with('/')
        {
            bail!("state pointer {pointer:?} must be empty or start with '/'");
        }

        Ok(WaitPlan {
            config,
            classifier,
            state_pointer,
            retry_fetch_errors: self.retry_fetch_errors,
        })
    }
}

fn custom_table(states: &StateLists) -> anyhow::Result<StateClassifier<String>> {
    if states.succeeded.is_empty() && states.failed.is_empty() {
        bail!("state table has no terminal states: add --succeeded or --failed");
    }
    StateClassifier::builder("resource")
        .in_progress(states.in_progress.iter().cloned())
        .succeeded(states.succeeded.iter().cloned())
        .failed(states.failed.iter().cloned())
        .build()
        .context("invalid state table")
}
