//! Logger builder implementation

#[macro_use]
mod format;

use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, Format};
use crate::error::LogError;

/// Logger builder
#[derive(Debug)]
pub struct LoggerBuilder {
    config: Config,
}

/// Guard that keeps the logger's root span entered
///
/// Dropping it exits the `service` root span; the global subscriber stays
/// installed.
#[derive(Debug)]
#[must_use = "dropping the guard exits the root span"]
pub struct LoggerGuard {
    _root_span: Option<tracing::span::EnteredSpan>,
}

/// Registry + filter + one format layer, installed globally.
macro_rules! init_subscriber {
    ($filter:expr, $fmt_layer:expr) => {
        Registry::default()
            .with($filter)
            .with($fmt_layer)
            .try_init()
            .map_err(|e| LogError::Init(e.to_string()))
    };
}

impl LoggerBuilder {
    /// Create builder from config
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Validate the filter only, without installing anything.
    pub fn filter(&self) -> Result<EnvFilter, LogError> {
        EnvFilter::try_new(&self.config.level).map_err(|e| LogError::Filter {
            filter: self.config.level.clone(),
            reason: e.to_string(),
        })
    }

    /// Build and install the global subscriber
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Filter string cannot be parsed
    /// - A global subscriber is already installed
    pub fn build(self) -> Result<LoggerGuard, LogError> {
        let filter = self.filter()?;
        let display = self.config.display;

        match self.config.format {
            Format::Pretty => init_subscriber!(filter, create_fmt_layer!(pretty, display))?,
            Format::Compact => init_subscriber!(filter, create_fmt_layer!(compact, display))?,
            Format::Json => init_subscriber!(filter, create_json_layer!(display))?,
        }

        let root_span = self
            .config
            .service
            .as_deref()
            .map(|service| tracing::info_span!("opwatch", service).entered());

        Ok(LoggerGuard {
            _root_span: root_span,
        })
    }
}
