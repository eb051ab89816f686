//! # opwatch-log
//!
//! Installs the global `tracing` subscriber for opwatch binaries: an
//! `EnvFilter` plus a compact, pretty or JSON `fmt` layer writing to stderr.
//!
//! ```rust,no_run
//! let _guard = opwatch_log::init(opwatch_log::Config::from_env())?;
//! tracing::info!("ready");
//! # Ok::<(), opwatch_log::LogError>(())
//! ```

#![deny(missing_docs)]

mod builder;
mod config;
mod error;

pub use builder::{LoggerBuilder, LoggerGuard};
pub use config::{Config, DisplayConfig, Format};
pub use error::LogError;

/// Install the global subscriber described by `config`.
///
/// Keep the returned guard alive for as long as logging is needed.
pub fn init(config: Config) -> Result<LoggerGuard, LogError> {
    LoggerBuilder::from_config(config).build()
}
