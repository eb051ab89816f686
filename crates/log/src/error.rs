//! Logging bootstrap errors.

/// Failure to set up logging.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// The level / directive string could not be parsed.
    #[error("invalid log filter {filter:?}: {reason}")]
    Filter {
        /// The rejected filter string.
        filter: String,
        /// Parser message.
        reason: String,
    },

    /// An output format name was not recognised.
    #[error("unknown log format {0:?} (expected compact, pretty or json)")]
    Format(String),

    /// A global subscriber is already installed.
    #[error("failed to install the global subscriber: {0}")]
    Init(String),
}
