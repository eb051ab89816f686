//! # opwatch-poll
//!
//! Drives long-running remote operations to a terminal state.
//!
//! - **Classification**: [`StateClassifier`] maps a provider's state enum to
//!   in-progress / succeeded / failed, supplied as data per resource type.
//! - **Polling**: [`OperationPoller`] fetches immediately, then every
//!   `interval`, until the resource is terminal or `total_timeout` expires.
//! - **Fan-out**: [`FanOutPoller`] polls many operations concurrently and
//!   reports every outcome, not just the first failure.
//! - **Bounded retry**: [`BoundedRetrier`] retries an action with a fixed
//!   delay while a predicate says the error is transient.
//!
//! Both suspension points (the fetch and the inter-attempt sleep) honour a
//! [`CancellationToken`](tokio_util::sync::CancellationToken) and the session
//! deadline.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::time::Duration;
//! use opwatch_poll::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread", start_paused = true)]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let classifier = StateClassifier::builder("deployment")
//!     .in_progress(["CREATING".to_string(), "UPDATING".to_string()])
//!     .succeeded(["ACTIVE".to_string()])
//!     .failed(["FAILED".to_string(), "SUSPENDED".to_string()])
//!     .build()?;
//! let config = PollConfig::new(Duration::from_secs(30), Duration::from_secs(1800))?;
//!
//! let outcome = OperationPoller::new(config, classifier)
//!     .poll(|| async { Ok::<_, BoxError>("ACTIVE".to_string()) })
//!     .await;
//! assert!(outcome.is_success());
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

mod cancellation;
pub mod classify;
pub mod config;
pub mod error;
pub mod fan_out;
pub mod observability;
pub mod observation;
pub mod outcome;
pub mod poller;
pub mod retrier;
pub mod timeout;

pub use classify::{Bucket, ClassifierBuilder, Classify, StateClassifier};
pub use config::PollConfig;
pub use error::{
    AttemptTimeout, BoxError, ConfigError, FailedOperation, FanOutError, FetchError,
    FetchErrorKind, RetryError, UnknownState,
};
pub use fan_out::{FanOutPoller, FanOutResult};
pub use observability::{LoggingHook, PollEvent, PollHook, PollHooks};
pub use observation::{
    Diagnostics, Observation, OperationError, OperationHandle, OperationStatus,
};
pub use outcome::{OutcomeKind, PollOutcome};
pub use poller::{OperationPoller, poll};
pub use retrier::{BoundedRetrier, retry};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::{
        BoundedRetrier, BoxError, Bucket, Classify, FanOutPoller, Observation, OperationPoller,
        PollConfig, PollOutcome, RetryError, StateClassifier,
    };
}
