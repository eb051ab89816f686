//! Per-attempt deadlines

use std::future::Future;
use std::time::Duration;

use crate::error::AttemptTimeout;

/// Run `future`, bounded by `limit` when one is given.
///
/// With `None` the future runs unbounded.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use opwatch_poll::timeout::bounded;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let value = bounded(Some(Duration::from_secs(5)), async { 42 }).await;
/// assert_eq!(value, Ok(42));
/// # }
/// ```
pub async fn bounded<F>(limit: Option<Duration>, future: F) -> Result<F::Output, AttemptTimeout>
where
    F: Future,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, future)
            .await
            .map_err(|_| AttemptTimeout { limit }),
        None => Ok(future.await),
    }
}
