//! Concurrent polling of independent operations
//!
//! [`FanOutPoller`] spawns one task per operation, each running an
//! [`OperationPoller`] session to completion, and waits for every one of
//! them before returning. Each worker reports its own outcome through the
//! join handle; no state is shared between workers.

use std::fmt;
use std::future::Future;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::classify::Classify;
use crate::config::PollConfig;
use crate::error::{BoxError, FailedOperation, FanOutError, FetchError};
use crate::observation::Observation;
use crate::outcome::PollOutcome;
use crate::poller::OperationPoller;

/// Polls several operations concurrently, one task each.
#[derive(Debug, Clone)]
pub struct FanOutPoller<C> {
    poller: OperationPoller<C>,
}

impl<C> FanOutPoller<C> {
    /// Fan-out with a plain poller built from `config` and `classifier`.
    pub fn new(config: PollConfig, classifier: C) -> Self {
        Self::from_poller(OperationPoller::new(config, classifier))
    }

    /// Fan-out reusing a configured poller (retry policy, hooks).
    ///
    /// Each worker runs a clone labelled with its operation key.
    pub const fn from_poller(poller: OperationPoller<C>) -> Self {
        Self { poller }
    }

    /// Poller each worker is cloned from.
    pub const fn poller(&self) -> &OperationPoller<C> {
        &self.poller
    }
}

impl<C> FanOutPoller<C>
where
    C: Clone + Send + Sync + 'static,
{
    /// Poll every `(key, fetch)` pair concurrently and collect all outcomes.
    ///
    /// Returns only once every worker has finished, successful or not.
    pub async fn poll_all<I, K, F, Fut, T, E>(&self, operations: I) -> FanOutResult<K, T>
    where
        I: IntoIterator<Item = (K, F)>,
        K: fmt::Display,
        C: Classify<T::State>,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<BoxError> + Send + 'static,
        T: Observation + Send + 'static,
        T::State: fmt::Display + Send,
    {
        self.poll_all_with_cancel(operations, &CancellationToken::new())
            .await
    }

    /// Like [`poll_all`](Self::poll_all); cancelling `token` cancels every
    /// worker, each of which still reports a [`PollOutcome::Cancelled`].
    #[tracing::instrument(skip_all)]
    pub async fn poll_all_with_cancel<I, K, F, Fut, T, E>(
        &self,
        operations: I,
        token: &CancellationToken,
    ) -> FanOutResult<K, T>
    where
        I: IntoIterator<Item = (K, F)>,
        K: fmt::Display,
        C: Classify<T::State>,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<BoxError> + Send + 'static,
        T: Observation + Send + 'static,
        T::State: fmt::Display + Send,
    {
        let mut workers = JoinSet::new();
        let mut keys = Vec::new();

        for (index, (key, fetch)) in operations.into_iter().enumerate() {
            let poller = self.poller.clone().with_label(key.to_string());
            let worker_token = token.child_token();
            workers.spawn(async move {
                let outcome = poller.poll_with_cancel(fetch, &worker_token).await;
                (index, outcome)
            });
            keys.push(key);
        }
        tracing::debug!(operations = keys.len(), "fan-out started");

        let mut slots: Vec<Option<PollOutcome<T>>> = keys.iter().map(|_| None).collect();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((index, outcome)) => {
                    if let Some(slot) = slots.get_mut(index) {
                        *slot = Some(outcome);
                    }
                }
                Err(err) => tracing::error!(error = %err, "poll worker ended without an outcome"),
            }
        }

        let entries: Vec<_> = keys
            .into_iter()
            .zip(slots)
            .map(|(key, slot)| {
                let outcome = slot
                    .unwrap_or_else(|| PollOutcome::FetchError(FetchError::worker_panicked()));
                (key, outcome)
            })
            .collect();

        let result = FanOutResult { entries };
        let failed = result.failures().count();
        if failed == 0 {
            tracing::info!(operations = result.len(), "all operations succeeded");
        } else {
            tracing::warn!(
                operations = result.len(),
                failed,
                "some operations did not succeed"
            );
        }
        result
    }
}

/// Outcome of every operation of a fan-out, in launch order.
#[derive(Debug)]
pub struct FanOutResult<K, T> {
    entries: Vec<(K, PollOutcome<T>)>,
}

impl<K, T> FanOutResult<K, T> {
    /// Number of operations polled.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no operation was polled.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether every operation reached terminal success.
    ///
    /// An empty fan-out is a success.
    pub fn is_success(&self) -> bool {
        self.entries.iter().all(|(_, outcome)| outcome.is_success())
    }

    /// Every `(key, outcome)` pair.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &PollOutcome<T>)> {
        self.entries.iter().map(|(key, outcome)| (key, outcome))
    }

    /// Operations that did not reach terminal success.
    pub fn failures(&self) -> impl Iterator<Item = (&K, &PollOutcome<T>)> {
        self.iter().filter(|(_, outcome)| !outcome.is_success())
    }

    /// Operations that reached terminal success.
    pub fn successes(&self) -> impl Iterator<Item = (&K, &T)> {
        self.iter()
            .filter_map(|(key, outcome)| outcome.success().map(|value| (key, value)))
    }

    /// Outcome of the first operation launched under `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<&PollOutcome<T>>
    where
        K: PartialEq<Q>,
        Q: ?Sized,
    {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, outcome)| outcome)
    }

    /// Consume into the raw `(key, outcome)` list.
    pub fn into_entries(self) -> Vec<(K, PollOutcome<T>)> {
        self.entries
    }
}

impl<K, T> FanOutResult<K, T>
where
    K: fmt::Display,
    T: Observation,
    T::State: fmt::Display,
{
    /// Combined error listing every failed operation, if any failed.
    pub fn error(&self) -> Option<FanOutError> {
        let failures: Vec<_> = self
            .failures()
            .map(|(key, outcome)| FailedOperation {
                key: key.to_string(),
                summary: outcome.describe(),
            })
            .collect();

        if failures.is_empty() {
            None
        } else {
            Some(FanOutError {
                total: self.len(),
                failures,
            })
        }
    }

    /// Final values if every operation succeeded, otherwise the combined
    /// error.
    pub fn into_result(self) -> Result<Vec<(K, T)>, FanOutError> {
        if let Some(err) = self.error() {
            return Err(err);
        }
        Ok(self
            .entries
            .into_iter()
            .filter_map(|(key, outcome)| outcome.into_success().map(|value| (key, value)))
            .collect())
    }
}

impl<K, T> IntoIterator for FanOutResult<K, T> {
    type Item = (K, PollOutcome<T>);
    type IntoIter = std::vec::IntoIter<(K, PollOutcome<T>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::StateClassifier;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn classifier() -> StateClassifier<String> {
        StateClassifier::builder("model")
            .in_progress(["UNDEPLOYING".to_string()])
            .succeeded(["UNDEPLOYED".to_string()])
            .failed(["FAILED".to_string()])
            .build()
            .unwrap()
    }

    fn fixed(state: &'static str) -> impl FnMut() -> std::future::Ready<Result<String, BoxError>> {
        move || std::future::ready(Ok(state.to_string()))
    }

    #[tokio::test]
    async fn empty_fan_out_succeeds() {
        let fan_out = FanOutPoller::new(PollConfig::default(), classifier());
        let result = fan_out
            .poll_all(Vec::<(String, fn() -> std::future::Ready<Result<String, BoxError>>)>::new())
            .await;
        assert!(result.is_empty());
        assert!(result.is_success());
        assert_eq!(result.into_result().unwrap(), Vec::new());
    }

    #[tokio::test(start_paused = true)]
    async fn keys_keep_launch_order() {
        let config = PollConfig::new(Duration::from_secs(1), Duration::from_secs(10)).unwrap();
        let fan_out = FanOutPoller::new(config, classifier());
        let result = fan_out
            .poll_all([
                ("model-3", fixed("UNDEPLOYED")),
                ("model-1", fixed("UNDEPLOYED")),
                ("model-2", fixed("UNDEPLOYED")),
            ])
            .await;

        let keys: Vec<_> = result.iter().map(|(key, _)| *key).collect();
        assert_eq!(keys, vec!["model-3", "model-1", "model-2"]);
        assert_eq!(
            result
                .get(&"model-1")
                .and_then(PollOutcome::success)
                .map(String::as_str),
            Some("UNDEPLOYED")
        );
        assert_eq!(result.successes().count(), 3);
    }

    #[tokio::test]
    async fn duplicate_keys_keep_both_outcomes() {
        let fan_out = FanOutPoller::new(PollConfig::default(), classifier());
        let result = fan_out
            .poll_all([("dup", fixed("UNDEPLOYED")), ("dup", fixed("FAILED"))])
            .await;

        assert_eq!(result.len(), 2);
        let err = result.into_result().unwrap_err();
        assert_eq!(
            err.to_string(),
            "1 of 2 operations did not succeed: dup (failed in state FAILED)"
        );
    }
}
