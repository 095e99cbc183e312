//! Single-flight for cache-miss resolution
//!
//! Wraps the `async_singleflight` crate so that concurrent misses for the
//! same cache key share one upstream walk instead of each hitting providers.

use std::future::Future;
use std::sync::Arc;

/// Error type for `SingleFlight` operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum SingleFlightError<E> {
    /// The leading task was dropped or panicked before producing a value
    #[error("single-flight leader dropped before completing")]
    WorkerFailed,
    /// The shared operation failed
    #[error("{0}")]
    Inner(E),
}

/// Collapses concurrent executions for the same string key.
///
/// Values and errors are cloned out to every waiter, so both must be
/// `Clone`.
pub struct SingleFlight<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    group: Arc<async_singleflight::Group<String, V, E>>,
}

impl<V, E> Clone for SingleFlight<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            group: Arc::clone(&self.group),
        }
    }
}

impl<V, E> SingleFlight<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            group: Arc::new(async_singleflight::Group::new()),
        }
    }

    /// Run `f` unless a call for `key` is already in flight, in which case
    /// wait for that call's result.
    pub async fn do_work<Fut>(&self, key: &str, f: Fut) -> Result<V, SingleFlightError<E>>
    where
        Fut: Future<Output = Result<V, E>> + Send,
    {
        // Err(None) means the leader was dropped after the crate's own retries
        self.group
            .work(&key.to_string(), f)
            .await
            .map_err(|opt_err| match opt_err {
                Some(inner) => SingleFlightError::Inner(inner),
                None => SingleFlightError::WorkerFailed,
            })
    }

    /// Like [`Self::do_work`], turning a leader failure into `E`.
    pub async fn run<Fut, Ef>(&self, key: &str, f: Fut, on_worker_failed: Ef) -> Result<V, E>
    where
        Fut: Future<Output = Result<V, E>> + Send,
        Ef: FnOnce() -> E,
    {
        self.do_work(key, f).await.map_err(|e| match e {
            SingleFlightError::WorkerFailed => on_worker_failed(),
            SingleFlightError::Inner(err) => err,
        })
    }
}

impl<V, E> Default for SingleFlight<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
