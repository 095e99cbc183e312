//! Resilience patterns for upstream calls
//!
//! Timeout defaults plus an explicit retry policy executed by the `backon`
//! crate.

pub mod timeout {
    //! Timeout configuration for external service calls

    use std::time::Duration;

    /// Default timeout for Redis operations
    pub const REDIS_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);
}

pub mod retry {
    //! Retry policy and the generic retry wrapper

    use backon::{ExponentialBuilder, Retryable};
    use std::future::Future;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Capped exponential backoff: attempt `n` (0-based) waits
    /// `base_delay * multiplier^n`, never more than `max_delay`.
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct RetryPolicy {
        /// Retries after the first attempt; 0 disables retrying.
        pub max_retries: usize,
        pub base_delay: Duration,
        pub multiplier: f32,
        pub max_delay: Duration,
        /// Add a random extra delay on top of each computed delay.
        pub jitter: bool,
    }

    impl Default for RetryPolicy {
        fn default() -> Self {
            Self {
                max_retries: 2,
                base_delay: Duration::from_millis(250),
                multiplier: 2.0,
                max_delay: Duration::from_secs(4),
                jitter: true,
            }
        }
    }

    impl RetryPolicy {
        /// Delay before retry number `attempt` (0-based), ignoring jitter.
        #[must_use]
        pub fn delay_for(&self, attempt: u32) -> Duration {
            let factor = self.multiplier.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
            self.base_delay.mul_f32(factor).min(self.max_delay)
        }

        /// Sum of all backoff delays when every retry is used, ignoring jitter.
        #[must_use]
        pub fn total_delay(&self) -> Duration {
            (0..u32::try_from(self.max_retries).unwrap_or(u32::MAX))
                .map(|attempt| self.delay_for(attempt))
                .sum()
        }

        #[must_use]
        pub fn backoff(&self) -> ExponentialBuilder {
            let builder = ExponentialBuilder::default()
                .with_min_delay(self.base_delay)
                .with_max_delay(self.max_delay)
                .with_factor(self.multiplier)
                .with_max_times(self.max_retries);
            if self.jitter {
                builder.with_jitter()
            } else {
                builder
            }
        }
    }

    /// Result of a retried operation together with how many calls it took.
    #[derive(Debug)]
    pub struct RetryOutcome<T, E> {
        pub result: Result<T, E>,
        /// Total invocations of the operation (1 + retries).
        pub calls: u32,
    }

    /// Run `op` under `policy`, retrying only errors for which `should_retry`
    /// holds. `on_retry` sees each retried error and the delay before the
    /// next attempt.
    pub async fn with_retry<T, E, F, Fut, P, N>(
        policy: &RetryPolicy,
        mut op: F,
        should_retry: P,
        on_retry: N,
    ) -> RetryOutcome<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FnMut(&E) -> bool,
        N: FnMut(&E, Duration),
    {
        let calls = AtomicU32::new(0);

        let result = (|| {
            calls.fetch_add(1, Ordering::Relaxed);
            op()
        })
        .retry(policy.backoff())
        .sleep(tokio::time::sleep)
        .when(should_retry)
        .notify(on_retry)
        .await;

        RetryOutcome {
            result,
            calls: calls.load(Ordering::Relaxed),
        }
    }
}
