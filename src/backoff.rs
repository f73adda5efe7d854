use rand::prelude::*;
use rand::rngs::StdRng;
use std::ops::ControlFlow;
use std::time::Duration;
use tracing::{info, warn};

/// Exponential backoff with jitter
///
/// See <https://aws.amazon.com/blogs/architecture/exponential-backoff-and-jitter/>
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub init_backoff: Duration,
    pub max_backoff: Duration,
    pub base: f64,

    /// Retries after the first attempt before giving up.
    pub max_retries: usize,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            init_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            base: 3.,
            max_retries: 3,
        }
    }
}

/// [`Backoff`] can be created from a [`BackoffConfig`]
///
/// Consecutive calls to [`Backoff::next`] will return the next backoff interval
///
#[derive(Debug)]
pub struct Backoff<R = StdRng> {
    init_backoff: f64,
    next_backoff_secs: f64,
    max_backoff_secs: f64,
    base: f64,
    max_retries: usize,
    rng: R,
}

impl Backoff<StdRng> {
    /// Create a new [`Backoff`] from the provided [`BackoffConfig`]
    pub fn new(config: &BackoffConfig) -> Self {
        Self::new_with_rng(config, StdRng::from_rng(&mut rand::rng()))
    }
}

impl<R: Rng> Backoff<R> {
    pub fn new_with_rng(config: &BackoffConfig, rng: R) -> Self {
        let init_backoff = config.init_backoff.as_secs_f64();
        Self {
            init_backoff,
            next_backoff_secs: init_backoff,
            max_backoff_secs: config.max_backoff.as_secs_f64(),
            base: config.base,
            max_retries: config.max_retries,
            rng,
        }
    }

    /// Returns the next backoff duration to wait for
    pub fn next(&mut self) -> Duration {
        let upper = self.next_backoff_secs * self.base;
        let sampled = if upper > self.init_backoff {
            self.rng.random_range(self.init_backoff..upper)
        } else {
            self.init_backoff
        };
        let next_backoff = self.max_backoff_secs.min(sampled);
        Duration::from_secs_f64(std::mem::replace(&mut self.next_backoff_secs, next_backoff))
    }

    /// Perform an async operation that retries with a backoff
    ///
    /// `do_stuff` breaks with the final result or continues with an error worth
    /// retrying. Once the retries are used up that last error is returned.
    pub async fn retry_with_backoff<F, Fut, T, E>(
        &mut self,
        request_name: &str,
        do_stuff: F,
    ) -> Result<T, E>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: std::future::Future<Output = ControlFlow<Result<T, E>, E>> + Send,
        E: std::error::Error + Send,
    {
        let mut attempt = 0;
        loop {
            let e = match do_stuff().await {
                ControlFlow::Break(r) => return r,
                ControlFlow::Continue(e) => e,
            };

            if attempt >= self.max_retries {
                warn!(e=%e, request_name, attempt, "giving up after retries");
                return Err(e);
            }
            attempt += 1;

            let backoff = self.next();
            info!(
                e=%e,
                request_name,
                backoff_secs = backoff.as_secs(),
                "request encountered non-fatal error - backing off",
            );
            tokio::time::sleep(backoff).await;
        }
    }
}
