//! Retry policy with exponential backoff and jitter.
//!
//! The policy wraps one fetch-and-decode attempt. Time and randomness are
//! injected through [`Sleeper`] and [`JitterSource`] so the schedule can be
//! observed without waiting.

use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{FetchError, FetchErrorKind};

/// Waits between attempts.
pub trait Sleeper: Send + Sync + Debug {
    fn sleep(&self, delay: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Sleeper backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, delay: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(tokio::time::sleep(delay))
    }
}

/// Draws the randomized delay for a jittered backoff step.
pub trait JitterSource: Send + Sync + Debug {
    /// Returns a delay in `[0, upper]`.
    fn sample(&self, upper: Duration) -> Duration;
}

/// Uniform jitter from `fastrand`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FastrandJitter;

impl JitterSource for FastrandJitter {
    fn sample(&self, upper: Duration) -> Duration {
        let upper_ms = u64::try_from(upper.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(fastrand::u64(0..=upper_ms))
    }
}

/// Backoff strategy between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    Fixed {
        delay: Duration,
    },
    /// `min(max, base * factor^attempt)`; with `jitter` the actual wait is
    /// drawn uniformly below that ceiling.
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_secs(1),
            factor: 2.0,
            max: Duration::from_secs(60),
            jitter: true,
        }
    }
}

impl Backoff {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay(self, attempt: u32, jitter_source: &dyn JitterSource) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let scale = factor.powi(attempt.min(64) as i32);
                let seconds = base.as_secs_f64() * scale;
                let capped = if seconds.is_finite() {
                    Duration::from_secs_f64(seconds.min(max.as_secs_f64()))
                } else {
                    max
                };

                if jitter {
                    jitter_source.sample(capped).min(capped)
                } else {
                    capped
                }
            }
        }
    }
}

/// Retry policy applied around every single fetch.
///
/// Retries are unbounded by default; the delay is what is capped.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// `None` retries forever. Total attempts = `max_retries + 1`.
    pub max_retries: Option<u32>,
    pub backoff: Backoff,
    /// Malformed payloads are final unless this is set.
    pub retry_decode_errors: bool,
    sleeper: Arc<dyn Sleeper>,
    jitter: Arc<dyn JitterSource>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: None,
            backoff: Backoff::default(),
            retry_decode_errors: false,
            sleeper: Arc::new(TokioSleeper),
            jitter: Arc::new(FastrandJitter),
        }
    }
}

impl RetryPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn bounded(max_retries: u32) -> Self {
        Self {
            max_retries: Some(max_retries),
            ..Self::default()
        }
    }

    pub fn no_retry() -> Self {
        Self::bounded(0)
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_decode_retries(mut self, enabled: bool) -> Self {
        self.retry_decode_errors = enabled;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_jitter(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn is_retryable(&self, error: &FetchError) -> bool {
        match error.kind() {
            FetchErrorKind::Transient => true,
            FetchErrorKind::Decode => self.retry_decode_errors,
            _ => false,
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt, self.jitter.as_ref())
    }

    /// Runs `op` until it succeeds, fails permanently, runs out of retries or
    /// `cancel` fires. Dropping the in-flight attempt on cancellation aborts
    /// its request.
    pub async fn run<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        operation: &str,
        mut op: F,
    ) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut retries: u32 = 0;
        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::cancelled()),
                outcome = op() => outcome,
            };

            let error = match outcome {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !self.is_retryable(&error) {
                return Err(error);
            }

            if let Some(max_retries) = self.max_retries {
                if retries >= max_retries {
                    if max_retries == 0 {
                        return Err(error);
                    }
                    return Err(FetchError::retries_exhausted(retries + 1, &error));
                }
            }

            let delay = self.delay_for_attempt(retries);
            warn!(
                operation,
                attempt = retries + 1,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "fetch failed; backing off"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::cancelled()),
                _ = self.sleeper.sleep(delay) => {}
            }

            retries = retries.saturating_add(1);
        }
    }
}
