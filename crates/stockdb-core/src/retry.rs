//! Retry policy for provider calls.

use std::time::Duration;

use crate::remote::{RemoteError, RemoteErrorKind};

/// Backoff strategy between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Wait out whatever remains of the current rate window.
    WindowRemainder,
    /// Uses a fixed delay between retries.
    Fixed {
        /// Delay between retries.
        delay: Duration,
    },
    /// Uses an exponential delay between retries.
    ///
    /// The delay is calculated as `base * (factor ^ attempt)`.
    Exponential {
        /// The initial backoff duration.
        base: Duration,
        /// The multiplicative factor for each subsequent retry.
        factor: f64,
        /// The maximum duration to wait between retries.
        max: Duration,
        /// Whether to apply random jitter (+/- 50%) to the delay.
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::WindowRemainder
    }
}

impl Backoff {
    /// Delay before retry number `attempt` (0-based).
    ///
    /// `window_remaining` is the time left until the rate window frees a slot;
    /// only [`Backoff::WindowRemainder`] uses it.
    pub fn delay(self, attempt: u32, window_remaining: Duration) -> Duration {
        match self {
            Self::WindowRemainder => window_remaining,
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let scale = factor.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
                let seconds = (base.as_secs_f64() * scale).min(max.as_secs_f64());
                let delay = Duration::from_secs_f64(seconds);

                if !jitter {
                    return delay;
                }

                let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                let spread = millis / 2;
                let offset = fastrand::u64(0..=spread.saturating_mul(2));
                Duration::from_millis((millis + offset).saturating_sub(spread))
            }
        }
    }
}

/// Which failures are retried, how often, and how long to wait in between.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first; `None` retries until success.
    pub max_attempts: Option<u32>,
    pub backoff: Backoff,
    /// Error kinds eligible for retry. Errors flagged non-retryable are never retried.
    pub retry_on: Vec<RemoteErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            backoff: Backoff::WindowRemainder,
            retry_on: vec![
                RemoteErrorKind::Transport,
                RemoteErrorKind::RateLimited,
                RemoteErrorKind::Provider,
            ],
        }
    }
}

impl RetryPolicy {
    /// Bounded retries with the default backoff.
    pub fn bounded(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts.max(1)),
            ..Self::default()
        }
    }

    pub fn no_retry() -> Self {
        Self {
            max_attempts: Some(1),
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Whether to try again after `attempts_made` failed attempts ending in `error`.
    pub fn should_retry(&self, error: &RemoteError, attempts_made: u32) -> bool {
        if !error.retryable() || !self.retry_on.contains(&error.kind()) {
            return false;
        }

        self.max_attempts
            .map_or(true, |max_attempts| attempts_made < max_attempts)
    }

    pub fn delay_for_attempt(&self, attempt: u32, window_remaining: Duration) -> Duration {
        self.backoff.delay(attempt, window_remaining)
    }
}
