//! Retry policy for broker admin calls.
//!
//! Delays follow a backoff strategy capped at `max_delay_ms`, then jitter is
//! applied to spread out clients hammering a recovering broker.

use crate::cancellation::CancellationToken;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * 2^retry
    #[default]
    Exponential,
    /// delay = base * (retry + 1)
    Linear,
    /// delay = base
    Constant,
}

/// Jitter strategy applied on top of the backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter.
    None,
    /// Uniform in `0..=delay`.
    #[default]
    Full,
    /// Half fixed, half random.
    Equal,
    /// Uniform in `base..=min(max, previous * 3)`.
    Decorrelated,
}

/// How often and how patiently a call is retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: usize,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound for a single delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff strategy.
    pub backoff_strategy: BackoffStrategy,
    /// Jitter strategy.
    pub jitter_strategy: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
            backoff_strategy: BackoffStrategy::Exponential,
            jitter_strategy: JitterStrategy::Full,
        }
    }
}

impl RetryConfig {
    /// Creates the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the total number of attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the delay cap.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategy = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter_strategy = strategy;
        self
    }

    /// Effective attempt budget; zero is treated as one.
    #[must_use]
    pub fn attempt_budget(&self) -> usize {
        self.max_attempts.max(1)
    }
}

/// Progress of one retried call.
#[derive(Debug, Default)]
pub struct RetryState {
    /// Attempts made so far.
    pub attempt: usize,
    previous_delay_ms: Option<u64>,
}

impl RetryState {
    /// Creates a state with no attempts made.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once the attempt budget is spent.
    #[must_use]
    pub fn is_exhausted(&self, config: &RetryConfig) -> bool {
        self.attempt >= config.attempt_budget()
    }

    /// Delay to wait after the current attempt failed.
    pub fn next_delay(&mut self, config: &RetryConfig) -> Duration {
        let base = config.base_delay_ms;
        let max = config.max_delay_ms;
        let retry = self.attempt.saturating_sub(1);

        let delay = match config.backoff_strategy {
            BackoffStrategy::Exponential => {
                let exponent = u32::try_from(retry).unwrap_or(u32::MAX);
                base.saturating_mul(2u64.saturating_pow(exponent))
            }
            BackoffStrategy::Linear => base.saturating_mul(retry as u64 + 1),
            BackoffStrategy::Constant => base,
        }
        .min(max);

        let mut rng = rand::thread_rng();
        let jittered = match config.jitter_strategy {
            JitterStrategy::None => delay,
            JitterStrategy::Full if delay == 0 => 0,
            JitterStrategy::Full => rng.gen_range(0..=delay),
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rng.gen_range(0..=half)
                }
            }
            JitterStrategy::Decorrelated => {
                let upper = self.previous_delay_ms.unwrap_or(base).saturating_mul(3).min(max);
                if upper <= base {
                    base
                } else {
                    rng.gen_range(base..=upper)
                }
            }
        };
        self.previous_delay_ms = Some(jittered);
        Duration::from_millis(jittered)
    }
}

/// Why a retried call gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error.
    Exhausted {
        /// Attempts made, equal to the budget.
        attempts: usize,
        /// Error of the final attempt.
        last: E,
    },
    /// An attempt failed with an error that must not be retried.
    Fatal {
        /// Attempts made, including the fatal one.
        attempts: usize,
        /// The error.
        error: E,
    },
    /// The token was cancelled.
    Cancelled {
        /// Attempts started before cancellation was observed.
        attempts: usize,
    },
}

/// Runs `operation` until it succeeds, fails fatally, runs out of attempts
/// or `cancel` fires.
///
/// `operation` receives the 1-based attempt number. On success returns the
/// value and the number of attempts it took. An in-flight attempt is dropped
/// when `cancel` fires.
pub async fn with_retry<T, E, F, Fut, R>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    label: &str,
    is_retryable: R,
    mut operation: F,
) -> Result<(T, usize), RetryError<E>>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: Display,
{
    let mut state = RetryState::new();

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled { attempts: state.attempt });
        }
        state.attempt += 1;
        let attempt = state.attempt;

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(RetryError::Cancelled { attempts: attempt }),
            result = operation(attempt) => result,
        };

        let error = match result {
            Ok(value) => return Ok((value, attempt)),
            Err(error) => error,
        };
        if !is_retryable(&error) {
            return Err(RetryError::Fatal { attempts: attempt, error });
        }
        if state.is_exhausted(config) {
            return Err(RetryError::Exhausted { attempts: attempt, last: error });
        }

        let delay = state.next_delay(config);
        debug!(
            call = %label,
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %error,
            "Retrying after error"
        );
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(RetryError::Cancelled { attempts: attempt }),
            () = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn quick(attempts: usize) -> RetryConfig {
        RetryConfig::new()
            .with_max_attempts(attempts)
            .with_base_delay_ms(1)
            .with_max_delay_ms(2)
            .with_jitter(JitterStrategy::None)
    }

    fn always(_: &String) -> bool {
        true
    }

    #[test]
    fn test_delay_exponential_without_jitter() {
        let config = RetryConfig::new()
            .with_base_delay_ms(100)
            .with_max_delay_ms(10_000)
            .with_jitter(JitterStrategy::None);
        let mut state = RetryState::new();

        let delays: Vec<_> = (1..=4)
            .map(|attempt| {
                state.attempt = attempt;
                state.next_delay(&config).as_millis()
            })
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 800]);
    }

    #[test]
    fn test_delay_linear_and_constant() {
        let mut state = RetryState::new();
        state.attempt = 3;
        let linear = RetryConfig::new()
            .with_base_delay_ms(100)
            .with_backoff(BackoffStrategy::Linear)
            .with_jitter(JitterStrategy::None);
        assert_eq!(state.next_delay(&linear), Duration::from_millis(300));

        let constant = linear.with_backoff(BackoffStrategy::Constant);
        assert_eq!(state.next_delay(&constant), Duration::from_millis(100));
    }

    #[test]
    fn test_delay_capped_and_jittered_within_bounds() {
        let mut state = RetryState::new();
        state.attempt = 20;
        let capped = RetryConfig::new()
            .with_base_delay_ms(1_000)
            .with_max_delay_ms(5_000)
            .with_jitter(JitterStrategy::None);
        assert_eq!(state.next_delay(&capped), Duration::from_millis(5_000));

        for jitter in [JitterStrategy::Full, JitterStrategy::Equal, JitterStrategy::Decorrelated] {
            let config = capped.clone().with_jitter(jitter);
            for _ in 0..50 {
                assert!(state.next_delay(&config) <= Duration::from_millis(5_000));
            }
        }
    }

    #[test]
    fn test_zero_attempts_means_one() {
        assert_eq!(RetryConfig::new().with_max_attempts(0).attempt_budget(), 1);
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = with_retry(&quick(4), &CancellationToken::new(), "test", always, |_| {
            let calls = Arc::clone(&calls);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                    Err("not yet".to_string())
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result, Ok(("done", 4)));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_exhaustion_makes_exactly_max_attempts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result: Result<((), usize), _> =
            with_retry(&quick(3), &CancellationToken::new(), "test", always, |_| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("down".to_string())
                }
            })
            .await;

        assert_eq!(
            result,
            Err(RetryError::Exhausted {
                attempts: 3,
                last: "down".to_string()
            })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let result: Result<((), usize), _> = with_retry(
            &quick(5),
            &CancellationToken::new(),
            "test",
            |e: &String| e != "forbidden",
            |_| async { Err("forbidden".to_string()) },
        )
        .await;

        assert_eq!(
            result,
            Err(RetryError::Fatal {
                attempts: 1,
                error: "forbidden".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_cancellation_stops_retrying() {
        let cancel = CancellationToken::new();
        let config = RetryConfig::new()
            .with_max_attempts(100)
            .with_base_delay_ms(10)
            .with_backoff(BackoffStrategy::Constant)
            .with_jitter(JitterStrategy::None);

        let trigger = cancel.clone();
        let result: Result<((), usize), _> = with_retry(&config, &cancel, "test", always, |attempt| {
            if attempt == 2 {
                trigger.cancel("shutdown");
            }
            async { Err("down".to_string()) }
        })
        .await;

        assert!(matches!(result, Err(RetryError::Cancelled { attempts: 2 })));
    }
}
