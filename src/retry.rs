//! Retry engine: exponential backoff with jitter and retry classification.
//!
//! Attempts inside one retry sequence are strictly sequential. Attempt
//! `n + 1` starts only after attempt `n` settled and its backoff elapsed.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{ClientError, Result};

/// Status codes retried by default.
pub const DEFAULT_RETRYABLE_STATUS_CODES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Custom retry predicate. Receives the error and the 1-based attempt that
/// produced it.
pub type RetryPredicate = Arc<dyn Fn(&ClientError, u32) -> bool + Send + Sync>;

/// Configures a retry sequence. Immutable for the duration of a call.
#[derive(Clone)]
pub struct RetryOptions {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Fraction of the delay used as symmetric random jitter (`0.1` = ±10%).
    pub jitter_factor: f64,
    pub retryable_status_codes: Vec<u16>,
    /// Replaces the built-in classification when set. The attempt limit is
    /// still enforced before the predicate is consulted.
    pub should_retry: Option<RetryPredicate>,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            jitter_factor: 0.1,
            retryable_status_codes: DEFAULT_RETRYABLE_STATUS_CODES.to_vec(),
            should_retry: None,
        }
    }
}

impl fmt::Debug for RetryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOptions")
            .field("max_attempts", &self.max_attempts)
            .field("initial_delay_ms", &self.initial_delay_ms)
            .field("max_delay_ms", &self.max_delay_ms)
            .field("jitter_factor", &self.jitter_factor)
            .field("retryable_status_codes", &self.retryable_status_codes)
            .field("should_retry", &self.should_retry.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl RetryOptions {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_initial_delay_ms(mut self, delay_ms: u64) -> Self {
        self.initial_delay_ms = delay_ms;
        self
    }

    pub fn with_max_delay_ms(mut self, delay_ms: u64) -> Self {
        self.max_delay_ms = delay_ms;
        self
    }

    pub fn with_jitter_factor(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor;
        self
    }

    pub fn with_retryable_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_status_codes = codes.into_iter().collect();
        self
    }

    /// Installs a predicate that fully overrides the built-in rules.
    pub fn with_should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ClientError, u32) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Some(Arc::new(predicate));
        self
    }

    /// Options that perform exactly one attempt.
    pub fn no_retry() -> Self {
        Self::default().with_max_attempts(1)
    }
}

/// Backoff computed for one attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryState {
    pub attempt: u32,
    /// Delay to wait before the next attempt.
    pub delay_ms: u64,
    /// Un-jittered backoff accumulated over attempts `1..attempt`, plus `delay_ms`.
    pub total_delay_ms: u64,
}

impl RetryState {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// One failed attempt recorded by [`with_retry_tracking`].
#[derive(Clone, Debug)]
pub struct FailedAttempt {
    pub attempt: u32,
    pub error: ClientError,
    /// Backoff slept after this failure; `0` when no retry followed.
    pub delay_ms: u64,
}

#[derive(Clone, Debug, Default)]
pub struct RetryTracker {
    pub total_attempts: u32,
    pub success_attempt: Option<u32>,
    pub errors: Vec<FailedAttempt>,
}

/// Result of a tracked retry sequence. The tracker is returned on both
/// success and failure.
#[derive(Debug)]
pub struct RetryReport<T> {
    pub result: Result<T>,
    pub tracker: RetryTracker,
}

/// Computes the backoff after a failed `attempt` (1-based).
///
/// `delay = clamp(initial * 2^(attempt-1) + jitter, 0, max_delay)` where
/// `jitter = base * jitter_factor * uniform(-1, 1)`.
pub fn calculate_backoff_delay(attempt: u32, options: &RetryOptions) -> RetryState {
    let unit = if options.jitter_factor > 0.0 {
        rand::rng().random_range(-1.0..=1.0)
    } else {
        0.0
    };
    backoff_with_unit(attempt, options, unit)
}

fn backoff_with_unit(attempt: u32, options: &RetryOptions, unit: f64) -> RetryState {
    let attempt = attempt.max(1);
    let max = options.max_delay_ms as f64;

    let base = exponential_base(attempt, options);
    let jitter = base * options.jitter_factor * unit;
    let delay = (base + jitter).clamp(0.0, max);

    let previous = accumulated_backoff(attempt, options);

    RetryState {
        attempt,
        delay_ms: delay.round() as u64,
        total_delay_ms: (previous + delay).round() as u64,
    }
}

/// Sum of the capped, un-jittered delays for attempts `1..attempt`.
///
/// Closed form: `initial * (2^m - 1)` over the `m` attempts below the cap,
/// plus `max` for each remaining one.
fn accumulated_backoff(attempt: u32, options: &RetryOptions) -> f64 {
    let previous = attempt.saturating_sub(1);
    if previous == 0 || options.initial_delay_ms == 0 {
        return 0.0;
    }

    let max = options.max_delay_ms as f64;
    let initial = options.initial_delay_ms as f64;

    // With a non-zero initial delay the base reaches any u64 cap within 65 steps.
    let mut uncapped = 0u32;
    while uncapped < previous && exponential_base(uncapped + 1, options) < max {
        uncapped += 1;
    }

    initial * (2f64.powi(uncapped as i32) - 1.0) + max * f64::from(previous - uncapped)
}

fn exponential_base(attempt: u32, options: &RetryOptions) -> f64 {
    let exp = attempt.saturating_sub(1).min(64) as i32;
    options.initial_delay_ms as f64 * 2f64.powi(exp)
}

/// Decides whether `error`, produced by `attempt`, should be retried.
///
/// The attempt limit wins over everything. A custom predicate otherwise has
/// the final word; without one, network errors and timeouts retry and API
/// errors retry only for a configured status code.
pub fn should_retry_error(error: &ClientError, attempt: u32, options: &RetryOptions) -> bool {
    if attempt > options.max_attempts {
        return false;
    }

    if let Some(predicate) = &options.should_retry {
        return predicate(error, attempt);
    }

    match error {
        ClientError::Network { .. } | ClientError::Timeout { .. } => true,
        ClientError::Api { status, .. } => options.retryable_status_codes.contains(status),
        ClientError::Cancelled => false,
    }
}

/// Runs `f` until it succeeds, fails permanently, or attempts run out.
///
/// Non-retryable errors are returned at once without sleeping. After the
/// last attempt the last error is returned.
pub async fn with_retry<F, Fut, T>(f: F, options: &RetryOptions) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut tracker = RetryTracker::default();
    retry_loop(f, options, None, &mut tracker).await
}

/// Same rules as [`with_retry`], recording every attempt.
pub async fn with_retry_tracking<F, Fut, T>(f: F, options: &RetryOptions) -> RetryReport<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut tracker = RetryTracker::default();
    let result = retry_loop(f, options, None, &mut tracker).await;
    RetryReport { result, tracker }
}

/// Same rules as [`with_retry`], aborting with [`ClientError::Cancelled`]
/// once `cancel` fires.
///
/// The token is checked before each attempt, and both the running attempt
/// and the backoff sleep are raced against it. A cancelled attempt future is
/// dropped, which aborts any request it had in flight.
pub async fn with_retry_cancellable<F, Fut, T>(
    f: F,
    options: &RetryOptions,
    cancel: &CancellationToken,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut tracker = RetryTracker::default();
    retry_loop(f, options, Some(cancel), &mut tracker).await
}

async fn retry_loop<F, Fut, T>(
    mut f: F,
    options: &RetryOptions,
    cancel: Option<&CancellationToken>,
    tracker: &mut RetryTracker,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = options.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(ClientError::Cancelled);
        }

        attempt += 1;
        tracker.total_attempts = attempt;

        let outcome = match cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(ClientError::Cancelled),
                    outcome = f() => outcome,
                }
            }
            None => f().await,
        };

        let err = match outcome {
            Ok(value) => {
                tracker.success_attempt = Some(attempt);
                return Ok(value);
            }
            Err(err) => err,
        };

        if attempt >= max_attempts || !should_retry_error(&err, attempt, options) {
            tracker.errors.push(FailedAttempt {
                attempt,
                error: err.clone(),
                delay_ms: 0,
            });
            return Err(err);
        }

        let state = calculate_backoff_delay(attempt, options);
        debug!(
            attempt,
            max_attempts,
            delay_ms = state.delay_ms,
            error = %err,
            "retrying request"
        );
        tracker.errors.push(FailedAttempt {
            attempt,
            error: err,
            delay_ms: state.delay_ms,
        });

        match cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(ClientError::Cancelled),
                    _ = sleep(state.delay()) => {}
                }
            }
            None => sleep(state.delay()).await,
        }
    }
}
