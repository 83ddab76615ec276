//! Retry policies for handling transient failures.
//!
//! A [`RetryPolicy`] is consulted after every unsuccessful attempt of a call. It
//! decides whether to try again and how long to wait first; the dispatcher does
//! the waiting. Policies are stateful: the exponential policy grows its backoff
//! interval in place across the retries of one call.

use http::StatusCode;
use rand::Rng;
use std::time::Duration;

/// The outcome of a single attempt, as seen by a retry policy.
#[derive(Debug, Clone, Copy)]
pub enum Attempt<'a> {
    /// The server answered with this status.
    Response(StatusCode),
    /// The request failed below HTTP (connection refused, timeout, reset...).
    Transport(&'a reqwest::Error),
}

/// What the dispatcher should do after an unsuccessful attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Give up and surface the outcome of the last attempt.
    Stop,
    /// Wait for the given duration, then try again.
    RetryAfter(Duration),
}

impl RetryDecision {
    /// Returns `true` if another attempt should be made.
    pub fn is_retry(&self) -> bool {
        matches!(self, RetryDecision::RetryAfter(_))
    }
}

/// Decides whether a failed attempt should be retried.
///
/// `retry_count` is 0 after the first attempt, 1 after the second, and so on.
///
/// # Examples
///
/// ```
/// use opcall::retry::{Attempt, RetryDecision, RetryPolicy};
/// use std::time::Duration;
///
/// /// Retries rate-limited calls forever, once a second.
/// struct PatientOnRateLimit;
///
/// impl RetryPolicy for PatientOnRateLimit {
///     fn should_retry(&mut self, attempt: &Attempt<'_>, _retry_count: usize) -> RetryDecision {
///         match attempt {
///             Attempt::Response(status) if status.as_u16() == 429 => {
///                 RetryDecision::RetryAfter(Duration::from_secs(1))
///             }
///             _ => RetryDecision::Stop,
///         }
///     }
/// }
/// ```
pub trait RetryPolicy: Send {
    /// Decides what to do after an unsuccessful attempt.
    fn should_retry(&mut self, attempt: &Attempt<'_>, retry_count: usize) -> RetryDecision;
}

impl<P: RetryPolicy + ?Sized> RetryPolicy for Box<P> {
    fn should_retry(&mut self, attempt: &Attempt<'_>, retry_count: usize) -> RetryDecision {
        (**self).should_retry(attempt, retry_count)
    }
}

/// Never retries. Use for calls that must fail fast.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetryPolicy;

impl RetryPolicy for NoRetryPolicy {
    fn should_retry(&mut self, _attempt: &Attempt<'_>, _retry_count: usize) -> RetryDecision {
        RetryDecision::Stop
    }
}

/// How a status code is treated by [`ExponentialRetryPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// Already successful, nothing to retry.
    Success,
    /// Possibly transient: server overload, auth hiccup, timeout, rate limit, reset.
    Transient,
    /// Will not succeed on retry.
    Permanent,
}

/// Classifies a status code.
///
/// 501 and 505 are permanent, as is any status in `300..500` except 401, 408
/// and 429. Everything else from 500 up is transient, as are 401, 408, 429 and
/// 104 (connection reset). `100..300` is success; anything left is permanent.
///
/// # Examples
///
/// ```
/// use opcall::retry::{classify_status, StatusClass};
///
/// assert_eq!(classify_status(503), StatusClass::Transient);
/// assert_eq!(classify_status(429), StatusClass::Transient);
/// assert_eq!(classify_status(404), StatusClass::Permanent);
/// assert_eq!(classify_status(501), StatusClass::Permanent);
/// assert_eq!(classify_status(204), StatusClass::Success);
/// ```
pub fn classify_status(status: u16) -> StatusClass {
    match status {
        501 | 505 => StatusClass::Permanent,
        401 | 408 | 429 => StatusClass::Transient,
        300..=499 => StatusClass::Permanent,
        500.. | 104 => StatusClass::Transient,
        100..=299 => StatusClass::Success,
        _ => StatusClass::Permanent,
    }
}

/// Retries transient failures with a multiplicatively growing delay.
///
/// The first retry waits `backoff_interval`; each retry multiplies the interval
/// by `backoff_factor` for the next one. Once `retry_count` reaches
/// `max_retries` the policy stops regardless of the outcome.
///
/// # Examples
///
/// ```
/// use opcall::retry::ExponentialRetryPolicy;
/// use std::time::Duration;
///
/// // Defaults: 4 retries, 1s initial interval, factor 4 (1s, 4s, 16s, 64s).
/// let default_policy = ExponentialRetryPolicy::default();
/// assert_eq!(default_policy.max_retries(), 4);
///
/// let quick = ExponentialRetryPolicy::new(3, Duration::from_millis(100), 2).with_jitter(true);
/// assert_eq!(quick.backoff_interval(), Duration::from_millis(100));
/// ```
#[derive(Debug, Clone)]
pub struct ExponentialRetryPolicy {
    max_retries: usize,
    backoff_interval: Duration,
    backoff_factor: u32,
    jitter: bool,
}

impl ExponentialRetryPolicy {
    /// Creates a policy without jitter.
    pub fn new(max_retries: usize, backoff_interval: Duration, backoff_factor: u32) -> Self {
        Self {
            max_retries,
            backoff_interval,
            backoff_factor,
            jitter: false,
        }
    }

    /// Scales each delay by a random factor between 50% and 100%.
    ///
    /// The stored interval still grows deterministically.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Returns the retry budget.
    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// Returns the delay the next retry will wait (before jitter).
    pub fn backoff_interval(&self) -> Duration {
        self.backoff_interval
    }

    /// Returns the multiplier applied after each retry.
    pub fn backoff_factor(&self) -> u32 {
        self.backoff_factor
    }

    fn backoff(&mut self) -> RetryDecision {
        let delay = if self.jitter {
            let jitter_factor = rand::thread_rng().gen_range(0.5..=1.0);
            // Near `Duration::MAX` the f64 product can round past the range.
            Duration::try_from_secs_f64(self.backoff_interval.as_secs_f64() * jitter_factor)
                .map_or(self.backoff_interval, |delay| delay.min(self.backoff_interval))
        } else {
            self.backoff_interval
        };
        self.backoff_interval = self.backoff_interval.saturating_mul(self.backoff_factor);
        RetryDecision::RetryAfter(delay)
    }
}

impl Default for ExponentialRetryPolicy {
    fn default() -> Self {
        Self::new(4, Duration::from_secs(1), 4)
    }
}

impl RetryPolicy for ExponentialRetryPolicy {
    fn should_retry(&mut self, attempt: &Attempt<'_>, retry_count: usize) -> RetryDecision {
        if retry_count >= self.max_retries {
            return RetryDecision::Stop;
        }

        match attempt {
            Attempt::Transport(_) => self.backoff(),
            Attempt::Response(status) => match classify_status(status.as_u16()) {
                StatusClass::Transient => self.backoff(),
                StatusClass::Success | StatusClass::Permanent => RetryDecision::Stop,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> Attempt<'static> {
        Attempt::Response(StatusCode::from_u16(code).unwrap())
    }

    fn transport_error() -> reqwest::Error {
        reqwest::Client::new()
            .get("http://[::1")
            .build()
            .unwrap_err()
    }

    #[test]
    fn test_budget_boundary() {
        let mut policy = ExponentialRetryPolicy::default();
        assert_eq!(policy.should_retry(&status(500), 4), RetryDecision::Stop);
        assert_eq!(policy.should_retry(&status(429), 5), RetryDecision::Stop);

        let error = transport_error();
        assert_eq!(
            policy.should_retry(&Attempt::Transport(&error), 4),
            RetryDecision::Stop
        );
        assert_eq!(policy.backoff_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_server_error_backs_off_and_grows_interval() {
        let mut policy = ExponentialRetryPolicy::default();
        assert_eq!(
            policy.should_retry(&status(500), 0),
            RetryDecision::RetryAfter(Duration::from_secs(1))
        );
        assert_eq!(policy.backoff_interval(), Duration::from_secs(4));

        assert_eq!(
            policy.should_retry(&status(503), 1),
            RetryDecision::RetryAfter(Duration::from_secs(4))
        );
        assert_eq!(policy.backoff_interval(), Duration::from_secs(16));
    }

    #[test]
    fn test_transport_failure_retries() {
        let mut policy = ExponentialRetryPolicy::new(2, Duration::from_millis(10), 2);
        let error = transport_error();
        let decision = policy.should_retry(&Attempt::Transport(&error), 0);
        assert!(decision.is_retry());
        assert_eq!(policy.backoff_interval(), Duration::from_millis(20));
    }

    #[test]
    fn test_status_table() {
        let mut policy = ExponentialRetryPolicy::new(10, Duration::ZERO, 4);
        for code in [500, 502, 503, 504, 599, 401, 408, 429, 104] {
            assert!(
                policy.should_retry(&status(code), 0).is_retry(),
                "{} should be retried",
                code
            );
        }
        for code in [501, 505, 300, 302, 400, 403, 404, 409, 499, 200, 204, 100] {
            assert_eq!(
                policy.should_retry(&status(code), 0),
                RetryDecision::Stop,
                "{} should not be retried",
                code
            );
        }
    }

    #[test]
    fn test_stop_leaves_interval_untouched() {
        let mut policy = ExponentialRetryPolicy::default();
        assert_eq!(policy.should_retry(&status(404), 0), RetryDecision::Stop);
        assert_eq!(policy.backoff_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let mut policy =
            ExponentialRetryPolicy::new(3, Duration::from_millis(100), 2).with_jitter(true);
        match policy.should_retry(&status(500), 0) {
            RetryDecision::RetryAfter(delay) => {
                assert!(delay >= Duration::from_millis(50));
                assert!(delay <= Duration::from_millis(100));
            }
            RetryDecision::Stop => panic!("Expected a retry"),
        }
        assert_eq!(policy.backoff_interval(), Duration::from_millis(200));
    }

    #[test]
    fn test_jitter_at_saturated_interval() {
        let mut policy =
            ExponentialRetryPolicy::new(200, Duration::from_secs(1), 4).with_jitter(true);
        for retry_count in 0..100 {
            match policy.should_retry(&status(503), retry_count) {
                RetryDecision::RetryAfter(delay) => {
                    assert!(delay <= policy.backoff_interval());
                }
                RetryDecision::Stop => panic!("Expected a retry"),
            }
        }
        assert_eq!(policy.backoff_interval(), Duration::MAX);
    }

    #[test]
    fn test_no_retry_policy() {
        let mut policy = NoRetryPolicy;
        assert_eq!(policy.should_retry(&status(503), 0), RetryDecision::Stop);
        let error = transport_error();
        assert_eq!(
            policy.should_retry(&Attempt::Transport(&error), 0),
            RetryDecision::Stop
        );
    }
}
