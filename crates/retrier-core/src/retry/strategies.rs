//! Delay strategies and retry predicates

use crate::types::{RetryPolicy, RetryStrategy};
use rand::Rng;
use std::fmt::Display;
use std::time::Duration;

/// The pause that follows a failed attempt
///
/// `attempt` is the 1-indexed attempt that just failed. Backoff growth stops
/// at `policy.max_delay_ms`, but the ceiling never cuts below `delay_ms`: a
/// fixed-delay policy always waits exactly its configured delay. `jitter`
/// adds up to 25% on top.
///
/// ```rust
/// use retrier_core::retry::calculate_delay;
/// use retrier_core::types::{RetryPolicy, RetryStrategy};
///
/// let policy = RetryPolicy::default().with_strategy(RetryStrategy::ExponentialBackoff);
///
/// assert_eq!(calculate_delay(&policy, 1, false).as_millis(), 500);
/// assert_eq!(calculate_delay(&policy, 2, false).as_millis(), 1000);
/// ```
pub fn calculate_delay(policy: &RetryPolicy, attempt: u32, jitter: bool) -> Duration {
    let base = policy.delay_ms;
    let step = attempt.saturating_sub(1);

    let grown = match policy.strategy {
        RetryStrategy::None => return Duration::ZERO,
        RetryStrategy::FixedDelay => base,
        RetryStrategy::LinearBackoff => base.saturating_mul(u64::from(step) + 1),
        RetryStrategy::ExponentialBackoff => {
            // float-to-int `as` saturates, so runaway growth lands on u64::MAX
            (base as f64 * policy.backoff_multiplier.powf(f64::from(step))) as u64
        }
    };

    let delay_ms = grown.min(policy.max_delay_ms.max(base));
    Duration::from_millis(if jitter { add_jitter(delay_ms) } else { delay_ms })
}

fn add_jitter(delay_ms: u64) -> u64 {
    if delay_ms == 0 {
        return 0;
    }
    delay_ms + rand::rng().random_range(0..=delay_ms / 4)
}

/// Decides whether an error is worth another attempt
///
/// The runner retries everything by default. Install a predicate to stop
/// early on errors that will not go away, e.g. a rejected user operation
/// signature as opposed to a bundler timeout.
///
/// ```rust
/// use retrier_core::retry::RetryPredicate;
/// use std::io::{Error, ErrorKind};
///
/// struct IoRetryPredicate;
///
/// impl RetryPredicate<Error> for IoRetryPredicate {
///     fn should_retry(&self, error: &Error) -> bool {
///         !matches!(
///             error.kind(),
///             ErrorKind::NotFound | ErrorKind::PermissionDenied | ErrorKind::InvalidInput
///         )
///     }
/// }
/// ```
pub trait RetryPredicate<E: ?Sized>: Send + Sync {
    /// Determine whether the given error should be retried
    fn should_retry(&self, error: &E) -> bool;
}

/// All errors are retryable
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRetry;

impl<E: ?Sized> RetryPredicate<E> for AlwaysRetry {
    fn should_retry(&self, _error: &E) -> bool {
        true
    }
}

/// A predicate backed by a closure
pub struct ClosurePredicate<F> {
    predicate: F,
}

impl<F> ClosurePredicate<F> {
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<E, F> RetryPredicate<E> for ClosurePredicate<F>
where
    F: Fn(&E) -> bool + Send + Sync,
{
    fn should_retry(&self, error: &E) -> bool {
        (self.predicate)(error)
    }
}

/// Status codes worth another request: timeouts, rate limits and gateway errors
pub const RETRYABLE_HTTP_STATUSES: [u16; 7] = [408, 425, 429, 500, 502, 503, 504];

/// Retries errors whose HTTP status is in [`RETRYABLE_HTTP_STATUSES`]
///
/// An error with no status never got an answer from the server and is
/// treated as transient.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpStatusPredicate;

/// Errors that may carry an HTTP status
pub trait HttpStatusError {
    fn status_code(&self) -> Option<u16>;
}

impl<E: HttpStatusError> RetryPredicate<E> for HttpStatusPredicate {
    fn should_retry(&self, error: &E) -> bool {
        error
            .status_code()
            .is_none_or(|code| RETRYABLE_HTTP_STATUSES.contains(&code))
    }
}

/// Retries errors whose rendered message contains one of `patterns`,
/// compared case-insensitively
#[derive(Debug, Clone)]
pub struct MessagePredicate {
    patterns: Vec<String>,
}

impl MessagePredicate {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|pattern| pattern.as_ref().to_lowercase())
                .collect(),
        }
    }

    /// Transport failures typical of bundler and paymaster endpoints
    pub fn network_errors() -> Self {
        Self::new([
            "timeout",
            "timed out",
            "connection reset",
            "connection refused",
            "network unreachable",
            "temporary failure",
            "too many requests",
        ])
    }
}

impl<E: Display> RetryPredicate<E> for MessagePredicate {
    fn should_retry(&self, error: &E) -> bool {
        let message = error.to_string().to_lowercase();
        self.patterns.iter().any(|pattern| message.contains(pattern))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn policy(strategy: RetryStrategy) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            strategy,
            delay_ms: 1000,
            backoff_multiplier: 2.0,
            max_delay_ms: 30000,
            attempt_timeout_ms: None,
        }
    }

    #[test]
    fn test_none_strategy() {
        let policy = policy(RetryStrategy::None);
        assert_eq!(calculate_delay(&policy, 1, false), Duration::ZERO);
        assert_eq!(calculate_delay(&policy, 4, true), Duration::ZERO);
    }

    #[test]
    fn test_fixed_strategy() {
        let policy = policy(RetryStrategy::FixedDelay);
        assert_eq!(calculate_delay(&policy, 1, false), Duration::from_secs(1));
        assert_eq!(calculate_delay(&policy, 4, false), Duration::from_secs(1));
    }

    #[test]
    fn test_exponential_strategy() {
        let policy = policy(RetryStrategy::ExponentialBackoff);
        assert_eq!(calculate_delay(&policy, 1, false), Duration::from_secs(1));
        assert_eq!(calculate_delay(&policy, 2, false), Duration::from_secs(2));
        assert_eq!(calculate_delay(&policy, 3, false), Duration::from_secs(4));
    }

    #[test]
    fn test_linear_strategy() {
        let policy = policy(RetryStrategy::LinearBackoff);
        assert_eq!(calculate_delay(&policy, 1, false), Duration::from_secs(1));
        assert_eq!(calculate_delay(&policy, 3, false), Duration::from_secs(3));
    }

    #[test]
    fn test_max_delay_caps_backoff_growth() {
        let mut policy = policy(RetryStrategy::ExponentialBackoff);
        policy.max_delay_ms = 5000;
        assert_eq!(calculate_delay(&policy, 10, false), Duration::from_secs(5));
        assert_eq!(calculate_delay(&policy, 200, false), Duration::from_secs(5));
    }

    #[test]
    fn test_fixed_delay_above_ceiling_is_not_cut() {
        let mut policy = policy(RetryStrategy::FixedDelay);
        policy.delay_ms = 60_000;
        assert_eq!(calculate_delay(&policy, 1, false), Duration::from_secs(60));

        policy.strategy = RetryStrategy::LinearBackoff;
        assert_eq!(calculate_delay(&policy, 3, false), Duration::from_secs(60));
    }

    #[test]
    fn test_jitter_bounds() {
        let policy = policy(RetryStrategy::FixedDelay);
        for _ in 0..50 {
            let delay = calculate_delay(&policy, 1, true);
            assert!(delay >= Duration::from_millis(1000));
            assert!(delay <= Duration::from_millis(1250));
        }
    }

    #[test]
    fn test_closure_predicate() {
        let predicate =
            ClosurePredicate::new(|err: &io::Error| err.kind() != io::ErrorKind::NotFound);

        assert!(predicate.should_retry(&io::Error::new(io::ErrorKind::TimedOut, "t")));
        assert!(!predicate.should_retry(&io::Error::new(io::ErrorKind::NotFound, "n")));
    }

    struct StatusErr(Option<u16>);

    impl HttpStatusError for StatusErr {
        fn status_code(&self) -> Option<u16> {
            self.0
        }
    }

    #[test]
    fn test_http_status_predicate() {
        let predicate = HttpStatusPredicate;
        assert!(predicate.should_retry(&StatusErr(Some(503))));
        assert!(predicate.should_retry(&StatusErr(Some(429))));
        assert!(!predicate.should_retry(&StatusErr(Some(400))));
        assert!(!predicate.should_retry(&StatusErr(Some(401))));
        assert!(predicate.should_retry(&StatusErr(None)));
    }

    #[test]
    fn test_always_retry_is_the_default() {
        let err = io::Error::other("x");
        assert!(RetryPredicate::<io::Error>::should_retry(&AlwaysRetry, &err));
    }

    #[test]
    fn test_message_predicate() {
        let predicate = MessagePredicate::network_errors();
        assert!(predicate.should_retry(&io::Error::other("request Timed Out")));
        assert!(predicate.should_retry(&io::Error::other("connection refused")));
        assert!(!predicate.should_retry(&io::Error::other("invalid signature")));
    }
}
