//! Retry session execution
//!
//! A session invokes the action, and on failure waits and tries again until
//! it succeeds or `max_attempts` invocations have been made. Attempts are
//! strictly sequential. The runner holds no per-session state, so one runner
//! can serve any number of concurrent sessions.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::types::RetryPolicy;

use super::error::RetryError;
use super::observer::{AttemptFailure, NoOpObserver, RetryObserver, SessionEvent, TracingObserver};
use super::sleeper::{Sleeper, TokioSleeper};
use super::strategies::{calculate_delay, AlwaysRetry, RetryPredicate};

/// Run `action` up to `max_attempts` times with a fixed `delay` in between
///
/// On exhaustion the error from the final attempt is returned inside
/// [`RetryError::Exhausted`]. `max_attempts == 0` fails with
/// [`RetryError::InvalidConfiguration`] without invoking the action.
///
/// ```rust,no_run
/// use retrier_core::retry::run_with_retry;
/// use std::time::Duration;
///
/// async fn example() {
///     let price = run_with_retry(
///         || async { Ok::<_, std::io::Error>(42) },
///         3,
///         Duration::from_millis(500),
///     )
///     .await;
/// }
/// ```
pub async fn run_with_retry<F, Fut, T, E>(
    action: F,
    max_attempts: u32,
    delay: Duration,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    RetryRunner::builder()
        .with_policy(RetryPolicy::fixed(max_attempts, delay))
        .with_observer(TracingObserver::default())
        .build()
        .run(action)
        .await
}

/// Run `action` under a resolved policy, logging attempts under `operation`
pub async fn run_with_policy<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation: &str,
    action: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    RetryRunner::builder()
        .with_policy(policy.clone())
        .with_observer(TracingObserver::new(operation))
        .build()
        .run(action)
        .await
}

/// Builder for configuring a `RetryRunner`
///
/// ```rust
/// use retrier_core::retry::{RetryRunner, TracingObserver};
/// use retrier_core::types::RetryPolicy;
/// use std::time::Duration;
///
/// let runner = RetryRunner::builder()
///     .with_policy(RetryPolicy::fixed(5, Duration::from_secs(1)))
///     .with_observer(TracingObserver::new("eth_getUserOperationReceipt"))
///     .build();
/// ```
pub struct RetryRunnerBuilder<P = AlwaysRetry, O = NoOpObserver> {
    policy: RetryPolicy,
    predicate: P,
    observer: O,
    sleeper: Arc<dyn Sleeper>,
    cancel: Option<CancellationToken>,
    jitter: bool,
}

impl Default for RetryRunnerBuilder<AlwaysRetry, NoOpObserver> {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryRunnerBuilder<AlwaysRetry, NoOpObserver> {
    pub fn new() -> Self {
        Self {
            policy: RetryPolicy::default(),
            predicate: AlwaysRetry,
            observer: NoOpObserver,
            sleeper: Arc::new(TokioSleeper),
            cancel: None,
            jitter: false,
        }
    }
}

impl<P, O> RetryRunnerBuilder<P, O> {
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the predicate that decides which errors are retried
    pub fn with_predicate<P2>(self, predicate: P2) -> RetryRunnerBuilder<P2, O> {
        RetryRunnerBuilder {
            policy: self.policy,
            predicate,
            observer: self.observer,
            sleeper: self.sleeper,
            cancel: self.cancel,
            jitter: self.jitter,
        }
    }

    pub fn with_observer<O2>(self, observer: O2) -> RetryRunnerBuilder<P, O2> {
        RetryRunnerBuilder {
            policy: self.policy,
            predicate: self.predicate,
            observer,
            sleeper: self.sleeper,
            cancel: self.cancel,
            jitter: self.jitter,
        }
    }

    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Stop the session when `token` is cancelled
    ///
    /// The token is checked before each attempt and raced against the delay.
    /// An attempt that is already running is allowed to finish.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Add up to 25% random jitter to each delay. Disabled by default.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn build(self) -> RetryRunner<P, O> {
        RetryRunner {
            policy: self.policy,
            predicate: self.predicate,
            observer: self.observer,
            sleeper: self.sleeper,
            cancel: self.cancel,
            jitter: self.jitter,
        }
    }
}

/// Executes actions under a retry policy
///
/// Use [`RetryRunner::builder`] to create an instance.
pub struct RetryRunner<P = AlwaysRetry, O = NoOpObserver> {
    policy: RetryPolicy,
    predicate: P,
    observer: O,
    sleeper: Arc<dyn Sleeper>,
    cancel: Option<CancellationToken>,
    jitter: bool,
}

impl RetryRunner {
    pub fn builder() -> RetryRunnerBuilder {
        RetryRunnerBuilder::new()
    }
}

impl<P, O> RetryRunner<P, O> {
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(CancellationToken::is_cancelled)
            .unwrap_or(false)
    }
}

/// An attempt's failure while the runner still owns the action's error
enum Failed<E> {
    Action(E),
    TimedOut(Duration),
}

impl<E: Display> Failed<E> {
    fn report(&self) -> AttemptFailure<'_> {
        match self {
            Failed::Action(err) => AttemptFailure::Error(err),
            Failed::TimedOut(timeout) => AttemptFailure::TimedOut(*timeout),
        }
    }
}

impl<P, O> RetryRunner<P, O>
where
    O: RetryObserver,
{
    /// Run one retry session
    pub async fn run<F, Fut, T, E>(&self, mut action: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: RetryPredicate<E>,
    {
        if let Err(err) = self.policy.validate() {
            return Err(RetryError::invalid_configuration(err.reason()));
        }

        let max_attempts = self.policy.max_attempts;
        let start = Instant::now();
        let mut last_error: Option<E> = None;
        let mut attempt: u32 = 1;

        loop {
            if self.is_cancelled() {
                return Err(self.cancelled(attempt - 1, last_error));
            }

            self.observer.observe(&SessionEvent::AttemptStarted {
                attempt,
                max_attempts,
            });

            let failed = match self.attempt(&mut action).await {
                Ok(value) => {
                    self.observer.observe(&SessionEvent::Succeeded {
                        attempt,
                        elapsed: start.elapsed(),
                    });
                    return Ok(value);
                }
                Err(failed) => failed,
            };

            let failed = match failed {
                Failed::Action(error) if !self.predicate.should_retry(&error) => {
                    self.observer.observe(&SessionEvent::NonRetryable {
                        attempt,
                        error: &error,
                    });
                    return Err(RetryError::NonRetryable { attempt, error });
                }
                other => other,
            };

            if attempt >= max_attempts {
                self.observer.observe(&SessionEvent::Exhausted {
                    attempts: attempt,
                    failure: failed.report(),
                });
                return Err(match failed {
                    Failed::Action(last_error) => RetryError::Exhausted {
                        attempts: attempt,
                        last_error,
                        elapsed: start.elapsed(),
                    },
                    Failed::TimedOut(timeout) => RetryError::AttemptTimeout { attempt, timeout },
                });
            }

            let delay = calculate_delay(&self.policy, attempt, self.jitter);
            self.observer.observe(&SessionEvent::AttemptFailed {
                attempt,
                failure: failed.report(),
                delay,
            });

            last_error = match failed {
                Failed::Action(err) => Some(err),
                Failed::TimedOut(_) => None,
            };

            if !self.pause(delay).await {
                return Err(self.cancelled(attempt, last_error));
            }

            attempt += 1;
        }
    }

    fn cancelled<E>(&self, attempts: u32, last_error: Option<E>) -> RetryError<E> {
        self.observer.observe(&SessionEvent::Cancelled { attempts });
        RetryError::Cancelled {
            attempts,
            last_error,
        }
    }

    async fn attempt<F, Fut, T, E>(&self, action: &mut F) -> Result<T, Failed<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let fut = action();
        match self.policy.attempt_timeout() {
            Some(timeout) => match tokio::time::timeout(timeout, fut).await {
                Ok(result) => result.map_err(Failed::Action),
                Err(_) => Err(Failed::TimedOut(timeout)),
            },
            None => fut.await.map_err(Failed::Action),
        }
    }

    /// Wait out the delay; returns false if cancelled while waiting
    async fn pause(&self, delay: Duration) -> bool {
        let sleep = self.sleeper.sleep(delay);
        match &self.cancel {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => false,
                    _ = sleep => true,
                }
            }
            None => {
                sleep.await;
                true
            }
        }
    }
}
