//! Session events and the observers that consume them
//!
//! Earlier attempt failures never reach the caller. The runner reports every
//! step of a session as a [`SessionEvent`]; observers log or count them.

use std::fmt::{self, Display};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Why one attempt produced no value
#[derive(Clone, Copy)]
pub enum AttemptFailure<'a> {
    /// The action returned an error
    Error(&'a dyn Display),
    /// The action did not settle within the per-attempt timeout
    TimedOut(Duration),
}

impl AttemptFailure<'_> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, AttemptFailure::TimedOut(_))
    }
}

impl Display for AttemptFailure<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptFailure::Error(err) => err.fmt(f),
            AttemptFailure::TimedOut(timeout) => {
                write!(f, "attempt timed out after {}ms", timeout.as_millis())
            }
        }
    }
}

/// One step of a retry session, in the order the runner emits them
///
/// A session is a run of `AttemptStarted`, each followed by either
/// `AttemptFailed` (another attempt comes after `delay`) or one terminal
/// event: `Succeeded`, `Exhausted`, `NonRetryable` or `Cancelled`.
#[derive(Clone, Copy)]
pub enum SessionEvent<'a> {
    AttemptStarted {
        attempt: u32,
        max_attempts: u32,
    },
    AttemptFailed {
        attempt: u32,
        failure: AttemptFailure<'a>,
        delay: Duration,
    },
    Succeeded {
        attempt: u32,
        elapsed: Duration,
    },
    /// The final permitted attempt failed
    Exhausted {
        attempts: u32,
        failure: AttemptFailure<'a>,
    },
    /// A predicate classified the error as permanent
    NonRetryable {
        attempt: u32,
        error: &'a dyn Display,
    },
    /// The cancellation token fired; `attempts` is how many were made
    Cancelled {
        attempts: u32,
    },
}

/// Receives the events of every session a runner executes
///
/// ```rust
/// use retrier_core::retry::{RetryObserver, SessionEvent};
///
/// struct ReportObserver;
///
/// impl RetryObserver for ReportObserver {
///     fn observe(&self, event: &SessionEvent<'_>) {
///         if let SessionEvent::AttemptFailed { attempt, failure, .. } = event {
///             println!("attempt {} failed: {}", attempt, failure);
///         }
///     }
/// }
/// ```
pub trait RetryObserver: Send + Sync {
    fn observe(&self, event: &SessionEvent<'_>);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl RetryObserver for NoOpObserver {
    fn observe(&self, _event: &SessionEvent<'_>) {}
}

/// Logs session events with `tracing`, tagged with an operation name
///
/// Attempt starts and first-attempt successes are DEBUG; failures that will
/// be retried, permanent errors and cancellation are WARN; a success after
/// a retry is INFO and exhaustion is ERROR.
#[derive(Debug, Clone)]
pub struct TracingObserver {
    operation: String,
}

impl TracingObserver {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl Default for TracingObserver {
    fn default() -> Self {
        Self::new("retry")
    }
}

impl RetryObserver for TracingObserver {
    fn observe(&self, event: &SessionEvent<'_>) {
        let operation = self.operation.as_str();
        match *event {
            SessionEvent::AttemptStarted {
                attempt,
                max_attempts,
            } => {
                tracing::debug!(operation, attempt, max_attempts, "starting attempt");
            }
            SessionEvent::AttemptFailed {
                attempt,
                failure,
                delay,
            } => {
                tracing::warn!(
                    operation,
                    attempt,
                    error = %failure,
                    timed_out = failure.is_timeout(),
                    delay_ms = delay.as_millis() as u64,
                    "attempt failed, will retry"
                );
            }
            SessionEvent::Succeeded { attempt: 1, elapsed } => {
                tracing::debug!(
                    operation,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "succeeded on first attempt"
                );
            }
            SessionEvent::Succeeded { attempt, elapsed } => {
                tracing::info!(
                    operation,
                    attempt,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "succeeded after retry"
                );
            }
            SessionEvent::Exhausted { attempts, failure } => {
                tracing::error!(operation, attempts, error = %failure, "all retry attempts exhausted");
            }
            SessionEvent::NonRetryable { attempt, error } => {
                tracing::warn!(operation, attempt, error = %error, "giving up on non-retryable error");
            }
            SessionEvent::Cancelled { attempts } => {
                tracing::warn!(operation, attempts, "retry cancelled");
            }
        }
    }
}

/// Counts session events; shared across sessions when wrapped in an `Arc`
#[derive(Debug, Default)]
pub struct StatsObserver {
    attempt_starts: AtomicU32,
    failures: AtomicU32,
    timeouts: AtomicU32,
    successes: AtomicU32,
    exhaustions: AtomicU32,
    non_retryables: AtomicU32,
    cancellations: AtomicU32,
}

impl StatsObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempt_starts(&self) -> u32 {
        self.attempt_starts.load(Ordering::SeqCst)
    }

    /// Failures that were followed by another attempt
    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    /// Attempts that hit the per-attempt timeout, including a final one
    pub fn timeouts(&self) -> u32 {
        self.timeouts.load(Ordering::SeqCst)
    }

    pub fn successes(&self) -> u32 {
        self.successes.load(Ordering::SeqCst)
    }

    pub fn exhaustions(&self) -> u32 {
        self.exhaustions.load(Ordering::SeqCst)
    }

    pub fn non_retryables(&self) -> u32 {
        self.non_retryables.load(Ordering::SeqCst)
    }

    pub fn cancellations(&self) -> u32 {
        self.cancellations.load(Ordering::SeqCst)
    }

    fn bump(counter: &AtomicU32) {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

impl RetryObserver for StatsObserver {
    fn observe(&self, event: &SessionEvent<'_>) {
        match event {
            SessionEvent::AttemptStarted { .. } => Self::bump(&self.attempt_starts),
            SessionEvent::AttemptFailed { failure, .. } => {
                Self::bump(&self.failures);
                if failure.is_timeout() {
                    Self::bump(&self.timeouts);
                }
            }
            SessionEvent::Succeeded { .. } => Self::bump(&self.successes),
            SessionEvent::Exhausted { failure, .. } => {
                Self::bump(&self.exhaustions);
                if failure.is_timeout() {
                    Self::bump(&self.timeouts);
                }
            }
            SessionEvent::NonRetryable { .. } => Self::bump(&self.non_retryables),
            SessionEvent::Cancelled { .. } => Self::bump(&self.cancellations),
        }
    }
}

impl<T: RetryObserver + ?Sized> RetryObserver for Arc<T> {
    fn observe(&self, event: &SessionEvent<'_>) {
        (**self).observe(event)
    }
}

impl<T: RetryObserver + ?Sized> RetryObserver for Box<T> {
    fn observe(&self, event: &SessionEvent<'_>) {
        (**self).observe(event)
    }
}
