//! How a retry session ends when it does not produce a value
//!
//! The caller's error type `E` is carried through untouched: on exhaustion
//! the value returned by the final attempt is handed back as-is, never
//! wrapped or re-rendered.

use std::error::Error;
use std::fmt;
use std::time::Duration;

#[derive(Debug)]
pub enum RetryError<E> {
    /// The policy was rejected before any attempt was made
    InvalidConfiguration { reason: String },

    /// Every permitted attempt failed; `last_error` is the final attempt's
    Exhausted {
        attempts: u32,
        last_error: E,
        elapsed: Duration,
    },

    /// The cancellation token fired before the session finished
    Cancelled {
        attempts: u32,
        last_error: Option<E>,
    },

    /// The final attempt did not settle within the per-attempt timeout
    AttemptTimeout { attempt: u32, timeout: Duration },

    /// A predicate classified the error of `attempt` as permanent
    NonRetryable { attempt: u32, error: E },
}

impl<E> RetryError<E> {
    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        RetryError::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    /// Number of times the action was invoked
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::InvalidConfiguration { .. } => 0,
            RetryError::Exhausted { attempts, .. } | RetryError::Cancelled { attempts, .. } => {
                *attempts
            }
            RetryError::AttemptTimeout { attempt, .. }
            | RetryError::NonRetryable { attempt, .. } => *attempt,
        }
    }

    /// The most recent error returned by the action, if the session saw one
    pub fn last_error(&self) -> Option<&E> {
        match self {
            RetryError::Exhausted { last_error, .. }
            | RetryError::NonRetryable {
                error: last_error, ..
            } => Some(last_error),
            RetryError::Cancelled { last_error, .. } => last_error.as_ref(),
            RetryError::InvalidConfiguration { .. } | RetryError::AttemptTimeout { .. } => None,
        }
    }

    /// Consume the error, returning the action's own error value
    pub fn into_last_error(self) -> Option<E> {
        match self {
            RetryError::Exhausted { last_error, .. }
            | RetryError::NonRetryable {
                error: last_error, ..
            } => Some(last_error),
            RetryError::Cancelled { last_error, .. } => last_error,
            RetryError::InvalidConfiguration { .. } | RetryError::AttemptTimeout { .. } => None,
        }
    }

    pub fn is_invalid_configuration(&self) -> bool {
        matches!(self, RetryError::InvalidConfiguration { .. })
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RetryError::AttemptTimeout { .. })
    }

    pub fn is_non_retryable(&self) -> bool {
        matches!(self, RetryError::NonRetryable { .. })
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::InvalidConfiguration { reason } => {
                return write!(f, "invalid retry configuration: {}", reason);
            }
            RetryError::Exhausted {
                attempts, elapsed, ..
            } => write!(
                f,
                "gave up after {} attempts in {:.2}s",
                attempts,
                elapsed.as_secs_f64()
            )?,
            RetryError::Cancelled { attempts, .. } => {
                write!(f, "cancelled after {} attempts", attempts)?
            }
            RetryError::AttemptTimeout { attempt, timeout } => write!(
                f,
                "attempt {} timed out after {}ms",
                attempt,
                timeout.as_millis()
            )?,
            RetryError::NonRetryable { attempt, .. } => {
                write!(f, "attempt {} failed permanently", attempt)?
            }
        }

        match self.last_error() {
            Some(err) => write!(f, ": {}", err),
            None => Ok(()),
        }
    }
}

impl<E: Error + 'static> Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.last_error().map(|err| err as &(dyn Error + 'static))
    }
}
