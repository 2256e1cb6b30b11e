//! Retry runner for flaky asynchronous actions
//!
//! Wraps network-dependent steps (bundler JSON-RPC calls, wallet SDK
//! operations, receipt polling) so that transient failures are retried a
//! bounded number of times with a pause in between.
//!
//! # Features
//!
//! - Bounded attempts: the action runs at most `max_attempts` times
//! - The last attempt's error is surfaced verbatim on exhaustion
//! - Delay strategies: None, Fixed (default), Exponential, Linear
//! - Optional per-attempt timeout and external cancellation
//! - Every session step reported to a `RetryObserver` as a `SessionEvent`
//! - Pluggable `Sleeper` for the inter-attempt delay
//!
//! # Example
//!
//! ```rust,no_run
//! use retrier_core::retry::{run_with_retry, RetryError};
//! use std::time::Duration;
//!
//! async fn example() -> Result<u64, RetryError<std::io::Error>> {
//!     run_with_retry(|| async { Ok(42) }, 3, Duration::from_millis(500)).await
//! }
//! ```

mod error;
mod observer;
mod runner;
mod sleeper;
mod strategies;

pub use error::RetryError;
pub use observer::{
    AttemptFailure, NoOpObserver, RetryObserver, SessionEvent, StatsObserver, TracingObserver,
};
pub use runner::{run_with_policy, run_with_retry, RetryRunner, RetryRunnerBuilder};
pub use sleeper::{RecordingSleeper, Sleeper, TokioSleeper};
pub use strategies::{
    calculate_delay, AlwaysRetry, ClosurePredicate, HttpStatusError, HttpStatusPredicate,
    MessagePredicate, RetryPredicate, RETRYABLE_HTTP_STATUSES,
};

pub use tokio_util::sync::CancellationToken;
