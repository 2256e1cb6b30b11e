//! # retrier-core
//!
//! Core library for retrier providing:
//! - Retry runner for flaky async actions (bundler RPC calls, SDK steps, receipt polling)
//! - Delay strategies, retry predicates, observers and pluggable sleepers
//! - Retry policy types and hierarchical configuration loading

pub mod config;
pub mod error;
pub mod retry;
pub mod types;

pub use config::ConfigLoader;
pub use error::{Error, Result};
pub use retry::{run_with_retry, RetryError, RetryRunner};
pub use types::{RetryPolicy, RetryStrategy, RuntimeConfig};
