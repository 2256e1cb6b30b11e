//! Runtime configuration types for operational parameters
//!
//! These types control how flaky operations are retried and how the CLI
//! reaches JSON-RPC endpoints. They are plain data: the retry runner takes a
//! resolved [`RetryPolicy`] as an explicit argument and never reads the
//! environment itself.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Complete runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RuntimeConfig {
    /// Retry policy configurations
    #[serde(default)]
    pub retry_policies: RetryPoliciesConfig,

    /// JSON-RPC endpoint settings
    #[serde(default)]
    pub rpc: RpcConfig,
}

/// JSON-RPC client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RpcConfig {
    /// Default bundler/paymaster endpoint
    #[serde(default)]
    pub endpoint: Option<String>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// User agent string for HTTP requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            request_timeout_secs: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_request_timeout() -> u64 {
    30
}
fn default_user_agent() -> String {
    format!(
        "retrier/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// Retry policy configurations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryPoliciesConfig {
    /// Default retry policy
    #[serde(default)]
    pub default: RetryPolicy,

    /// Per-operation retry policies
    #[serde(default)]
    pub operations: HashMap<String, RetryPolicy>,
}

impl RetryPoliciesConfig {
    /// Policy for a named operation, falling back to the default policy
    pub fn policy_for(&self, operation: &str) -> &RetryPolicy {
        self.operations.get(operation).unwrap_or(&self.default)
    }
}

/// Default pause between a failed attempt and the next one
pub const DEFAULT_DELAY_MS: u64 = 500;

/// Retry policy for an operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryPolicy {
    /// Inclusive upper bound on invocations of the action (1 = no retry)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Retry strategy
    #[serde(default)]
    pub strategy: RetryStrategy,

    /// Base delay in milliseconds
    #[serde(default = "default_delay")]
    pub delay_ms: u64,

    /// Backoff multiplier for exponential strategies
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Ceiling for backoff growth in milliseconds; never shortens `delay-ms`
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Per-attempt timeout in milliseconds; a timed out attempt counts as failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt_timeout_ms: Option<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            strategy: RetryStrategy::default(),
            delay_ms: default_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay(),
            attempt_timeout_ms: None,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_delay() -> u64 {
    DEFAULT_DELAY_MS
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_max_delay() -> u64 {
    30000
}

impl RetryPolicy {
    /// Fixed-delay policy with the given attempt budget
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            strategy: RetryStrategy::FixedDelay,
            delay_ms: delay.as_millis() as u64,
            ..Self::default()
        }
    }

    /// Build a fixed-delay policy from signed inputs (CLI flags, env values)
    ///
    /// Rejects `max_attempts < 1` and `delay_ms < 0`.
    pub fn try_from_signed(max_attempts: i64, delay_ms: i64) -> Result<Self> {
        if max_attempts < 1 {
            return Err(Error::invalid_config(format!(
                "max-attempts must be at least 1 (got {})",
                max_attempts
            )));
        }
        if delay_ms < 0 {
            return Err(Error::invalid_config(format!(
                "delay-ms must not be negative (got {})",
                delay_ms
            )));
        }
        let max_attempts = u32::try_from(max_attempts).map_err(|_| {
            Error::invalid_config(format!("max-attempts is too large (got {})", max_attempts))
        })?;

        Ok(Self::fixed(max_attempts, Duration::from_millis(delay_ms as u64)))
    }

    /// Set the per-attempt timeout
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Set the retry strategy
    pub fn with_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Base delay as a `Duration`
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Per-attempt timeout as a `Duration`, if one is configured
    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout_ms.map(Duration::from_millis)
    }

    /// Check the policy before any attempt is made
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts < 1 {
            return Err(Error::invalid_config(format!(
                "max-attempts must be at least 1 (got {})",
                self.max_attempts
            )));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier <= 0.0 {
            return Err(Error::invalid_config(format!(
                "backoff-multiplier must be a positive number (got {})",
                self.backoff_multiplier
            )));
        }
        if self.attempt_timeout_ms == Some(0) {
            return Err(Error::invalid_config(
                "attempt-timeout-ms must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Retry strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RetryStrategy {
    /// Retry immediately
    None,

    /// Fixed delay between retries (default)
    #[default]
    FixedDelay,

    /// Exponential backoff
    ExponentialBackoff,

    /// Linear backoff
    LinearBackoff,
}

impl RetryStrategy {
    /// Kebab-case name as used in configuration files
    pub fn as_str(&self) -> &'static str {
        match self {
            RetryStrategy::None => "none",
            RetryStrategy::FixedDelay => "fixed-delay",
            RetryStrategy::ExponentialBackoff => "exponential-backoff",
            RetryStrategy::LinearBackoff => "linear-backoff",
        }
    }
}

impl fmt::Display for RetryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetryStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(RetryStrategy::None),
            "fixed" | "fixed-delay" => Ok(RetryStrategy::FixedDelay),
            "exponential" | "exponential-backoff" => Ok(RetryStrategy::ExponentialBackoff),
            "linear" | "linear-backoff" => Ok(RetryStrategy::LinearBackoff),
            other => Err(Error::invalid_strategy(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_fixed_half_second() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.strategy, RetryStrategy::FixedDelay);
        assert_eq!(policy.delay(), Duration::from_millis(500));
        assert!(policy.attempt_timeout().is_none());
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_try_from_signed_rejects_zero_and_negative_attempts() {
        assert!(RetryPolicy::try_from_signed(0, 500).is_err());
        assert!(RetryPolicy::try_from_signed(-1, 500).is_err());
        assert!(RetryPolicy::try_from_signed(1, 500).is_ok());
    }

    #[test]
    fn test_try_from_signed_rejects_negative_delay() {
        let err = RetryPolicy::try_from_signed(3, -10).unwrap_err();
        assert!(err.to_string().contains("delay-ms"));
    }

    #[test]
    fn test_validate_zero_attempts() {
        let policy = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_validate_zero_timeout() {
        let policy = RetryPolicy::default().with_attempt_timeout(Duration::ZERO);
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!(
            "exponential".parse::<RetryStrategy>().unwrap(),
            RetryStrategy::ExponentialBackoff
        );
        assert_eq!(
            "Fixed-Delay".parse::<RetryStrategy>().unwrap(),
            RetryStrategy::FixedDelay
        );
        assert!("sometimes".parse::<RetryStrategy>().is_err());
    }

    #[test]
    fn test_policy_for_falls_back_to_default() {
        let mut config = RetryPoliciesConfig::default();
        config
            .operations
            .insert("user-op-receipt".to_string(), RetryPolicy::fixed(10, Duration::from_secs(2)));

        assert_eq!(config.policy_for("user-op-receipt").max_attempts, 10);
        assert_eq!(config.policy_for("unknown").max_attempts, 3);
    }

    #[test]
    fn test_policy_yaml_kebab_case() {
        let yaml = r#"
max-attempts: 5
strategy: linear-backoff
delay-ms: 250
attempt-timeout-ms: 1000
"#;
        let policy: RetryPolicy = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.strategy, RetryStrategy::LinearBackoff);
        assert_eq!(policy.delay_ms, 250);
        assert_eq!(policy.max_delay_ms, 30000);
        assert_eq!(policy.attempt_timeout(), Some(Duration::from_secs(1)));
    }
}
