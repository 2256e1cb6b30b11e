//! Hierarchical configuration loader with precedence
//!
//! Loads configuration from multiple sources with the following precedence (low to high):
//! 1. Embedded defaults (built into binary)
//! 2. Runtime config file (~/.retrier/retrier.yaml)
//! 3. Environment variables (RETRIER_* prefix)
//! 4. CLI flags (handled by caller)

use crate::error::{Error, Result};
use crate::types::{RetryPoliciesConfig, RetryStrategy, RpcConfig, RuntimeConfig};
use camino::{Utf8Path, Utf8PathBuf};
use rust_embed::RustEmbed;
use serde::de::DeserializeOwned;
use std::env;
use std::fs;
use tracing::debug;

/// Name of the runtime config file inside the config directory
pub const RUNTIME_CONFIG_FILE: &str = "retrier.yaml";

/// Embedded configuration files
#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/../../embedded/config/"]
#[prefix = ""]
struct EmbeddedConfigs;

/// Configuration hierarchy loader
pub struct ConfigLoader {
    config_dir: Utf8PathBuf,
}

impl ConfigLoader {
    /// Create a loader rooted at the standard config directory (~/.retrier)
    pub fn new() -> Result<Self> {
        let config_dir = Self::default_config_dir()?;
        Ok(Self { config_dir })
    }

    /// Create a loader with a custom config directory
    pub fn with_dir(config_dir: Utf8PathBuf) -> Self {
        Self { config_dir }
    }

    fn default_config_dir() -> Result<Utf8PathBuf> {
        // HOME first so containers that remap it are respected
        let home = env::var("HOME")
            .ok()
            .map(std::path::PathBuf::from)
            .or_else(dirs::home_dir)
            .ok_or_else(|| Error::invalid_config("Could not determine home directory"))?;

        let home = Utf8PathBuf::from_path_buf(home)
            .map_err(|path| Error::invalid_config(format!("Home directory is not UTF-8: {:?}", path)))?;

        Ok(home.join(".retrier"))
    }

    /// Load runtime configuration with hierarchical precedence
    pub fn load_runtime_config(&self) -> Result<RuntimeConfig> {
        let mut config = Self::load_embedded_config::<RuntimeConfig>("retry-defaults.yaml")?;

        let runtime_config_path = self.config_path();
        if runtime_config_path.exists() {
            debug!("Loading runtime config from {}", runtime_config_path);
            let file_config = self.load_yaml_file::<RuntimeConfig>(&runtime_config_path)?;
            config = Self::merge_runtime_config(config, file_config);
        }

        config = self.apply_env_overrides(config)?;

        config.retry_policies.default.validate()?;
        for (operation, policy) in &config.retry_policies.operations {
            policy.validate().map_err(|e| {
                Error::invalid_config(format!("retry policy '{}': {}", operation, e.reason()))
            })?;
        }

        Ok(config)
    }

    fn load_embedded_config<T: DeserializeOwned>(filename: &str) -> Result<T> {
        let embedded_file = EmbeddedConfigs::get(filename).ok_or_else(|| {
            Error::config_not_found(format!("Embedded config not found: {}", filename))
        })?;

        let content = std::str::from_utf8(&embedded_file.data).map_err(|_| {
            Error::invalid_config(format!("Invalid UTF-8 in embedded config: {}", filename))
        })?;

        serde_yaml_ng::from_str(content)
            .map_err(|e| Error::yaml_parse(format!("embedded {}", filename), e))
    }

    fn load_yaml_file<T: DeserializeOwned>(&self, path: &Utf8Path) -> Result<T> {
        let content = fs::read_to_string(path)?;
        serde_yaml_ng::from_str(&content).map_err(|e| Error::yaml_parse(path.as_str(), e))
    }

    /// Merge two runtime configs (base is overridden by overlay)
    fn merge_runtime_config(base: RuntimeConfig, overlay: RuntimeConfig) -> RuntimeConfig {
        RuntimeConfig {
            retry_policies: Self::merge_retry_policies(base.retry_policies, overlay.retry_policies),
            rpc: Self::merge_rpc(base.rpc, overlay.rpc),
        }
    }

    /// Operation policies merge key by key; the default policy is replaced
    fn merge_retry_policies(
        mut base: RetryPoliciesConfig,
        overlay: RetryPoliciesConfig,
    ) -> RetryPoliciesConfig {
        for (key, policy) in overlay.operations {
            base.operations.insert(key, policy);
        }
        base.default = overlay.default;
        base
    }

    fn merge_rpc(base: RpcConfig, overlay: RpcConfig) -> RpcConfig {
        RpcConfig {
            endpoint: overlay.endpoint.or(base.endpoint),
            ..overlay
        }
    }

    /// Apply environment variable overrides to the default policy and RPC settings
    fn apply_env_overrides(&self, mut config: RuntimeConfig) -> Result<RuntimeConfig> {
        let policy = &mut config.retry_policies.default;

        if let Some(val) = env_var("RETRIER_MAX_ATTEMPTS") {
            let attempts = parse_signed("RETRIER_MAX_ATTEMPTS", &val)?;
            if attempts < 1 {
                return Err(Error::invalid_config(format!(
                    "RETRIER_MAX_ATTEMPTS must be at least 1 (got {})",
                    attempts
                )));
            }
            policy.max_attempts = u32::try_from(attempts).map_err(|_| {
                Error::invalid_config("RETRIER_MAX_ATTEMPTS is too large")
            })?;
        }

        if let Some(val) = env_var("RETRIER_DELAY_MS") {
            policy.delay_ms = parse_non_negative("RETRIER_DELAY_MS", &val)?;
        }

        if let Some(val) = env_var("RETRIER_STRATEGY") {
            policy.strategy = val.parse::<RetryStrategy>()?;
        }

        if let Some(val) = env_var("RETRIER_ATTEMPT_TIMEOUT_MS") {
            policy.attempt_timeout_ms =
                Some(parse_non_negative("RETRIER_ATTEMPT_TIMEOUT_MS", &val)?);
        }

        if let Some(val) = env_var("RETRIER_RPC_URL") {
            config.rpc.endpoint = Some(val);
        }

        if let Some(val) = env_var("RETRIER_RPC_TIMEOUT_SECS") {
            config.rpc.request_timeout_secs = parse_non_negative("RETRIER_RPC_TIMEOUT_SECS", &val)?;
        }

        Ok(config)
    }

    /// Get the config directory path
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    /// Path of the runtime config file
    pub fn config_path(&self) -> Utf8PathBuf {
        self.config_dir.join(RUNTIME_CONFIG_FILE)
    }
}

fn env_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|val| !val.trim().is_empty())
}

fn parse_signed(key: &str, val: &str) -> Result<i64> {
    val.trim()
        .parse::<i64>()
        .map_err(|_| Error::invalid_config(format!("{} must be a valid number (got '{}')", key, val)))
}

fn parse_non_negative(key: &str, val: &str) -> Result<u64> {
    let parsed = parse_signed(key, val)?;
    u64::try_from(parsed).map_err(|_| {
        Error::invalid_config(format!("{} must not be negative (got {})", key, parsed))
    })
}
