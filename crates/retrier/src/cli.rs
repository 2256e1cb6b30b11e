//! CLI argument parsing with clap

use anyhow::{bail, Result};
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use retrier_core::types::{RetryPolicy, RetryStrategy, RuntimeConfig};

/// retrier - run flaky commands and JSON-RPC calls under a retry policy
#[derive(Parser, Debug)]
#[command(name = "retrier")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Directory holding retrier.yaml (defaults to ~/.retrier)
    #[arg(long, global = true, env = "RETRIER_CONFIG_DIR")]
    pub config_dir: Option<Utf8PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show version information
    Version(VersionArgs),

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Run a command, retrying while it exits non-zero
    Exec(ExecArgs),

    /// Send a JSON-RPC request, retrying transient failures
    Rpc(RpcArgs),
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show resolved configuration
    Show(ConfigShowArgs),
}

#[derive(Args, Debug)]
pub struct ConfigShowArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Overrides applied on top of the configured policy
#[derive(Args, Debug, Default)]
pub struct PolicyArgs {
    /// Named policy from the config file
    #[arg(long)]
    pub operation: Option<String>,

    /// Maximum number of attempts (1 = no retry)
    #[arg(short = 'n', long, allow_negative_numbers = true)]
    pub attempts: Option<i64>,

    /// Delay between attempts in milliseconds
    #[arg(long, allow_negative_numbers = true)]
    pub delay_ms: Option<i64>,

    /// Per-attempt timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Delay strategy: none, fixed-delay, exponential-backoff, linear-backoff
    #[arg(long)]
    pub strategy: Option<RetryStrategy>,
}

impl PolicyArgs {
    /// Resolve the effective policy: config for the operation, then flags
    pub fn resolve(&self, config: &RuntimeConfig, default_operation: &str) -> Result<RetryPolicy> {
        let mut policy = config
            .retry_policies
            .policy_for(self.operation_name(default_operation))
            .clone();

        if let Some(attempts) = self.attempts {
            if attempts < 1 {
                bail!("--attempts must be at least 1 (got {})", attempts);
            }
            policy.max_attempts = u32::try_from(attempts)?;
        }

        if let Some(delay_ms) = self.delay_ms {
            if delay_ms < 0 {
                bail!("--delay-ms must not be negative (got {})", delay_ms);
            }
            policy.delay_ms = delay_ms as u64;
        }

        if let Some(timeout_ms) = self.timeout_ms {
            policy.attempt_timeout_ms = Some(timeout_ms);
        }

        if let Some(strategy) = self.strategy {
            policy.strategy = strategy;
        }

        policy.validate()?;
        Ok(policy)
    }

    /// Operation name used for policy lookup and log context
    pub fn operation_name<'a>(&'a self, default_operation: &'a str) -> &'a str {
        self.operation.as_deref().unwrap_or(default_operation)
    }
}

#[derive(Args, Debug)]
pub struct ExecArgs {
    #[command(flatten)]
    pub policy: PolicyArgs,

    /// Program and arguments to run
    #[arg(required = true, last = true)]
    pub command: Vec<String>,
}

#[derive(Args, Debug)]
pub struct RpcArgs {
    #[command(flatten)]
    pub policy: PolicyArgs,

    /// Endpoint URL (defaults to rpc.endpoint / RETRIER_RPC_URL)
    #[arg(long)]
    pub url: Option<String>,

    /// JSON-RPC method, e.g. eth_supportedEntryPoints
    #[arg(long)]
    pub method: String,

    /// JSON-encoded params (defaults to [])
    #[arg(long)]
    pub params: Option<String>,
}
