//! Exec command: run a process until it exits successfully

use crate::cli::ExecArgs;
use crate::output;
use anyhow::{anyhow, Result};
use retrier_core::retry::{ClosurePredicate, RetryError, RetryRunner, TracingObserver};
use retrier_core::types::RetryPolicy;
use retrier_core::ConfigLoader;
use std::io::ErrorKind;
use std::process::ExitStatus;
use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Why one run of the child process failed
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}")]
    Failed { program: String, status: ExitStatus },
}

impl ExecError {
    /// A missing or non-executable program will not appear on retry
    fn is_permanent(&self) -> bool {
        matches!(
            self,
            ExecError::Spawn { source, .. }
                if matches!(source.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied)
        )
    }
}

pub async fn run(args: ExecArgs, loader: &ConfigLoader, cancel: CancellationToken) -> Result<()> {
    let config = loader.load_runtime_config()?;
    let operation = args.policy.operation_name("exec").to_string();
    let policy = args.policy.resolve(&config, "exec")?;

    let (program, program_args) = args
        .command
        .split_first()
        .ok_or_else(|| anyhow!("no command given"))?;

    match exec_with_retry(program, program_args, policy, &operation, cancel).await {
        Ok(()) => {
            output::success(&format!("{} succeeded", program));
            Ok(())
        }
        Err(err) => super::fail(&err, child_exit_code(&err)),
    }
}

/// The last child's own exit code when it ran and failed, otherwise 1
fn child_exit_code(err: &RetryError<ExecError>) -> i32 {
    match err.last_error() {
        Some(ExecError::Failed { status, .. }) => status.code().unwrap_or(1),
        _ => 1,
    }
}

/// Run `program` under `policy`, retrying non-zero exits
pub async fn exec_with_retry(
    program: &str,
    args: &[String],
    policy: RetryPolicy,
    operation: &str,
    cancel: CancellationToken,
) -> std::result::Result<(), RetryError<ExecError>> {
    RetryRunner::builder()
        .with_policy(policy)
        .with_predicate(ClosurePredicate::new(|err: &ExecError| !err.is_permanent()))
        .with_observer(TracingObserver::new(operation))
        .with_cancellation(cancel)
        .build()
        .run(|| run_once(program, args))
        .await
}

async fn run_once(program: &str, args: &[String]) -> std::result::Result<(), ExecError> {
    let status = Command::new(program)
        .args(args)
        // a timed out attempt drops the future; take the child down with it
        .kill_on_drop(true)
        .status()
        .await
        .map_err(|source| ExecError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(ExecError::Failed {
            program: program.to_string(),
            status,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn quick_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::fixed(max_attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_successful_command() {
        let result = exec_with_retry("true", &[], quick_policy(3), "exec", CancellationToken::new()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_failing_command_exhausts_attempts() {
        let temp = TempDir::new().unwrap();
        let marker = temp.path().join("runs");
        let script = format!("echo x >> {}; exit 3", marker.display());

        let result = exec_with_retry(
            "sh",
            &["-c".to_string(), script],
            quick_policy(3),
            "exec",
            CancellationToken::new(),
        )
        .await;

        let err = result.unwrap_err();
        assert!(err.is_exhausted());
        assert!(matches!(err.last_error(), Some(ExecError::Failed { .. })));

        let runs = std::fs::read_to_string(&marker).unwrap();
        assert_eq!(runs.lines().count(), 3);
        assert_eq!(child_exit_code(&err), 3);
    }

    #[tokio::test]
    async fn test_command_succeeds_on_second_attempt() {
        let temp = TempDir::new().unwrap();
        let marker = temp.path().join("seen");
        let script = format!(
            "if [ -f {0} ]; then exit 0; else touch {0}; exit 1; fi",
            marker.display()
        );

        let result = exec_with_retry(
            "sh",
            &["-c".to_string(), script],
            quick_policy(3),
            "exec",
            CancellationToken::new(),
        )
        .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_missing_program_is_not_retried() {
        let result = exec_with_retry(
            "retrier-definitely-not-a-real-binary",
            &[],
            quick_policy(5),
            "exec",
            CancellationToken::new(),
        )
        .await;

        let err = result.unwrap_err();
        assert!(err.is_non_retryable());
        assert_eq!(child_exit_code(&err), 1);
    }

    #[tokio::test]
    async fn test_slow_command_times_out() {
        let policy = quick_policy(2).with_attempt_timeout(Duration::from_millis(50));

        let result = exec_with_retry(
            "sleep",
            &["5".to_string()],
            policy,
            "exec",
            CancellationToken::new(),
        )
        .await;

        let err = result.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.attempts(), 2);
    }
}
