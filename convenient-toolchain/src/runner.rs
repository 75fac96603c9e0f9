//! Tool runners: the async seam every build phase invokes tools through

use crate::error::{ToolError, ToolResult};
use crate::invocation::{ToolInvocation, ToolOutput};
use crate::retry::RetryPolicy;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, error, warn};

/// Executes [`ToolInvocation`]s and reports their exit status.
///
/// Implementations must be shareable across concurrently running compile
/// jobs. Only the exit status is interpreted by callers; output is captured
/// for diagnostics.
#[async_trait::async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run the invocation to completion
    async fn run(&self, invocation: &ToolInvocation) -> ToolResult<ToolOutput>;
}

/// Runs tools as child processes with a bounded wall time per invocation.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
    retry: RetryPolicy,
}

impl ProcessRunner {
    /// Create a runner that kills any tool running longer than `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Configured per-invocation timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn run_once(&self, invocation: &ToolInvocation) -> ToolResult<ToolOutput> {
        let start = Instant::now();

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|source| ToolError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;

        // Dropping the wait future on timeout drops the child, which kills it
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                return Err(ToolError::Timeout {
                    program: invocation.program.clone(),
                    secs: self.timeout.as_secs(),
                });
            }
        };

        Ok(ToolOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }
}

#[async_trait::async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, invocation: &ToolInvocation) -> ToolResult<ToolOutput> {
        debug!("$ {}", invocation);

        let mut attempt = 0;
        loop {
            match self.run_once(invocation).await {
                Ok(output) => {
                    if !output.success() {
                        error!(
                            "{} exited with {}: {}",
                            invocation.tool_name(),
                            output.exit_code,
                            output.stderr_tail(10)
                        );
                    }
                    return Ok(output);
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.retry.max_attempts || !self.retry.should_retry(&e) {
                        error!("{}: {}", invocation.tool_name(), e);
                        return Err(e);
                    }

                    let backoff = self.retry.backoff_duration(attempt);
                    warn!(
                        "{} failed, retrying in {:?} (attempt {}/{})",
                        invocation.tool_name(),
                        backoff,
                        attempt + 1,
                        self.retry.max_attempts
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_exit_status_and_output() {
        let runner = ProcessRunner::new(Duration::from_secs(10));

        let ok = runner
            .run(&ToolInvocation::new("sh").arg("-c").arg("echo hello"))
            .await
            .unwrap();
        assert!(ok.success());
        assert_eq!(ok.stdout.trim(), "hello");

        let failed = runner
            .run(&ToolInvocation::new("sh").arg("-c").arg("echo oops >&2; exit 3"))
            .await
            .unwrap();
        assert_eq!(failed.exit_code, 3);
        assert_eq!(failed.stderr_tail(1), "oops");
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let runner = ProcessRunner::new(Duration::from_secs(10));
        let err = runner
            .run(&ToolInvocation::new("/nonexistent/kforge-cc"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_timeout_is_retried_then_reported() {
        let tmp = tempfile::TempDir::new().unwrap();
        let attempts = tmp.path().join("attempts");
        let script = format!("echo run >> '{}'; sleep 5", attempts.display());

        let runner = ProcessRunner::new(Duration::from_millis(200)).with_retry(RetryPolicy {
            initial_backoff: Duration::from_millis(10),
            ..RetryPolicy::timeouts(2)
        });
        let err = runner
            .run(&ToolInvocation::new("sh").arg("-c").arg(script))
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        let log = std::fs::read_to_string(&attempts).unwrap();
        assert_eq!(log.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_failed_exit_is_never_retried() {
        let tmp = tempfile::TempDir::new().unwrap();
        let attempts = tmp.path().join("attempts");
        let script = format!("echo run >> '{}'; exit 1", attempts.display());

        let runner = ProcessRunner::new(Duration::from_secs(10)).with_retry(RetryPolicy {
            initial_backoff: Duration::from_millis(10),
            ..RetryPolicy::timeouts(3)
        });
        let output = runner
            .run(&ToolInvocation::new("sh").arg("-c").arg(script))
            .await
            .unwrap();

        assert_eq!(output.exit_code, 1);
        let log = std::fs::read_to_string(&attempts).unwrap();
        assert_eq!(log.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_hung_tool_times_out() {
        let runner = ProcessRunner::new(Duration::from_millis(200));
        let err = runner
            .run(&ToolInvocation::new("sleep").arg("5"))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }
}
