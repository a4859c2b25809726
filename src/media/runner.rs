use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::job::{FailureKind, JobOutcome, MediaJob};
use super::MediaCommand;

/// Executes one media command for one job.
///
/// Implementations never retry and never interpret the tool's output; every
/// call produces exactly one outcome.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, job: &MediaJob, command: &MediaCommand, cancel: CancellationToken) -> JobOutcome;
}

/// Runs commands as child processes with captured output.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

enum Exit {
    Exited(ExitStatus),
    WaitFailed(std::io::Error),
    TimedOut(Duration),
    Cancelled,
}

impl ProcessRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    async fn deadline(&self) -> Duration {
        match self.timeout {
            Some(timeout) => {
                tokio::time::sleep(timeout).await;
                timeout
            }
            None => std::future::pending().await,
        }
    }
}

#[async_trait]
impl JobRunner for ProcessRunner {
    async fn run(&self, job: &MediaJob, command: &MediaCommand, cancel: CancellationToken) -> JobOutcome {
        let started = Instant::now();
        info!("{}: {}", command.description, job.input.display());
        debug!("Executing media processing command: {}", command.command_line());

        let spawned = Command::new(&command.binary_path)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                return JobOutcome::failed(
                    job.clone(),
                    FailureKind::Execution,
                    None,
                    format!("Failed to execute {}: {}", command.binary_path, e),
                    started.elapsed(),
                );
            }
        };

        let stdout = child.stdout.take().map(|s| tokio::spawn(read_stream(s)));
        let stderr = child.stderr.take().map(|s| tokio::spawn(read_stream(s)));

        let exit = tokio::select! {
            status = child.wait() => match status {
                Ok(status) => Exit::Exited(status),
                Err(e) => Exit::WaitFailed(e),
            },
            timeout = self.deadline() => Exit::TimedOut(timeout),
            _ = cancel.cancelled() => Exit::Cancelled,
        };

        if matches!(exit, Exit::TimedOut(_) | Exit::Cancelled | Exit::WaitFailed(_)) {
            if let Err(e) = child.kill().await {
                warn!("Failed to kill {}: {}", command.binary_path, e);
            }
        }

        let output = combined_output(stdout, stderr).await;
        let elapsed = started.elapsed();

        match exit {
            Exit::Exited(status) if status.success() => {
                info!("{} completed in {:.1}s", command.description, elapsed.as_secs_f64());
                JobOutcome::succeeded(job.clone(), status.code(), output, elapsed)
            }
            Exit::Exited(status) => {
                let diagnostic = if output.is_empty() {
                    match status.code() {
                        Some(code) => format!("{} exited with code {}", command.description, code),
                        None => format!("{} was terminated by a signal", command.description),
                    }
                } else {
                    output
                };
                warn!("{} failed for {}", command.description, job.input.display());
                JobOutcome::failed(job.clone(), FailureKind::Execution, status.code(), diagnostic, elapsed)
            }
            Exit::WaitFailed(e) => JobOutcome::failed(
                job.clone(),
                FailureKind::Execution,
                None,
                format!("Failed to wait for {}: {}", command.binary_path, e),
                elapsed,
            ),
            Exit::TimedOut(timeout) => {
                warn!("{} timed out for {}", command.description, job.input.display());
                let mut diagnostic = format!("timed out after {}s", timeout.as_secs_f64());
                if !output.is_empty() {
                    diagnostic.push('\n');
                    diagnostic.push_str(&output);
                }
                JobOutcome::failed(job.clone(), FailureKind::TimedOut, None, diagnostic, elapsed)
            }
            Exit::Cancelled => {
                info!("{} cancelled for {}", command.description, job.input.display());
                JobOutcome::failed(job.clone(), FailureKind::Cancelled, None, "cancelled".to_string(), elapsed)
            }
        }
    }
}

async fn read_stream<R: AsyncRead + Unpin>(mut reader: R) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Err(e) = reader.read_to_end(&mut buf).await {
        debug!("Stopped reading process output: {}", e);
    }
    buf
}

async fn combined_output(
    stdout: Option<JoinHandle<Vec<u8>>>,
    stderr: Option<JoinHandle<Vec<u8>>>,
) -> String {
    let mut parts = Vec::new();
    for handle in [stdout, stderr].into_iter().flatten() {
        let bytes = handle.await.unwrap_or_default();
        let text = String::from_utf8_lossy(&bytes).trim().to_string();
        if !text.is_empty() {
            parts.push(text);
        }
    }
    parts.join("\n")
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::job::{JobStatus, Operation};

    fn job() -> MediaJob {
        MediaJob::new("/v/My Video.mp4", Operation::RenameTitle { title: None })
    }

    fn shell(script: &str) -> MediaCommand {
        MediaCommand::new("sh", "Test command").arg("-c").arg(script)
    }

    #[tokio::test]
    async fn test_zero_exit_succeeds() {
        let runner = ProcessRunner::new(None);
        let outcome = runner
            .run(&job(), &shell("echo done"), CancellationToken::new())
            .await;

        assert_eq!(outcome.status, JobStatus::Succeeded);
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.diagnostic, "done");
    }

    #[tokio::test]
    async fn test_non_zero_exit_fails_with_output() {
        let runner = ProcessRunner::new(None);
        let outcome = runner
            .run(&job(), &shell("echo 'Unknown encoder' >&2; exit 1"), CancellationToken::new())
            .await;

        assert_eq!(outcome.status, JobStatus::Failed);
        assert_eq!(outcome.failure, Some(FailureKind::Execution));
        assert_eq!(outcome.exit_code, Some(1));
        assert_eq!(outcome.diagnostic, "Unknown encoder");
    }

    #[tokio::test]
    async fn test_silent_failure_still_has_diagnostic() {
        let runner = ProcessRunner::new(None);
        let outcome = runner.run(&job(), &shell("exit 3"), CancellationToken::new()).await;

        assert_eq!(outcome.exit_code, Some(3));
        assert!(outcome.diagnostic.contains("exited with code 3"));
    }

    #[tokio::test]
    async fn test_missing_binary_fails() {
        let runner = ProcessRunner::new(None);
        let command = MediaCommand::new("/nonexistent/ffmpeg", "Convert");
        let outcome = runner.run(&job(), &command, CancellationToken::new()).await;

        assert_eq!(outcome.failure, Some(FailureKind::Execution));
        assert!(!outcome.diagnostic.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let runner = ProcessRunner::new(Some(Duration::from_millis(100)));
        let started = Instant::now();
        let outcome = runner.run(&job(), &shell("exec sleep 10"), CancellationToken::new()).await;

        assert_eq!(outcome.failure, Some(FailureKind::TimedOut));
        assert!(outcome.diagnostic.starts_with("timed out"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cancel_kills_process() {
        let runner = ProcessRunner::new(None);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let outcome = runner.run(&job(), &shell("exec sleep 10"), cancel).await;
        assert_eq!(outcome.failure, Some(FailureKind::Cancelled));
        assert_eq!(outcome.diagnostic, "cancelled");
    }
}
