//! Batch coordination: runs every job of a batch exactly once, in bounded
//! parallel, and aggregates the outcomes in submission order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::BatchConfig;
use crate::error::{Result, VidUtilsError};
use crate::job::{FailureKind, JobOutcome, JobStatus, MediaJob, OperationKind};
use crate::media::{CommandBuilder, JobRunner, MediaCommand};
use crate::progress::{ProgressReporter, ProgressUpdate};

/// Lifecycle of a coordinator: `Idle` until the first submit, `Running`
/// while a batch is in flight, then `Completed` or `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BatchState {
    Idle,
    Running,
    Completed,
    Cancelled,
}

/// One failed job as listed in the batch summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureReport {
    pub input: PathBuf,
    pub kind: FailureKind,
    pub diagnostic: String,
}

/// Aggregate of one submitted batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total: usize,
    pub succeeded: usize,
    /// Includes cancelled jobs
    pub failed: usize,
    pub cancelled: usize,
    /// One outcome per submitted job, in submission order
    pub outcomes: Vec<JobOutcome>,
    pub failures: Vec<FailureReport>,
}

impl BatchResult {
    fn new(id: Uuid, started_at: DateTime<Utc>, outcomes: Vec<JobOutcome>) -> Self {
        let failures: Vec<FailureReport> = outcomes
            .iter()
            .filter(|o| o.status == JobStatus::Failed)
            .map(|o| FailureReport {
                input: o.job.input.clone(),
                kind: o.failure.unwrap_or(FailureKind::Execution),
                diagnostic: o.diagnostic.clone(),
            })
            .collect();

        Self {
            id,
            started_at,
            finished_at: Utc::now(),
            total: outcomes.len(),
            succeeded: outcomes.len() - failures.len(),
            failed: failures.len(),
            cancelled: outcomes.iter().filter(|o| o.is_cancelled()).count(),
            outcomes,
            failures,
        }
    }

    /// True when no job failed or was cancelled
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Coordinator knobs taken from the `[batch]` config section
#[derive(Debug, Clone)]
pub struct BatchSettings {
    /// Maximum number of jobs running at once
    pub concurrency: usize,
    pub cleanup_partial_outputs: bool,
    pub replace_original: bool,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self::from(&BatchConfig::default())
    }
}

impl From<&BatchConfig> for BatchSettings {
    fn from(config: &BatchConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            cleanup_partial_outputs: config.cleanup_partial_outputs,
            replace_original: config.replace_original,
        }
    }
}

struct Control {
    state: BatchState,
    cancel: CancellationToken,
}

/// Outcome slots plus the running tally reported to the UI.
struct Accumulator {
    slots: Vec<Option<JobOutcome>>,
    completed: usize,
    succeeded: usize,
    failed: usize,
}

impl Accumulator {
    fn new(total: usize) -> Self {
        Self {
            slots: vec![None; total],
            completed: 0,
            succeeded: 0,
            failed: 0,
        }
    }

    fn record(&mut self, index: usize, outcome: JobOutcome, progress: &dyn ProgressReporter) {
        if self.slots[index].is_some() {
            warn!("Ignoring duplicate outcome for job {}", index);
            return;
        }

        self.completed += 1;
        if outcome.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }

        progress.job_completed(&ProgressUpdate {
            index,
            completed: self.completed,
            total: self.slots.len(),
            succeeded: self.succeeded,
            failed: self.failed,
            outcome: outcome.clone(),
        });
        self.slots[index] = Some(outcome);
    }
}

fn record(accumulator: &Mutex<Accumulator>, index: usize, outcome: JobOutcome, progress: &dyn ProgressReporter) {
    accumulator
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .record(index, outcome, progress);
}

/// Owns the lifecycle of one batch at a time.
///
/// Share it behind an `Arc` so a UI can call [`BatchCoordinator::cancel`] and
/// [`BatchCoordinator::state`] while [`BatchCoordinator::submit`] is running.
pub struct BatchCoordinator {
    builder: CommandBuilder,
    runner: Arc<dyn JobRunner>,
    settings: BatchSettings,
    control: Mutex<Control>,
}

impl BatchCoordinator {
    pub fn new(builder: CommandBuilder, runner: Arc<dyn JobRunner>, settings: BatchSettings) -> Self {
        Self {
            builder,
            runner,
            settings,
            control: Mutex::new(Control {
                state: BatchState::Idle,
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> BatchState {
        self.control().state
    }

    /// Stop launching jobs and kill the ones in flight. No-op unless running.
    pub fn cancel(&self) {
        let control = self.control();
        if control.state == BatchState::Running {
            info!("Batch cancellation requested");
            control.cancel.cancel();
        }
    }

    /// Run every job once and return the aggregate.
    ///
    /// Jobs that fail to build, or whose output path was already claimed by an
    /// earlier job of the batch, are recorded as configuration failures and
    /// never reach the runner. After cancellation, jobs not yet launched are
    /// recorded as cancelled.
    pub async fn submit(
        &self,
        jobs: Vec<MediaJob>,
        progress: Arc<dyn ProgressReporter>,
    ) -> Result<BatchResult> {
        let cancel = self.begin()?;
        let id = Uuid::new_v4();
        let started_at = Utc::now();
        let total = jobs.len();

        info!("Starting batch {} with {} jobs (concurrency {})", id, total, self.settings.concurrency);
        progress.batch_started(total);

        let submitted = jobs.clone();
        let accumulator = Arc::new(Mutex::new(Accumulator::new(total)));
        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));
        let mut tasks = JoinSet::new();
        let mut claimed: HashMap<PathBuf, usize> = HashMap::new();

        for (index, job) in jobs.into_iter().enumerate() {
            if cancel.is_cancelled() {
                record(&accumulator, index, JobOutcome::cancelled(job), progress.as_ref());
                continue;
            }

            let command = match self.builder.build(&job) {
                Ok(command) => command,
                Err(e) => {
                    warn!("Rejected {}: {}", job.input.display(), e);
                    record(&accumulator, index, JobOutcome::configuration(job, &e), progress.as_ref());
                    continue;
                }
            };

            if let Some(output) = &command.output {
                if let Some(&owner) = claimed.get(output) {
                    let e = VidUtilsError::Config(format!(
                        "Output {} collides with job {} ({})",
                        output.display(),
                        owner + 1,
                        submitted[owner].input.display()
                    ));
                    warn!("Rejected {}: {}", job.input.display(), e);
                    record(&accumulator, index, JobOutcome::configuration(job, &e), progress.as_ref());
                    continue;
                }
                claimed.insert(output.clone(), index);
            }

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit.filter(|_| !cancel.is_cancelled()) else {
                record(&accumulator, index, JobOutcome::cancelled(job), progress.as_ref());
                continue;
            };

            let runner = Arc::clone(&self.runner);
            let settings = self.settings.clone();
            let accumulator = Arc::clone(&accumulator);
            let progress = Arc::clone(&progress);
            let token = cancel.child_token();

            tasks.spawn(async move {
                let output_existed = match &command.output {
                    Some(output) => tokio::fs::try_exists(output).await.unwrap_or(false),
                    None => false,
                };

                let outcome = runner.run(&job, &command, token).await;
                let outcome = finalize(outcome, &command, output_existed, &settings).await;
                record(&accumulator, index, outcome, progress.as_ref());
                drop(permit);
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("Job task ended abnormally: {}", e);
            }
        }

        let slots = {
            let mut acc = accumulator.lock().unwrap_or_else(PoisonError::into_inner);
            // A task that panicked never recorded its outcome.
            for (index, job) in submitted.into_iter().enumerate() {
                if acc.slots[index].is_none() {
                    let outcome = JobOutcome::failed(
                        job,
                        FailureKind::Execution,
                        None,
                        "job ended without an outcome".to_string(),
                        std::time::Duration::ZERO,
                    );
                    acc.record(index, outcome, progress.as_ref());
                }
            }
            std::mem::take(&mut acc.slots)
        };
        let outcomes: Vec<JobOutcome> = slots.into_iter().flatten().collect();

        let was_cancelled = cancel.is_cancelled();
        let result = BatchResult::new(id, started_at, outcomes);
        self.finish(if was_cancelled { BatchState::Cancelled } else { BatchState::Completed });

        info!(
            "Batch {} finished: {} succeeded, {} failed ({} cancelled)",
            id, result.succeeded, result.failed, result.cancelled
        );
        progress.batch_finished(&result);
        Ok(result)
    }

    fn control(&self) -> std::sync::MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self) -> Result<CancellationToken> {
        let mut control = self.control();
        if control.state == BatchState::Running {
            return Err(VidUtilsError::BatchAlreadyRunning);
        }
        control.state = BatchState::Running;
        control.cancel = CancellationToken::new();
        Ok(control.cancel.clone())
    }

    fn finish(&self, state: BatchState) {
        self.control().state = state;
    }
}

/// Move renamed-title outputs over their inputs and clear partial outputs of
/// failed jobs.
async fn finalize(
    outcome: JobOutcome,
    command: &MediaCommand,
    output_existed: bool,
    settings: &BatchSettings,
) -> JobOutcome {
    let Some(output) = &command.output else {
        return outcome;
    };

    if outcome.is_success() {
        if settings.replace_original && outcome.job.kind() == OperationKind::RenameTitle {
            if let Err(e) = tokio::fs::rename(output, &outcome.job.input).await {
                let diagnostic = format!(
                    "Failed to replace {} with {}: {}",
                    outcome.job.input.display(),
                    output.display(),
                    e
                );
                return JobOutcome {
                    status: JobStatus::Failed,
                    failure: Some(FailureKind::Execution),
                    diagnostic,
                    ..outcome
                };
            }
            debug!("Replaced {} with retitled copy", outcome.job.input.display());
        }
        return outcome;
    }

    if settings.cleanup_partial_outputs && !output_existed {
        match tokio::fs::remove_file(output).await {
            Ok(()) => debug!("Removed partial output {}", output.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove partial output {}: {}", output.display(), e),
        }
    }
    outcome
}
