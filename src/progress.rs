use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::batch::BatchResult;
use crate::job::JobOutcome;

/// Running tally sent after every completed job
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Position of the job in the submitted batch
    pub index: usize,
    pub completed: usize,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub outcome: JobOutcome,
}

/// Receives batch progress. Calls for one batch never overlap.
pub trait ProgressReporter: Send + Sync {
    fn batch_started(&self, _total: usize) {}

    fn job_completed(&self, update: &ProgressUpdate);

    fn batch_finished(&self, _result: &BatchResult) {}
}

/// Ignores all progress
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn job_completed(&self, _update: &ProgressUpdate) {}
}

/// Messages sent by [`ChannelProgress`]
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Started { total: usize },
    JobCompleted(ProgressUpdate),
    Finished(BatchResult),
}

/// Forwards progress to a channel so a UI can consume it on its own task.
pub struct ChannelProgress {
    sender: UnboundedSender<ProgressEvent>,
}

impl ChannelProgress {
    /// Reporter plus the receiving end of its channel
    pub fn new() -> (Self, UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ProgressReporter for ChannelProgress {
    fn batch_started(&self, total: usize) {
        // A dropped receiver only means nobody is watching.
        let _ = self.sender.send(ProgressEvent::Started { total });
    }

    fn job_completed(&self, update: &ProgressUpdate) {
        let _ = self.sender.send(ProgressEvent::JobCompleted(update.clone()));
    }

    fn batch_finished(&self, result: &BatchResult) {
        let _ = self.sender.send(ProgressEvent::Finished(result.clone()));
    }
}

/// Terminal progress bar
pub struct ConsoleProgress {
    bar: ProgressBar,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        bar.set_style(style);
        Self { bar }
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for ConsoleProgress {
    fn batch_started(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
    }

    fn job_completed(&self, update: &ProgressUpdate) {
        let name = update
            .outcome
            .job
            .input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if !update.outcome.is_success() {
            let reason = update
                .outcome
                .failure
                .map(|kind| kind.to_string())
                .unwrap_or_default();
            self.bar.println(format!("✗ {} ({})", name, reason));
        }

        self.bar.set_position(update.completed as u64);
        self.bar.set_message(format!("{} ok, {} failed | {}", update.succeeded, update.failed, name));
    }

    fn batch_finished(&self, result: &BatchResult) {
        self.bar.finish_with_message(format!(
            "{} succeeded, {} failed",
            result.succeeded, result.failed
        ));
    }
}
