//! Job and outcome types shared by the command builder, the runner and the
//! batch coordinator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, VidUtilsError};

/// Formats that only carry audio. A video conversion into one of these is rejected.
pub const AUDIO_ONLY_FORMATS: &[&str] = &["mp3", "aac", "wav", "flac", "ogg", "opus", "m4a"];

/// Whether a conversion keeps the video stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConversionKind {
    /// Keep the video stream, copying streams unless codecs are given
    Video,
    /// Drop the video stream and re-encode the audio
    Audio,
}

/// Options of a format conversion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertOptions {
    /// Target container/format, used as the output extension
    pub format: Option<String>,
    pub kind: ConversionKind,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    /// Extra arguments placed right before the output path
    #[serde(default)]
    pub extra_args: Vec<String>,
}

/// Options of a subtitle merge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOptions {
    pub subtitle: Option<PathBuf>,
    /// Title of the subtitle stream as shown by players
    pub language_title: String,
    /// Output container extension
    pub container: String,
}

/// Options of a subtitle track extraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractOptions {
    pub format: Option<String>,
    /// Index among the subtitle streams of the input
    pub stream_index: usize,
}

/// The operation a job performs, with its options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Operation {
    Convert(ConvertOptions),
    RenameTitle { title: Option<String> },
    MergeSubtitle(MergeOptions),
    ExtractSubtitle(ExtractOptions),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    Convert,
    RenameTitle,
    MergeSubtitle,
    ExtractSubtitle,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Convert => "convert",
            OperationKind::RenameTitle => "rename-title",
            OperationKind::MergeSubtitle => "merge-subtitle",
            OperationKind::ExtractSubtitle => "extract-subtitle",
        };
        f.write_str(name)
    }
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Convert(_) => OperationKind::Convert,
            Operation::RenameTitle { .. } => OperationKind::RenameTitle,
            Operation::MergeSubtitle(_) => OperationKind::MergeSubtitle,
            Operation::ExtractSubtitle(_) => OperationKind::ExtractSubtitle,
        }
    }
}

/// One requested operation on one input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaJob {
    pub input: PathBuf,
    pub operation: Operation,
    /// Explicit output file, overrides the derived path
    pub output: Option<PathBuf>,
    /// Directory for derived output paths, defaults to the input's directory
    pub output_dir: Option<PathBuf>,
}

impl MediaJob {
    pub fn new<P: Into<PathBuf>>(input: P, operation: Operation) -> Self {
        Self {
            input: input.into(),
            operation,
            output: None,
            output_dir: None,
        }
    }

    pub fn with_output<P: Into<PathBuf>>(mut self, output: P) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn kind(&self) -> OperationKind {
        self.operation.kind()
    }

    /// Input file stem, the basis of every derived name.
    pub fn stem(&self) -> Result<String> {
        self.input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                VidUtilsError::Config(format!("Invalid input filename: {}", self.input.display()))
            })
    }

    /// Output file for this job: the explicit override, or a path derived
    /// from the input filename.
    pub fn output_path(&self) -> Result<PathBuf> {
        if let Some(output) = &self.output {
            return Ok(output.clone());
        }

        let stem = sanitize_file_name(&self.stem()?);
        let file_name = match &self.operation {
            Operation::Convert(options) => {
                let format = normalize_format(options.format.as_deref())
                    .ok_or_else(|| VidUtilsError::MissingOption("target format".to_string()))?;
                format!("{}.{}", stem, format)
            }
            Operation::RenameTitle { .. } => {
                let name = self.input.file_name().unwrap_or_default().to_string_lossy();
                format!("mod_{}", sanitize_file_name(&name))
            }
            Operation::MergeSubtitle(options) => {
                let container = normalize_format(Some(&options.container))
                    .unwrap_or_else(|| "mkv".to_string());
                format!("{}.srt.{}", stem, container)
            }
            Operation::ExtractSubtitle(options) => {
                let format = normalize_format(options.format.as_deref())
                    .ok_or_else(|| VidUtilsError::MissingOption("subtitle format".to_string()))?;
                let format: crate::subtitle::SubtitleFormat = format.parse()?;
                if options.stream_index == 0 {
                    format!("{}.{}", stem, format.extension())
                } else {
                    format!("{}.{}.{}", stem, options.stream_index, format.extension())
                }
            }
        };

        Ok(self.derived_dir().join(file_name))
    }

    fn derived_dir(&self) -> PathBuf {
        // Title renames replace the input in place, so they stay next to it.
        if self.kind() != OperationKind::RenameTitle {
            if let Some(dir) = &self.output_dir {
                return dir.clone();
            }
        }
        self.input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }
}

/// Lowercased format without a leading dot, `None` when empty.
pub fn normalize_format(format: Option<&str>) -> Option<String> {
    let format = format?.trim().trim_start_matches('.').to_lowercase();
    (!format.is_empty()).then_some(format)
}

/// Drop quote characters and commas, which trip up ffmpeg filter arguments
/// and some players.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '"' | '\'' | ','))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// Rejected before execution
    Configuration,
    /// Non-zero exit, spawn failure or output finalization failure
    Execution,
    TimedOut,
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Configuration => "configuration",
            FailureKind::Execution => "execution",
            FailureKind::TimedOut => "timed out",
            FailureKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Result of running one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutcome {
    pub job: MediaJob,
    pub status: JobStatus,
    pub failure: Option<FailureKind>,
    pub exit_code: Option<i32>,
    /// Combined process output or the reason the job never ran
    pub diagnostic: String,
    pub elapsed_ms: u64,
}

impl JobOutcome {
    pub fn succeeded(job: MediaJob, exit_code: Option<i32>, diagnostic: String, elapsed: Duration) -> Self {
        Self {
            job,
            status: JobStatus::Succeeded,
            failure: None,
            exit_code,
            diagnostic,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn failed(
        job: MediaJob,
        kind: FailureKind,
        exit_code: Option<i32>,
        diagnostic: String,
        elapsed: Duration,
    ) -> Self {
        Self {
            job,
            status: JobStatus::Failed,
            failure: Some(kind),
            exit_code,
            diagnostic,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn configuration(job: MediaJob, error: &VidUtilsError) -> Self {
        Self::failed(job, FailureKind::Configuration, None, error.to_string(), Duration::ZERO)
    }

    pub fn cancelled(job: MediaJob) -> Self {
        Self::failed(job, FailureKind::Cancelled, None, "cancelled".to_string(), Duration::ZERO)
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Succeeded
    }

    pub fn is_cancelled(&self) -> bool {
        self.failure == Some(FailureKind::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert_to(format: Option<&str>) -> Operation {
        Operation::Convert(ConvertOptions {
            format: format.map(str::to_string),
            kind: ConversionKind::Video,
            video_codec: None,
            audio_codec: None,
            extra_args: Vec::new(),
        })
    }

    #[test]
    fn test_convert_output_is_derived_from_input() {
        let job = MediaJob::new("/videos/a.avi", convert_to(Some(".MP4")));
        assert_eq!(job.output_path().unwrap(), PathBuf::from("/videos/a.mp4"));

        let job = job.with_output_dir("/out");
        assert_eq!(job.output_path().unwrap(), PathBuf::from("/out/a.mp4"));
    }

    #[test]
    fn test_convert_without_format_has_no_output() {
        let job = MediaJob::new("/videos/a.avi", convert_to(None));
        assert!(matches!(job.output_path(), Err(VidUtilsError::MissingOption(_))));
    }

    #[test]
    fn test_explicit_output_wins() {
        let job = MediaJob::new("/videos/a.avi", convert_to(None)).with_output("/tmp/x.mkv");
        assert_eq!(job.output_path().unwrap(), PathBuf::from("/tmp/x.mkv"));
    }

    #[test]
    fn test_rename_title_stays_next_to_input() {
        let job = MediaJob::new("/videos/My Video.mp4", Operation::RenameTitle { title: None })
            .with_output_dir("/elsewhere");
        assert_eq!(job.output_path().unwrap(), PathBuf::from("/videos/mod_My Video.mp4"));
    }

    #[test]
    fn test_merge_and_extract_names() {
        let merge = MediaJob::new(
            "/v/It's, here.mp4",
            Operation::MergeSubtitle(MergeOptions {
                subtitle: None,
                language_title: "English".to_string(),
                container: "mkv".to_string(),
            }),
        );
        assert_eq!(merge.output_path().unwrap(), PathBuf::from("/v/Its here.srt.mkv"));

        let extract = MediaJob::new(
            "/v/show.mkv",
            Operation::ExtractSubtitle(ExtractOptions {
                format: Some("vtt".to_string()),
                stream_index: 2,
            }),
        );
        assert_eq!(extract.output_path().unwrap(), PathBuf::from("/v/show.2.vtt"));
    }

    #[test]
    fn test_cancelled_outcome_is_failure() {
        let outcome = JobOutcome::cancelled(MediaJob::new("a.mkv", convert_to(Some("mp4"))));
        assert!(!outcome.is_success());
        assert!(outcome.is_cancelled());
        assert_eq!(outcome.diagnostic, "cancelled");
    }
}
