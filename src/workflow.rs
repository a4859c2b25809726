use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::batch::{BatchCoordinator, BatchResult, BatchSettings};
use crate::config::{Config, SubtitleConfig};
use crate::error::{Result, VidUtilsError};
use crate::job::{ConvertOptions, ExtractOptions, MediaJob, MergeOptions, Operation};
use crate::media::{check_availability, resolve_binary, CommandBuilder, ProcessRunner};
use crate::progress::ProgressReporter;
use crate::subtitle::{find_sibling_subtitle, normalize_encoding};

/// Extensions picked up from an input directory when none are given
pub const MEDIA_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "wmv", "flv", "webm", "m4v", "mpg", "mpeg", "ts",
    "mp3", "m4a", "aac", "wav", "flac", "ogg", "opus",
];

/// Wires configuration, the media tool and the batch coordinator together.
pub struct Workflow {
    config: Config,
    builder: CommandBuilder,
    coordinator: Arc<BatchCoordinator>,
}

impl Workflow {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let binary = resolve_binary(&config.media)?;
        info!("Using media tool at {}", binary.display());

        let builder = CommandBuilder::new(binary.to_string_lossy().to_string())
            .with_overwrite(config.media.overwrite);
        let runner = Arc::new(ProcessRunner::new(config.media.timeout()));
        let coordinator = Arc::new(BatchCoordinator::new(
            builder.clone(),
            runner,
            BatchSettings::from(&config.batch),
        ));

        Ok(Self {
            config,
            builder,
            coordinator,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Handle for cancelling or inspecting the running batch
    pub fn coordinator(&self) -> Arc<BatchCoordinator> {
        Arc::clone(&self.coordinator)
    }

    /// Version line of the media tool
    pub async fn check_tool(&self) -> Result<String> {
        check_availability(&self.builder.version_check()).await
    }

    /// Submit a batch to the coordinator
    pub async fn run(&self, jobs: Vec<MediaJob>, progress: Arc<dyn ProgressReporter>) -> Result<BatchResult> {
        self.coordinator.submit(jobs, progress).await
    }
}

/// Resolve the files a batch should process: explicit files plus the media
/// files found in `input_dir`, sorted and without duplicates.
///
/// Subtitle files are never treated as inputs.
pub fn collect_inputs(
    files: &[PathBuf],
    input_dir: Option<&Path>,
    extensions: &[String],
    recursive: bool,
) -> Result<Vec<PathBuf>> {
    let mut found = BTreeSet::new();

    for file in files {
        if !file.is_file() {
            return Err(VidUtilsError::FileNotFound(file.display().to_string()));
        }
        found.insert(file.clone());
    }

    if let Some(dir) = input_dir {
        if !dir.is_dir() {
            return Err(VidUtilsError::Config(format!(
                "Input path is not a directory: {}",
                dir.display()
            )));
        }

        let wanted: Vec<String> = if extensions.is_empty() {
            MEDIA_EXTENSIONS.iter().map(|e| e.to_string()).collect()
        } else {
            extensions
                .iter()
                .map(|e| e.trim().trim_start_matches('.').to_lowercase())
                .collect()
        };

        let walker = WalkDir::new(dir).max_depth(if recursive { usize::MAX } else { 1 });
        for entry in walker.into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(ext) = entry.path().extension().and_then(|e| e.to_str()) else {
                continue;
            };
            let ext = ext.to_lowercase();
            if ext != "srt" && wanted.contains(&ext) {
                found.insert(entry.path().to_path_buf());
            }
        }
    }

    info!("Found {} input files", found.len());
    Ok(found.into_iter().collect())
}

/// Merge jobs for each video, pairing it with `subtitle` or a sibling
/// `.srt`. Subtitles are re-encoded as UTF-8 first when configured.
///
/// A video without a subtitle still gets a job; building it fails with a
/// configuration error so the batch reports it.
pub async fn merge_subtitle_jobs(
    inputs: &[PathBuf],
    subtitle: Option<PathBuf>,
    language_title: Option<String>,
    container: Option<String>,
    config: &SubtitleConfig,
) -> Result<Vec<MediaJob>> {
    if subtitle.is_some() && inputs.len() > 1 {
        return Err(VidUtilsError::Config(
            "An explicit subtitle file can only be merged into a single video".to_string(),
        ));
    }

    let language_title = language_title.unwrap_or_else(|| config.language_title.clone());
    let container = container.unwrap_or_else(|| config.container.clone());

    let mut jobs = Vec::with_capacity(inputs.len());
    for input in inputs {
        let subtitle = subtitle.clone().or_else(|| find_sibling_subtitle(input));
        match &subtitle {
            Some(path) if config.normalize_encoding => {
                if let Err(e) = normalize_encoding(path).await {
                    warn!("Could not normalize {}: {}", path.display(), e);
                }
            }
            Some(_) => {}
            None => warn!("No subtitle found for {}", input.display()),
        }

        jobs.push(MediaJob::new(
            input,
            Operation::MergeSubtitle(MergeOptions {
                subtitle,
                language_title: language_title.clone(),
                container: container.clone(),
            }),
        ));
    }
    Ok(jobs)
}

pub fn convert_jobs(inputs: &[PathBuf], options: &ConvertOptions, output_dir: Option<&Path>) -> Vec<MediaJob> {
    inputs
        .iter()
        .map(|input| with_dir(MediaJob::new(input, Operation::Convert(options.clone())), output_dir))
        .collect()
}

pub fn rename_title_jobs(inputs: &[PathBuf], title: Option<&str>) -> Vec<MediaJob> {
    inputs
        .iter()
        .map(|input| {
            MediaJob::new(
                input,
                Operation::RenameTitle {
                    title: title.map(str::to_string),
                },
            )
        })
        .collect()
}

pub fn extract_subtitle_jobs(inputs: &[PathBuf], options: &ExtractOptions, output_dir: Option<&Path>) -> Vec<MediaJob> {
    inputs
        .iter()
        .map(|input| with_dir(MediaJob::new(input, Operation::ExtractSubtitle(options.clone())), output_dir))
        .collect()
}

/// Point a single-job batch at an explicit output file.
pub fn apply_output(mut jobs: Vec<MediaJob>, output: Option<PathBuf>) -> Result<Vec<MediaJob>> {
    let Some(output) = output else {
        return Ok(jobs);
    };
    if jobs.len() != 1 {
        return Err(VidUtilsError::Config(format!(
            "--output needs exactly one input file, got {}",
            jobs.len()
        )));
    }
    jobs[0].output = Some(output);
    Ok(jobs)
}

fn with_dir(job: MediaJob, output_dir: Option<&Path>) -> MediaJob {
    match output_dir {
        Some(dir) => job.with_output_dir(dir),
        None => job,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::ConversionKind;
    use assert_fs::prelude::*;

    #[test]
    fn test_collect_inputs_filters_by_extension() {
        let dir = assert_fs::TempDir::new().unwrap();
        dir.child("a.MP4").touch().unwrap();
        dir.child("b.mkv").touch().unwrap();
        dir.child("b.srt").touch().unwrap();
        dir.child("notes.txt").touch().unwrap();
        dir.child("season/c.mp4").touch().unwrap();

        let flat = collect_inputs(&[], Some(dir.path()), &[], false).unwrap();
        assert_eq!(flat, vec![dir.child("a.MP4").path().to_path_buf(), dir.child("b.mkv").path().to_path_buf()]);

        let mp4 = collect_inputs(&[], Some(dir.path()), &[".mp4".to_string()], true).unwrap();
        assert_eq!(
            mp4,
            vec![dir.child("a.MP4").path().to_path_buf(), dir.child("season/c.mp4").path().to_path_buf()]
        );
    }

    #[test]
    fn test_srt_is_never_an_input_from_directory() {
        let dir = assert_fs::TempDir::new().unwrap();
        dir.child("movie.srt").touch().unwrap();

        let found = collect_inputs(&[], Some(dir.path()), &["srt".to_string()], false).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = assert_fs::TempDir::new().unwrap();
        let missing = dir.child("gone.mp4").path().to_path_buf();
        assert!(matches!(
            collect_inputs(&[missing], None, &[], false),
            Err(VidUtilsError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_convert_jobs_use_output_dir() {
        let options = ConvertOptions {
            format: Some("mp4".to_string()),
            kind: ConversionKind::Video,
            video_codec: None,
            audio_codec: None,
            extra_args: Vec::new(),
        };
        let jobs = convert_jobs(&[PathBuf::from("/in/a.avi")], &options, Some(Path::new("/out")));
        assert_eq!(jobs[0].output_path().unwrap(), PathBuf::from("/out/a.mp4"));
    }

    #[tokio::test]
    async fn test_merge_pairs_sibling_subtitles() {
        let dir = assert_fs::TempDir::new().unwrap();
        dir.child("ep1.mkv").touch().unwrap();
        dir.child("ep1.srt").write_binary(b"1\n00:00:01,000 --> 00:00:02,000\nA\xE7\xE3o\n").unwrap();
        dir.child("ep2.mkv").touch().unwrap();
        let inputs = vec![dir.child("ep1.mkv").path().to_path_buf(), dir.child("ep2.mkv").path().to_path_buf()];

        let jobs = merge_subtitle_jobs(&inputs, None, Some("English".to_string()), None, &SubtitleConfig::default())
            .await
            .unwrap();

        assert_eq!(jobs.len(), 2);
        match &jobs[0].operation {
            Operation::MergeSubtitle(options) => {
                assert_eq!(options.subtitle, Some(dir.child("ep1.srt").path().to_path_buf()));
                assert_eq!(options.language_title, "English");
                assert_eq!(options.container, "mkv");
            }
            other => panic!("expected merge, got {:?}", other),
        }
        assert!(std::fs::read_to_string(dir.child("ep1.srt").path()).unwrap().contains("Ação"));

        let builder = CommandBuilder::new("ffmpeg");
        assert!(builder.build(&jobs[0]).is_ok());
        let missing = builder.build(&jobs[1]).unwrap_err();
        assert!(missing.is_configuration());
    }

    #[tokio::test]
    async fn test_merge_leaves_encoding_when_disabled() {
        let dir = assert_fs::TempDir::new().unwrap();
        dir.child("movie.mkv").touch().unwrap();
        dir.child("movie.srt").write_binary(b"ol\xE1").unwrap();
        let config = SubtitleConfig {
            normalize_encoding: false,
            ..SubtitleConfig::default()
        };

        merge_subtitle_jobs(&[dir.child("movie.mkv").path().to_path_buf()], None, None, None, &config)
            .await
            .unwrap();

        assert_eq!(std::fs::read(dir.child("movie.srt").path()).unwrap(), b"ol\xE1");
    }

    #[tokio::test]
    async fn test_explicit_subtitle_needs_single_video() {
        let inputs = vec![PathBuf::from("/v/a.mkv"), PathBuf::from("/v/b.mkv")];
        let result = merge_subtitle_jobs(
            &inputs,
            Some(PathBuf::from("/v/a.srt")),
            None,
            None,
            &SubtitleConfig::default(),
        )
        .await;
        assert!(matches!(result, Err(VidUtilsError::Config(_))));
    }

    #[test]
    fn test_apply_output_requires_single_job() {
        let jobs = rename_title_jobs(&[PathBuf::from("/a.mp4"), PathBuf::from("/b.mp4")], None);
        assert!(apply_output(jobs.clone(), None).is_ok());
        assert!(matches!(
            apply_output(jobs, Some(PathBuf::from("/x.mp4"))),
            Err(VidUtilsError::Config(_))
        ));
    }
}
