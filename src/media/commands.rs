use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Result, VidUtilsError};
use crate::job::{
    normalize_format, ConversionKind, ConvertOptions, ExtractOptions, MediaJob, MergeOptions,
    Operation, AUDIO_ONLY_FORMATS,
};
use crate::subtitle::SubtitleFormat;

/// Containers that only accept `mov_text` subtitles
const MOV_TEXT_CONTAINERS: &[&str] = &["mp4", "m4v", "mov"];

/// Abstract media processing command representation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
    /// File the command writes, if any
    pub output: Option<PathBuf>,
}

impl MediaCommand {
    /// Create a new media processing command
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
            output: None,
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Add output file
    pub fn output<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.output = Some(path.as_ref().to_path_buf());
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Overwrite (`-y`) or never overwrite (`-n`) an existing output
    pub fn overwrite(self, overwrite: bool) -> Self {
        self.arg(if overwrite { "-y" } else { "-n" })
    }

    /// Set video codec
    pub fn video_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:v").arg(codec)
    }

    /// Set audio codec
    pub fn audio_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:a").arg(codec)
    }

    /// Set subtitle codec
    pub fn subtitle_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:s").arg(codec)
    }

    /// Copy every stream
    pub fn copy_all(self) -> Self {
        self.arg("-c").arg("copy")
    }

    /// Disable video
    pub fn no_video(self) -> Self {
        self.arg("-vn")
    }

    /// Select streams
    pub fn map<S: Into<String>>(self, spec: S) -> Self {
        self.arg("-map").arg(spec)
    }

    /// Set a container-level metadata key
    pub fn metadata(self, key: &str, value: &str) -> Self {
        self.arg("-metadata").arg(format!("{}={}", key, value))
    }

    /// Full command line, for logs
    pub fn command_line(&self) -> String {
        std::iter::once(self.binary_path.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for MediaCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

/// Translates jobs into ffmpeg invocations.
///
/// Building is pure: nothing is checked on disk, so a job that builds can
/// still fail at run time.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    binary_path: String,
    overwrite: bool,
}

impl CommandBuilder {
    /// Create a new command builder
    pub fn new<S: Into<String>>(binary_path: S) -> Self {
        Self {
            binary_path: binary_path.into(),
            overwrite: false,
        }
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Build the invocation for a job, rejecting jobs with missing or
    /// contradictory options.
    pub fn build(&self, job: &MediaJob) -> Result<MediaCommand> {
        let output = job.output_path()?;
        if output == job.input {
            return Err(VidUtilsError::Config(format!(
                "Output would overwrite the input: {}",
                job.input.display()
            )));
        }

        match &job.operation {
            Operation::Convert(options) => self.convert(job, options, &output),
            Operation::RenameTitle { title } => self.rename_title(job, title.as_deref(), &output),
            Operation::MergeSubtitle(options) => self.merge_subtitle(job, options, &output),
            Operation::ExtractSubtitle(options) => self.extract_subtitle(job, options, &output),
        }
    }

    /// Build version check command
    pub fn version_check(&self) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Version check").arg("-version")
    }

    fn base(&self, description: String) -> MediaCommand {
        MediaCommand::new(&self.binary_path, description)
            .arg("-hide_banner")
            .arg("-nostdin")
            .overwrite(self.overwrite)
    }

    fn convert(&self, job: &MediaJob, options: &ConvertOptions, output: &Path) -> Result<MediaCommand> {
        let format = normalize_format(options.format.as_deref())
            .ok_or_else(|| VidUtilsError::MissingOption("target format".to_string()))?;

        let cmd = self.base(format!("Convert to {}", format)).input(&job.input);

        let cmd = match options.kind {
            ConversionKind::Video => {
                if AUDIO_ONLY_FORMATS.contains(&format.as_str()) {
                    return Err(VidUtilsError::Config(format!(
                        "Cannot convert a video to the audio-only format {}",
                        format
                    )));
                }
                cmd.video_codec(options.video_codec.as_deref().unwrap_or("copy"))
                    .audio_codec(options.audio_codec.as_deref().unwrap_or("copy"))
            }
            ConversionKind::Audio => {
                let codec = options
                    .audio_codec
                    .clone()
                    .unwrap_or_else(|| default_audio_codec(&format).to_string());
                cmd.no_video().audio_codec(codec).arg("-q:a").arg("0")
            }
        };

        Ok(cmd.args(options.extra_args.iter().cloned()).output(output))
    }

    fn rename_title(&self, job: &MediaJob, title: Option<&str>, output: &Path) -> Result<MediaCommand> {
        let title = match title {
            Some(title) if !title.trim().is_empty() => title.to_string(),
            _ => job.stem()?,
        };

        Ok(self
            .base(format!("Set title to \"{}\"", title))
            .input(&job.input)
            .map("0")
            .copy_all()
            .metadata("title", &title)
            .output(output))
    }

    fn merge_subtitle(&self, job: &MediaJob, options: &MergeOptions, output: &Path) -> Result<MediaCommand> {
        let subtitle = options
            .subtitle
            .as_ref()
            .ok_or_else(|| VidUtilsError::MissingOption("subtitle file".to_string()))?;

        let mut cmd = self
            .base("Subtitle merge".to_string())
            .input(&job.input)
            .input(subtitle)
            .map("0")
            .map("1")
            .video_codec("copy")
            .audio_codec("copy");

        let container = output
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if MOV_TEXT_CONTAINERS.contains(&container.as_str()) {
            cmd = cmd.subtitle_codec("mov_text");
        }

        Ok(cmd
            .arg("-metadata:s:s:0")
            .arg(format!("title={}", options.language_title))
            .output(output))
    }

    fn extract_subtitle(&self, job: &MediaJob, options: &ExtractOptions, output: &Path) -> Result<MediaCommand> {
        let format: SubtitleFormat = normalize_format(options.format.as_deref())
            .ok_or_else(|| VidUtilsError::MissingOption("subtitle format".to_string()))?
            .parse()?;

        Ok(self
            .base(format!("Extract subtitle stream {} as {}", options.stream_index, format))
            .input(&job.input)
            .map(format!("0:s:{}", options.stream_index))
            .subtitle_codec(format.codec())
            .output(output))
    }
}

fn default_audio_codec(format: &str) -> &'static str {
    match format {
        "mp3" => "libmp3lame",
        "flac" => "flac",
        "wav" => "pcm_s16le",
        "opus" | "ogg" => "libopus",
        _ => "aac",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::OperationKind;

    fn builder() -> CommandBuilder {
        CommandBuilder::new("ffmpeg")
    }

    fn convert(format: Option<&str>, kind: ConversionKind) -> Operation {
        Operation::Convert(ConvertOptions {
            format: format.map(str::to_string),
            kind,
            video_codec: None,
            audio_codec: None,
            extra_args: Vec::new(),
        })
    }

    #[test]
    fn test_video_conversion_copies_streams() {
        let job = MediaJob::new("/v/a.avi", convert(Some("mp4"), ConversionKind::Video));
        let cmd = builder().build(&job).unwrap();

        assert_eq!(
            cmd.args,
            vec!["-hide_banner", "-nostdin", "-n", "-i", "/v/a.avi", "-c:v", "copy", "-c:a", "copy", "/v/a.mp4"]
        );
        assert_eq!(cmd.output, Some(PathBuf::from("/v/a.mp4")));
    }

    #[test]
    fn test_audio_conversion_picks_codec() {
        let job = MediaJob::new("/v/a.mkv", convert(Some("mp3"), ConversionKind::Audio));
        let cmd = builder().with_overwrite(true).build(&job).unwrap();

        assert!(cmd.args.contains(&"-y".to_string()));
        assert!(cmd.args.contains(&"-vn".to_string()));
        assert!(cmd.args.windows(2).any(|w| w == ["-c:a", "libmp3lame"]));
        assert_eq!(cmd.args.last().unwrap(), "/v/a.mp3");
    }

    #[test]
    fn test_convert_without_format_is_rejected() {
        let job = MediaJob::new("/v/a.avi", convert(None, ConversionKind::Video));
        let err = builder().build(&job).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_video_to_mp3_is_rejected() {
        let job = MediaJob::new("/v/a.avi", convert(Some("mp3"), ConversionKind::Video));
        assert!(matches!(builder().build(&job), Err(VidUtilsError::Config(_))));
    }

    #[test]
    fn test_same_input_and_output_is_rejected() {
        let job = MediaJob::new("/v/a.mp4", convert(Some("mp4"), ConversionKind::Video));
        assert!(builder().build(&job).unwrap_err().is_configuration());
    }

    #[test]
    fn test_rename_title_uses_file_stem() {
        let job = MediaJob::new("/v/My Video.mp4", Operation::RenameTitle { title: None });
        let cmd = builder().build(&job).unwrap();

        assert_eq!(job.kind(), OperationKind::RenameTitle);
        assert!(cmd.args.windows(2).any(|w| w == ["-metadata", "title=My Video"]));
        assert!(cmd.args.windows(2).any(|w| w == ["-c", "copy"]));
        assert_eq!(cmd.args.last().unwrap(), "/v/mod_My Video.mp4");
    }

    #[test]
    fn test_merge_requires_subtitle() {
        let mut options = MergeOptions {
            subtitle: None,
            language_title: "Pt-BR".to_string(),
            container: "mkv".to_string(),
        };
        let job = MediaJob::new("/v/ep1.mkv", Operation::MergeSubtitle(options.clone()));
        assert!(matches!(builder().build(&job), Err(VidUtilsError::MissingOption(_))));

        options.subtitle = Some(PathBuf::from("/v/ep1.srt"));
        let cmd = builder()
            .build(&MediaJob::new("/v/ep1.mkv", Operation::MergeSubtitle(options)))
            .unwrap();
        assert!(cmd.args.windows(4).any(|w| w == ["-map", "0", "-map", "1"]));
        assert!(cmd.args.windows(2).any(|w| w == ["-metadata:s:s:0", "title=Pt-BR"]));
        assert!(!cmd.args.contains(&"mov_text".to_string()));
        assert_eq!(cmd.args.last().unwrap(), "/v/ep1.srt.mkv");
    }

    #[test]
    fn test_merge_into_mp4_uses_mov_text() {
        let job = MediaJob::new(
            "/v/ep1.mkv",
            Operation::MergeSubtitle(MergeOptions {
                subtitle: Some(PathBuf::from("/v/ep1.srt")),
                language_title: "English".to_string(),
                container: "mp4".to_string(),
            }),
        );
        let cmd = builder().build(&job).unwrap();
        assert!(cmd.args.windows(2).any(|w| w == ["-c:s", "mov_text"]));
    }

    #[test]
    fn test_extract_subtitle() {
        let job = MediaJob::new(
            "/v/show.mkv",
            Operation::ExtractSubtitle(ExtractOptions {
                format: Some("ass".to_string()),
                stream_index: 1,
            }),
        );
        let cmd = builder().build(&job).unwrap();
        assert!(cmd.args.windows(2).any(|w| w == ["-map", "0:s:1"]));
        assert!(cmd.args.windows(2).any(|w| w == ["-c:s", "ass"]));
        assert_eq!(cmd.args.last().unwrap(), "/v/show.1.ass");

        let unknown = MediaJob::new(
            "/v/show.mkv",
            Operation::ExtractSubtitle(ExtractOptions {
                format: Some("pgs".to_string()),
                stream_index: 0,
            }),
        );
        assert!(matches!(builder().build(&unknown), Err(VidUtilsError::UnsupportedFormat(_))));
    }
}
