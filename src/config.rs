use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::error::{Result, VidUtilsError};

fn default_timeout_secs() -> u64 {
    3600
}

fn default_concurrency() -> usize {
    1
}

fn default_true() -> bool {
    true
}

fn default_language_title() -> String {
    "Pt-BR".to_string()
}

fn default_extract_format() -> String {
    "srt".to_string()
}

fn default_container() -> String {
    "mkv".to_string()
}

/// Contents of `vidutils.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub subtitle: SubtitleConfig,
}

/// Where ffmpeg lives and how it is invoked
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Path or name of the ffmpeg binary. A path is used as is; a bare name
    /// is looked up on `PATH` after `ffmpeg_dir` and `FFMPEG_DIRECTORY`.
    pub binary_path: String,
    /// Directory holding an ffmpeg distribution (`bin/ffmpeg` or `ffmpeg`).
    /// Takes precedence over `FFMPEG_DIRECTORY` and a bare `binary_path`.
    #[serde(default)]
    pub ffmpeg_dir: Option<PathBuf>,
    /// Per-invocation timeout in seconds, 0 disables it
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Pass `-y` instead of `-n` to ffmpeg
    #[serde(default)]
    pub overwrite: bool,
}

/// How a batch runs and cleans up after itself
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Number of ffmpeg processes allowed to run at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Remove output files left behind by failed or cancelled jobs
    #[serde(default = "default_true")]
    pub cleanup_partial_outputs: bool,
    /// Title renames replace the input file once ffmpeg succeeds
    #[serde(default = "default_true")]
    pub replace_original: bool,
}

/// Defaults for the subtitle operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleConfig {
    /// Title shown in the player's subtitle menu for merged tracks
    #[serde(default = "default_language_title")]
    pub language_title: String,
    /// Default output format for extracted subtitles
    #[serde(default = "default_extract_format")]
    pub extract_format: String,
    /// Container used for videos with a merged subtitle
    #[serde(default = "default_container")]
    pub container: String,
    /// Rewrite subtitle files as UTF-8 before merging
    #[serde(default = "default_true")]
    pub normalize_encoding: bool,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            binary_path: "ffmpeg".to_string(),
            ffmpeg_dir: None,
            timeout_secs: default_timeout_secs(),
            overwrite: false,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            cleanup_partial_outputs: true,
            replace_original: true,
        }
    }
}

impl Default for SubtitleConfig {
    fn default() -> Self {
        Self {
            language_title: default_language_title(),
            extract_format: default_extract_format(),
            container: default_container(),
            normalize_encoding: true,
        }
    }
}

impl MediaConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| VidUtilsError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)?;

        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| VidUtilsError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| VidUtilsError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch.concurrency == 0 {
            return Err(VidUtilsError::Config(
                "batch.concurrency must be at least 1".to_string(),
            ));
        }
        if self.media.binary_path.trim().is_empty() && self.media.ffmpeg_dir.is_none() {
            return Err(VidUtilsError::Config(
                "media.binary_path must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
