use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Print the batch result as JSON instead of a table
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Which files a batch runs on
#[derive(ClapArgs, Debug, Clone)]
pub struct InputArgs {
    /// Input files
    pub files: Vec<PathBuf>,

    /// Directory to scan for input files
    #[arg(short, long)]
    pub input_dir: Option<PathBuf>,

    /// Input extensions to pick up from the directory (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub extension: Vec<String>,

    /// Scan the input directory recursively
    #[arg(short, long)]
    pub recursive: bool,
}

/// Overrides for the batch and media configuration
#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// Number of files processed at once
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Per-file timeout in seconds (0 disables it)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Overwrite existing output files
    #[arg(long)]
    pub overwrite: bool,

    /// Keep output files of failed jobs
    #[arg(long)]
    pub keep_partial: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert files to another container or codec
    Convert {
        #[command(flatten)]
        inputs: InputArgs,

        #[command(flatten)]
        run: RunArgs,

        /// Target format, used as the output extension (e.g. mp4, mkv, mp3)
        #[arg(short, long)]
        format: Option<String>,

        /// Drop the video and convert the audio track only
        #[arg(long)]
        audio: bool,

        /// Video codec (defaults to stream copy)
        #[arg(long)]
        video_codec: Option<String>,

        /// Audio codec (defaults to stream copy for video, picked from the format for audio)
        #[arg(long)]
        audio_codec: Option<String>,

        /// Extra argument passed to ffmpeg before the output file (repeatable)
        #[arg(long = "ffmpeg-arg", allow_hyphen_values = true)]
        extra_args: Vec<String>,

        /// Output directory
        #[arg(short = 'd', long)]
        output_dir: Option<PathBuf>,

        /// Output file (single input only)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Set the title metadata of each file to its filename
    RenameTitle {
        #[command(flatten)]
        inputs: InputArgs,

        #[command(flatten)]
        run: RunArgs,

        /// Use this title instead of the filename
        #[arg(short, long)]
        title: Option<String>,

        /// Keep the original file and leave the retitled copy next to it
        #[arg(long)]
        keep_original: bool,
    },

    /// Add an external subtitle track to each video
    MergeSubtitle {
        #[command(flatten)]
        inputs: InputArgs,

        #[command(flatten)]
        run: RunArgs,

        /// Subtitle file (single input only, defaults to <video>.srt)
        #[arg(short, long)]
        subtitle: Option<PathBuf>,

        /// Subtitle track title shown by players
        #[arg(short, long)]
        language: Option<String>,

        /// Output container
        #[arg(long)]
        container: Option<String>,

        /// Output file (single input only)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Extract an embedded subtitle track from each video
    ExtractSubtitle {
        #[command(flatten)]
        inputs: InputArgs,

        #[command(flatten)]
        run: RunArgs,

        /// Subtitle format: srt, ass, ssa or vtt
        #[arg(short, long)]
        format: Option<String>,

        /// Index of the subtitle stream to extract
        #[arg(short, long, default_value = "0")]
        stream: usize,

        /// Output directory
        #[arg(short = 'd', long)]
        output_dir: Option<PathBuf>,

        /// Output file (single input only)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check that ffmpeg can be found and run
    Check,

    /// Write the default configuration file
    InitConfig {
        /// Destination file
        #[arg(short, long, default_value = "vidutils.toml")]
        path: PathBuf,

        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_arguments() {
        let args = Args::try_parse_from([
            "vidutils", "convert", "a.avi", "b.mov", "-f", "mp4", "--concurrency", "2",
            "--ffmpeg-arg", "-movflags", "--ffmpeg-arg", "+faststart",
        ])
        .unwrap();

        match args.command {
            Commands::Convert { inputs, run, format, extra_args, .. } => {
                assert_eq!(inputs.files, vec![PathBuf::from("a.avi"), PathBuf::from("b.mov")]);
                assert_eq!(format.as_deref(), Some("mp4"));
                assert_eq!(run.concurrency, Some(2));
                assert_eq!(extra_args, vec!["-movflags", "+faststart"]);
            }
            _ => panic!("expected convert"),
        }
    }

    #[test]
    fn test_directory_selection() {
        let args = Args::try_parse_from([
            "vidutils", "--json", "rename-title", "--input-dir", "/videos", "-e", "mp4,mkv", "-r",
        ])
        .unwrap();

        assert!(args.json);
        match args.command {
            Commands::RenameTitle { inputs, keep_original, .. } => {
                assert_eq!(inputs.input_dir, Some(PathBuf::from("/videos")));
                assert_eq!(inputs.extension, vec!["mp4", "mkv"]);
                assert!(inputs.recursive);
                assert!(!keep_original);
            }
            _ => panic!("expected rename-title"),
        }
    }
}
