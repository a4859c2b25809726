//! vidutils - batch media utilities on top of ffmpeg
//!
//! Converts files between formats, sets title metadata from filenames, merges
//! external subtitles into videos and extracts embedded subtitle tracks.

use anyhow::Result;
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vidutils::batch::BatchResult;
use vidutils::cli::{Args, Commands, InputArgs, RunArgs};
use vidutils::config::Config;
use vidutils::job::{ConversionKind, ConvertOptions, ExtractOptions, MediaJob};
use vidutils::progress::{ConsoleProgress, NoProgress, ProgressReporter};
use vidutils::workflow::{self, Workflow};

const DEFAULT_CONFIG_FILE: &str = "vidutils.toml";

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Setup logging to both console and file
    let _log_guard = setup_logging(args.verbose)?;

    let mut config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if Path::new(DEFAULT_CONFIG_FILE).exists() {
                info!("Found {} in current directory, loading...", DEFAULT_CONFIG_FILE);
                Config::from_file(DEFAULT_CONFIG_FILE)?
            } else {
                Config::default()
            }
        }
    };

    let (inputs, run) = match &args.command {
        Commands::InitConfig { path, force } => {
            if path.exists() && !force {
                anyhow::bail!("{} already exists, pass --force to replace it", path.display());
            }
            Config::default().save_to_file(path)?;
            println!("Wrote default configuration to {}", path.display());
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Check => {
            let workflow = Workflow::new(config)?;
            let version = workflow.check_tool().await?;
            println!("{}", version);
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Convert { inputs, run, .. }
        | Commands::RenameTitle { inputs, run, .. }
        | Commands::MergeSubtitle { inputs, run, .. }
        | Commands::ExtractSubtitle { inputs, run, .. } => (inputs.clone(), run.clone()),
    };

    apply_overrides(&mut config, &run);
    if let Commands::RenameTitle { keep_original: true, .. } = &args.command {
        config.batch.replace_original = false;
    }

    let files = collect(&inputs)?;
    if files.is_empty() {
        warn!("No input files to process");
        return Ok(ExitCode::SUCCESS);
    }

    let workflow = Workflow::new(config)?;
    let jobs = build_jobs(&workflow, args.command, &files).await?;

    // First Ctrl-C cancels the batch, a second one exits immediately.
    let coordinator = workflow.coordinator();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupted, cancelling batch (press Ctrl-C again to exit now)");
        coordinator.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted twice, exiting");
            std::process::exit(130);
        }
    });

    let progress: Arc<dyn ProgressReporter> = if args.json {
        Arc::new(NoProgress)
    } else {
        Arc::new(ConsoleProgress::new())
    };
    let result = workflow.run(jobs, progress).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_report(&result);
    }

    Ok(if result.cancelled > 0 {
        ExitCode::from(130)
    } else if result.all_succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn apply_overrides(config: &mut Config, run: &RunArgs) {
    if let Some(concurrency) = run.concurrency {
        config.batch.concurrency = concurrency.max(1);
    }
    if let Some(timeout) = run.timeout {
        config.media.timeout_secs = timeout;
    }
    if run.overwrite {
        config.media.overwrite = true;
    }
    if run.keep_partial {
        config.batch.cleanup_partial_outputs = false;
    }
}

fn collect(inputs: &InputArgs) -> Result<Vec<std::path::PathBuf>> {
    if inputs.files.is_empty() && inputs.input_dir.is_none() {
        anyhow::bail!("No input given: pass files or --input-dir");
    }
    Ok(workflow::collect_inputs(
        &inputs.files,
        inputs.input_dir.as_deref(),
        &inputs.extension,
        inputs.recursive,
    )?)
}

async fn build_jobs(workflow: &Workflow, command: Commands, files: &[std::path::PathBuf]) -> Result<Vec<MediaJob>> {
    let jobs = match command {
        Commands::Convert {
            format,
            audio,
            video_codec,
            audio_codec,
            extra_args,
            output_dir,
            output,
            ..
        } => {
            let options = ConvertOptions {
                format,
                kind: if audio { ConversionKind::Audio } else { ConversionKind::Video },
                video_codec,
                audio_codec,
                extra_args,
            };
            workflow::apply_output(
                workflow::convert_jobs(files, &options, output_dir.as_deref()),
                output,
            )?
        }
        Commands::RenameTitle { title, .. } => workflow::rename_title_jobs(files, title.as_deref()),
        Commands::MergeSubtitle {
            subtitle,
            language,
            container,
            output,
            ..
        } => workflow::apply_output(
            workflow::merge_subtitle_jobs(files, subtitle, language, container, &workflow.config().subtitle).await?,
            output,
        )?,
        Commands::ExtractSubtitle {
            format,
            stream,
            output_dir,
            output,
            ..
        } => {
            let options = ExtractOptions {
                format: format.or_else(|| Some(workflow.config().subtitle.extract_format.clone())),
                stream_index: stream,
            };
            workflow::apply_output(
                workflow::extract_subtitle_jobs(files, &options, output_dir.as_deref()),
                output,
            )?
        }
        Commands::Check | Commands::InitConfig { .. } => Vec::new(),
    };
    Ok(jobs)
}

fn print_report(result: &BatchResult) {
    println!("\nBatch {}", result.id);
    println!("{:<10} {:<10} {:<50}", "Status", "Time", "File");
    println!("{}", "-".repeat(72));

    for outcome in &result.outcomes {
        let status = match outcome.failure {
            None => "ok".to_string(),
            Some(kind) => kind.to_string(),
        };
        println!(
            "{:<10} {:<10} {:<50}",
            status,
            format_duration(outcome.elapsed_ms),
            outcome.job.input.display()
        );
    }

    if !result.failures.is_empty() {
        println!("\nFailures:");
        for failure in &result.failures {
            println!("  {} ({})", failure.input.display(), failure.kind);
            for line in last_lines(&failure.diagnostic, 5) {
                println!("      {}", line);
            }
        }
    }

    println!(
        "\n{} succeeded, {} failed ({} cancelled) of {}",
        result.succeeded, result.failed, result.cancelled, result.total
    );
}

/// Tail of the diagnostic; ffmpeg prints the actual error last.
fn last_lines(text: &str, count: usize) -> Vec<&str> {
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(count)..].to_vec()
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<WorkerGuard> {
    let log_dir = std::env::current_dir()?.join(".vidutils").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(&log_dir, "vidutils.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    // Console output goes to stderr so `--json` output stays parseable
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false); // No ANSI colors in file

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized - console: {}, file: {}",
          log_level, log_dir.join("vidutils.log").display());

    Ok(guard)
}

/// Format milliseconds to a short human readable string
fn format_duration(millis: u64) -> String {
    let seconds = millis / 1000;
    if seconds < 60 {
        format!("{:.1}s", millis as f64 / 1000.0)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}
