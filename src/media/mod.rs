// Media tool plumbing
//
// - Commands: job to ffmpeg argument list translation
// - Runner: child process execution with timeout and cancellation

pub mod commands;
pub mod runner;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

pub use commands::*;
pub use runner::*;

use crate::config::MediaConfig;
use crate::error::{Result, VidUtilsError};

/// Environment variable pointing at an ffmpeg distribution directory
pub const FFMPEG_DIR_ENV: &str = "FFMPEG_DIRECTORY";

/// Locate the ffmpeg executable.
///
/// Order: `media.binary_path` when it is a path, `media.ffmpeg_dir`, a
/// non-empty `FFMPEG_DIRECTORY` environment variable, then `media.binary_path`
/// looked up on `PATH`.
pub fn resolve_binary(config: &MediaConfig) -> Result<PathBuf> {
    locate(config, env_dir(std::env::var_os(FFMPEG_DIR_ENV)))
}

fn env_dir(value: Option<OsString>) -> Option<PathBuf> {
    value.filter(|v| !v.is_empty()).map(PathBuf::from)
}

fn locate(config: &MediaConfig, env_dir: Option<PathBuf>) -> Result<PathBuf> {
    let candidate = Path::new(&config.binary_path);
    if candidate.components().count() > 1 {
        reject_restricted(candidate)?;
        return if candidate.is_file() {
            Ok(candidate.to_path_buf())
        } else {
            Err(VidUtilsError::BinaryNotFound(candidate.display().to_string()))
        };
    }

    if let Some(dir) = config.ffmpeg_dir.clone().or(env_dir) {
        return binary_in_dir(&dir);
    }

    let found = which::which(&config.binary_path).map_err(|e| {
        VidUtilsError::BinaryNotFound(format!(
            "{} ({}); install ffmpeg from https://ffmpeg.org or set media.ffmpeg_dir",
            config.binary_path, e
        ))
    })?;
    reject_restricted(&found)?;
    Ok(found)
}

/// `<dir>/bin/ffmpeg[.exe]` or `<dir>/ffmpeg[.exe]`.
fn binary_in_dir(dir: &Path) -> Result<PathBuf> {
    reject_restricted(dir)?;

    let names = ["ffmpeg", "ffmpeg.exe"];
    [dir.join("bin"), dir.to_path_buf()]
        .iter()
        .flat_map(|base| names.iter().map(move |name| base.join(name)))
        .find(|path| path.is_file())
        .ok_or_else(|| VidUtilsError::BinaryNotFound(format!("no ffmpeg under {}", dir.display())))
}

fn reject_restricted(path: &Path) -> Result<()> {
    if path.to_string_lossy().to_lowercase().contains("system32") {
        return Err(VidUtilsError::Config(format!(
            "ffmpeg cannot be run from a system32 directory: {}",
            path.display()
        )));
    }
    Ok(())
}

/// Run `ffmpeg -version` and return its first output line.
pub async fn check_availability(command: &MediaCommand) -> Result<String> {
    debug!("Checking media tool: {}", command.command_line());

    let output = Command::new(&command.binary_path)
        .args(&command.args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| VidUtilsError::BinaryNotFound(format!("{}: {}", command.binary_path, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(VidUtilsError::Media(format!("Media tool version check failed: {}", stderr)));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let version = stdout.lines().next().unwrap_or("Unknown version").to_string();
    info!("Media tool is available: {}", version);
    Ok(version)
}
