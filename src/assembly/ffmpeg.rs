use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{HighlightError, Result};
use crate::settings::PipelineSettings;

pub(crate) const FFMPEG_ENV: &str = "HIGHLIGHT_REEL_FFMPEG";
pub(crate) const FFPROBE_ENV: &str = "HIGHLIGHT_REEL_FFPROBE";

fn executable_name(name: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{name}.exe")
    } else {
        name.to_string()
    }
}

/// Configured path, then environment override, then next to the executable.
/// Falls back to the bare name so the binary is looked up on `PATH`.
pub(crate) fn resolve_binary_path(configured: Option<&Path>, env_key: &str, name: &str) -> PathBuf {
    let file_name = executable_name(name);
    let mut candidates: Vec<PathBuf> = Vec::new();

    if let Some(configured) = configured {
        candidates.push(configured.to_path_buf());
    }

    if let Ok(from_env) = std::env::var(env_key) {
        if !from_env.trim().is_empty() {
            candidates.push(PathBuf::from(from_env.trim()));
        }
    }

    if let Ok(current_executable) = std::env::current_exe() {
        if let Some(executable_directory) = current_executable.parent() {
            candidates.push(executable_directory.join(&file_name));
            candidates.push(executable_directory.join("bin").join(&file_name));
        }
    }

    if let Some(found_path) = candidates.into_iter().find(|path| path.is_file()) {
        return found_path;
    }

    tracing::debug!(binary = %file_name, "Falling back to PATH lookup");
    PathBuf::from(file_name)
}

pub(crate) fn parse_frame_rate(raw: &str) -> Option<f64> {
    let line = raw.lines().map(str::trim).find(|line| !line.is_empty())?;
    let value = line.trim_end_matches(',');

    let rate = match value.split_once('/') {
        Some((numerator, denominator)) => {
            let numerator = numerator.trim().parse::<f64>().ok()?;
            let denominator = denominator.trim().parse::<f64>().ok()?;
            if denominator == 0.0 {
                return None;
            }
            numerator / denominator
        }
        None => value.parse::<f64>().ok()?,
    };

    (rate.is_finite() && rate > 0.0).then_some(rate)
}

pub(crate) fn parse_duration(raw: &str) -> Option<f64> {
    let value = raw.lines().map(str::trim).find(|line| !line.is_empty())?;
    let duration = value.parse::<f64>().ok()?;
    (duration.is_finite() && duration >= 0.0).then_some(duration)
}

/// Handles to the transcoding and probing binaries.
#[derive(Clone, Debug)]
pub struct MediaTools {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl MediaTools {
    pub fn resolve(settings: &PipelineSettings) -> Self {
        Self {
            ffmpeg: resolve_binary_path(settings.ffmpeg_path.as_deref(), FFMPEG_ENV, "ffmpeg"),
            ffprobe: resolve_binary_path(settings.ffprobe_path.as_deref(), FFPROBE_ENV, "ffprobe"),
        }
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg
    }

    /// Quiet, non-interactive, overwriting ffmpeg invocation.
    pub(crate) fn ffmpeg_command(&self) -> Command {
        let mut command = Command::new(&self.ffmpeg);
        command
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-nostdin")
            .arg("-y")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        command
    }

    pub(crate) fn run_ffmpeg(&self, mut command: Command, action: &str) -> Result<()> {
        let output = command
            .output()
            .map_err(|error| HighlightError::tool("ffmpeg", format!("failed to start for {action}: {error}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HighlightError::tool(
                "ffmpeg",
                format!("{action} exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        Ok(())
    }

    fn run_ffprobe(&self, args: &[&str], media_path: &Path) -> Result<String> {
        let output = Command::new(&self.ffprobe)
            .args(args)
            .arg(media_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|error| HighlightError::tool("ffprobe", format!("failed to start: {error}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HighlightError::tool(
                "ffprobe",
                format!(
                    "probing '{}' exited with {}: {}",
                    media_path.display(),
                    output.status,
                    stderr.trim()
                ),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    pub fn probe_duration(&self, media_path: &Path) -> Result<f64> {
        let stdout = self.run_ffprobe(
            &[
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ],
            media_path,
        )?;

        parse_duration(&stdout).ok_or_else(|| {
            HighlightError::tool(
                "ffprobe",
                format!("unreadable duration '{}' for '{}'", stdout.trim(), media_path.display()),
            )
        })
    }

    pub fn probe_frame_rate(&self, media_path: &Path) -> Result<f64> {
        let stdout = self.run_ffprobe(
            &[
                "-v",
                "error",
                "-of",
                "csv=p=0",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=r_frame_rate",
            ],
            media_path,
        )?;

        parse_frame_rate(&stdout).ok_or_else(|| {
            HighlightError::tool(
                "ffprobe",
                format!("unreadable frame rate '{}' for '{}'", stdout.trim(), media_path.display()),
            )
        })
    }
}
