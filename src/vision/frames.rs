use std::fs;
use std::path::{Path, PathBuf};

use crate::assembly::MediaTools;
use crate::error::{HighlightError, Result};
use crate::settings::CropRegion;

/// Seconds `[start, end)` sampled every `step` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleWindow {
    pub start: u32,
    pub end: u32,
    pub step: u32,
}

impl SampleWindow {
    pub fn seconds(&self) -> impl Iterator<Item = u32> {
        (self.start..self.end).step_by(self.step.max(1) as usize)
    }
}

pub(crate) fn frame_path(directory: &Path, second: u32) -> PathBuf {
    directory.join(format!("{second}.png"))
}

/// The sampled second encoded in a frame's file name.
pub(crate) fn frame_second(path: &Path) -> Option<u32> {
    if path.extension().and_then(|extension| extension.to_str()) != Some("png") {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    if stem.is_empty() || !stem.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

/// Keeps the first frame at or after every `step` boundary of the window, so
/// the n-th output frame shows second `start + n * step`.
pub(crate) fn sampling_filter(step: u32, crop: Option<CropRegion>) -> String {
    let mut filters = vec![format!(
        "select='isnan(prev_selected_t)+gte(t-prev_selected_t,{step})'"
    )];
    if let Some(crop) = crop {
        filters.push(crop.ffmpeg_filter());
    }
    filters.join(",")
}

/// Splits `[0, duration)` into consecutive chunks of at most `chunk_seconds`.
pub(crate) fn chunk_windows(duration: u32, chunk_seconds: u32, step: u32) -> Vec<SampleWindow> {
    let chunk_seconds = chunk_seconds.max(1);
    (0..duration)
        .step_by(chunk_seconds as usize)
        .map(|start| SampleWindow {
            start,
            end: (start + chunk_seconds).min(duration),
            step,
        })
        .collect()
}

pub struct FrameSampler<'a> {
    media: &'a MediaTools,
    recording: PathBuf,
}

impl<'a> FrameSampler<'a> {
    pub fn new(media: &'a MediaTools, recording: &Path) -> Result<Self> {
        if !recording.is_file() {
            return Err(HighlightError::RecordingMissing(recording.to_path_buf()));
        }
        Ok(Self {
            media,
            recording: recording.to_path_buf(),
        })
    }

    /// Writes `<second>.png` into `output_directory` for each sampled second
    /// and returns the seconds actually produced, ascending.
    pub fn sample(
        &self,
        window: SampleWindow,
        crop: Option<CropRegion>,
        output_directory: &Path,
    ) -> Result<Vec<u32>> {
        if window.end <= window.start {
            return Ok(Vec::new());
        }
        fs::create_dir_all(output_directory)
            .map_err(|error| HighlightError::io(output_directory, error))?;

        let step = window.step.max(1);

        let prefix = format!("chunk_{}_", window.start);
        let pattern = output_directory.join(format!("{prefix}%06d.png"));

        let mut command = self.media.ffmpeg_command();
        command
            .arg("-ss")
            .arg(window.start.to_string())
            .arg("-i")
            .arg(&self.recording)
            .arg("-t")
            .arg((window.end - window.start).to_string())
            .arg("-vf")
            .arg(sampling_filter(step, crop))
            .arg("-fps_mode")
            .arg("vfr")
            .arg(&pattern);
        self.media.run_ffmpeg(command, "frame sampling")?;

        let mut produced = Vec::new();
        for (index, second) in window.seconds().enumerate() {
            let numbered = output_directory.join(format!("{prefix}{:06}.png", index + 1));
            if !numbered.is_file() {
                break;
            }
            let target = frame_path(output_directory, second);
            fs::rename(&numbered, &target).map_err(|error| HighlightError::io(&target, error))?;
            produced.push(second);
        }

        tracing::debug!(
            start = window.start,
            end = window.end,
            step,
            frames = produced.len(),
            "Sampled frames"
        );
        Ok(produced)
    }
}

#[cfg(test)]
mod tests {
    use super::{chunk_windows, frame_path, frame_second, sampling_filter, SampleWindow};
    use crate::settings::CropRegion;
    use std::path::Path;

    #[test]
    fn frame_names_round_trip_to_seconds() {
        let path = frame_path(Path::new("/frames"), 1_260);
        assert_eq!(path, Path::new("/frames/1260.png"));
        assert_eq!(frame_second(&path), Some(1_260));
        assert_eq!(frame_second(Path::new("/frames/chunk_0_000001.png")), None);
        assert_eq!(frame_second(Path::new("/frames/12.jpg")), None);
    }

    #[test]
    fn sampling_selects_frames_on_step_boundaries() {
        assert_eq!(
            sampling_filter(4, None),
            "select='isnan(prev_selected_t)+gte(t-prev_selected_t,4)'"
        );

        let crop = CropRegion {
            x: 1_500,
            y: 200,
            width: 400,
            height: 300,
        };
        assert_eq!(
            sampling_filter(20, Some(crop)),
            "select='isnan(prev_selected_t)+gte(t-prev_selected_t,20)',crop=400:300:1500:200"
        );
    }

    #[test]
    fn windows_cover_the_recording_without_overlap() {
        let windows = chunk_windows(1_500, 600, 1);
        assert_eq!(
            windows,
            vec![
                SampleWindow { start: 0, end: 600, step: 1 },
                SampleWindow { start: 600, end: 1_200, step: 1 },
                SampleWindow { start: 1_200, end: 1_500, step: 1 },
            ]
        );
    }

    #[test]
    fn window_seconds_respect_step() {
        let window = SampleWindow {
            start: 100,
            end: 113,
            step: 4,
        };
        assert_eq!(window.seconds().collect::<Vec<_>>(), vec![100, 104, 108, 112]);
    }
}
