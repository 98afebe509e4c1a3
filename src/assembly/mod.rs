//! Cuts selected highlights out of a recording and joins them into one video.

pub mod concat;
pub mod crossfade;
pub mod ffmpeg;

use std::path::{Path, PathBuf};

use crate::error::{HighlightError, Result};
use crate::model::Highlight;
use concat::{cleanup_workspace, create_workspace, faststart_remux, remove_file_quietly};
use crossfade::{build_crossfade_filters, overlay_filter, OVERLAY_SECONDS};
pub use ffmpeg::MediaTools;

/// The final clip runs longer so the statistics overlay has room.
pub(crate) const LAST_CLIP_EXTRA_SECONDS: f64 = 12.0;
pub(crate) const RENDER_PRESET: &str = "superfast";
pub(crate) const RENDER_CRF: &str = "27";

/// Padding around each highlight, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipTiming {
    pub lead_seconds: f64,
    pub trail_seconds: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClipPlan {
    pub start_seconds: f64,
    pub duration_seconds: f64,
    pub output_path: PathBuf,
}

/// `offset` maps event time to recording time.
pub fn plan_clips(
    highlights: &[Highlight],
    offset: f64,
    timing: ClipTiming,
    clips_directory: &Path,
) -> Vec<ClipPlan> {
    let last_index = highlights.len().saturating_sub(1);
    highlights
        .iter()
        .enumerate()
        .map(|(index, highlight)| {
            let mut duration_seconds = highlight.duration_seconds + timing.trail_seconds;
            if index == last_index {
                duration_seconds += LAST_CLIP_EXTRA_SECONDS;
            }
            ClipPlan {
                start_seconds: (highlight.start_time_seconds + offset - timing.lead_seconds).max(0.0),
                duration_seconds,
                output_path: clips_directory.join(format!("clip_{index:04}.mkv")),
            }
        })
        .collect()
}

pub struct VideoAssembler<'a> {
    media: &'a MediaTools,
}

impl<'a> VideoAssembler<'a> {
    pub fn new(media: &'a MediaTools) -> Self {
        Self { media }
    }

    /// Produces `target` from the highlights of one game. The clip workspace
    /// is removed whether or not assembly succeeds.
    #[allow(clippy::too_many_arguments)]
    pub fn assemble_game(
        &self,
        recording: &Path,
        highlights: &[Highlight],
        offset: f64,
        timing: ClipTiming,
        statistics_image: Option<&Path>,
        clips_directory: &Path,
        target: &Path,
    ) -> Result<()> {
        if highlights.is_empty() {
            return Err(HighlightError::NoHighlights(recording.display().to_string()));
        }
        if !recording.is_file() {
            return Err(HighlightError::RecordingMissing(recording.to_path_buf()));
        }

        create_workspace(clips_directory)?;
        let plans = plan_clips(highlights, offset, timing, clips_directory);
        let result = self.render_clips(recording, &plans, statistics_image, clips_directory, target);
        cleanup_workspace(clips_directory);
        result
    }

    fn render_clips(
        &self,
        recording: &Path,
        plans: &[ClipPlan],
        statistics_image: Option<&Path>,
        clips_directory: &Path,
        target: &Path,
    ) -> Result<()> {
        let mut clip_paths = Vec::with_capacity(plans.len());
        let mut durations = Vec::with_capacity(plans.len());
        let last_index = plans.len().saturating_sub(1);

        for (index, plan) in plans.iter().enumerate() {
            self.cut_clip(recording, plan)?;
            let mut clip_path = plan.output_path.clone();

            if index == last_index {
                if let Some(image) = statistics_image.filter(|image| image.is_file()) {
                    clip_path = self.apply_statistics_overlay(&clip_path, image, clips_directory)?;
                } else if let Some(image) = statistics_image {
                    tracing::warn!(
                        statistics_image = %image.display(),
                        "Statistics image missing, skipping overlay"
                    );
                }
            }

            let measured = self.media.probe_duration(&clip_path)?;
            tracing::debug!(
                clip = %clip_path.display(),
                planned = plan.duration_seconds,
                measured,
                "Cut highlight clip"
            );
            durations.push(measured);
            clip_paths.push(clip_path);
        }

        self.combine_clips(&clip_paths, &durations, clips_directory, target)
    }

    fn cut_clip(&self, recording: &Path, plan: &ClipPlan) -> Result<()> {
        let mut command = self.media.ffmpeg_command();
        command
            .arg("-ss")
            .arg(format!("{:.3}", plan.start_seconds))
            .arg("-i")
            .arg(recording)
            .arg("-to")
            .arg(format!("{:.3}", plan.duration_seconds))
            .arg("-c")
            .arg("copy")
            .arg(&plan.output_path);
        self.media.run_ffmpeg(command, "clip cut")
    }

    /// Renders the still image to a short video at the clip's frame rate and
    /// fades it in near the end of the clip.
    fn apply_statistics_overlay(
        &self,
        clip_path: &Path,
        image: &Path,
        clips_directory: &Path,
    ) -> Result<PathBuf> {
        let frame_rate = self.media.probe_frame_rate(clip_path)?;
        let measured = self.media.probe_duration(clip_path)?;
        let statistics_video = clips_directory.join("statistics.mkv");
        let overlaid_clip = clips_directory.join("last_with_statistics.mkv");

        let mut render = self.media.ffmpeg_command();
        render
            .arg("-loop")
            .arg("1")
            .arg("-i")
            .arg(image)
            .arg("-filter:v")
            .arg(format!("fps={frame_rate:.3}"))
            .arg("-t")
            .arg(format!("{OVERLAY_SECONDS}"))
            .arg(&statistics_video);
        self.media.run_ffmpeg(render, "statistics render")?;

        let mut blend = self.media.ffmpeg_command();
        blend
            .arg("-i")
            .arg(clip_path)
            .arg("-i")
            .arg(&statistics_video)
            .arg("-filter_complex")
            .arg(overlay_filter(measured))
            .arg("-preset")
            .arg(RENDER_PRESET)
            .arg("-crf")
            .arg(RENDER_CRF)
            .arg("-c:a")
            .arg("copy")
            .arg(&overlaid_clip);
        self.media.run_ffmpeg(blend, "statistics overlay")?;

        Ok(overlaid_clip)
    }

    fn combine_clips(
        &self,
        clip_paths: &[PathBuf],
        durations: &[f64],
        clips_directory: &Path,
        target: &Path,
    ) -> Result<()> {
        let Some(filters) = build_crossfade_filters(durations) else {
            let Some(only_clip) = clip_paths.first() else {
                return Err(HighlightError::NoHighlights(target.display().to_string()));
            };
            return faststart_remux(self.media, only_clip, target);
        };

        let video_path = clips_directory.join("crossfaded_video.mkv");
        let audio_path = clips_directory.join("crossfaded_audio.mka");

        let mut video = self.media.ffmpeg_command();
        for clip_path in clip_paths {
            video.arg("-i").arg(clip_path);
        }
        video
            .arg("-filter_complex")
            .arg(&filters.video)
            .arg("-preset")
            .arg(RENDER_PRESET)
            .arg("-crf")
            .arg(RENDER_CRF)
            .arg("-an")
            .arg(&video_path);
        self.media.run_ffmpeg(video, "video crossfade")?;

        let mut audio = self.media.ffmpeg_command();
        for clip_path in clip_paths {
            audio.arg("-i").arg(clip_path);
        }
        audio
            .arg("-filter_complex")
            .arg(&filters.audio)
            .arg("-vn")
            .arg(&audio_path);
        self.media.run_ffmpeg(audio, "audio crossfade")?;

        let mut mux = self.media.ffmpeg_command();
        mux.arg("-i")
            .arg(&video_path)
            .arg("-i")
            .arg(&audio_path)
            .arg("-c")
            .arg("copy")
            .arg("-movflags")
            .arg("+faststart")
            .arg(target);
        self.media.run_ffmpeg(mux, "crossfade mux")
    }

    /// Joins per-game videos into `<folder>/highlights.mkv` and a faststart
    /// `<folder>/highlights.mp4`, returning the latter.
    pub fn combine_games(&self, game_videos: &[PathBuf], output_folder: &Path) -> Result<PathBuf> {
        let usable = concat::collect_non_empty_media(game_videos);
        if usable.is_empty() {
            return Err(HighlightError::NoHighlights(output_folder.display().to_string()));
        }

        create_workspace(output_folder)?;
        let list_path = output_folder.join(concat::CONCAT_LIST_FILE_NAME);
        let combined = output_folder.join("highlights.mkv");
        let published = output_folder.join("highlights.mp4");

        concat::write_concat_file(&list_path, &usable)?;
        let result = concat::concat_lossless(self.media, &list_path, &combined)
            .and_then(|_| faststart_remux(self.media, &combined, &published));
        remove_file_quietly(&list_path);
        result?;

        tracing::info!(
            games = usable.len(),
            output = %published.display(),
            "Combined match highlights"
        );
        Ok(published)
    }
}
