//! Filter graphs for joining highlight clips.
//!
//! Every transition eats into the combined stream, so the offset of
//! transition `i` is the sum of the first `i + 1` measured clip durations
//! minus one second for each transition already applied.

pub(crate) const CROSSFADE_SECONDS: f64 = 1.0;
pub(crate) const AUDIO_CROSSFADE_SECONDS: f64 = 0.96;
pub(crate) const OVERLAY_SECONDS: f64 = 10.0;
/// The overlay fades in this many seconds before the end of the last clip.
pub(crate) const OVERLAY_LEAD_FROM_END_SECONDS: f64 = 11.0;

pub fn crossfade_offsets(durations: &[f64]) -> Vec<f64> {
    let mut offset = 0.0;
    durations
        .iter()
        .take(durations.len().saturating_sub(1))
        .map(|duration| {
            offset += duration - CROSSFADE_SECONDS;
            offset
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrossfadeFilters {
    pub video: String,
    pub audio: String,
}

/// `None` when there is nothing to join.
pub fn build_crossfade_filters(durations: &[f64]) -> Option<CrossfadeFilters> {
    if durations.len() < 2 {
        return None;
    }

    let offsets = crossfade_offsets(durations);
    let transitions = offsets.len();
    let mut video_filters = Vec::with_capacity(transitions);
    let mut audio_filters = Vec::with_capacity(transitions);

    for (index, offset) in offsets.iter().enumerate() {
        let is_final = index + 1 == transitions;

        let video_input = if index == 0 {
            "[0]".to_string()
        } else {
            format!("[vfade{index}]")
        };
        let video_output = if is_final {
            ",format=yuv420p".to_string()
        } else {
            format!("[vfade{}]", index + 1)
        };
        video_filters.push(format!(
            "{video_input}[{}:v]xfade=transition=fade:duration={CROSSFADE_SECONDS}:offset={offset:.3}{video_output}",
            index + 1
        ));

        let audio_input = if index == 0 {
            "[0:a]".to_string()
        } else {
            format!("[afade{index}]")
        };
        let audio_output = if is_final {
            String::new()
        } else {
            format!("[afade{}]", index + 1)
        };
        audio_filters.push(format!(
            "{audio_input}[{}:a]acrossfade=d={AUDIO_CROSSFADE_SECONDS}{audio_output}",
            index + 1
        ));
    }

    Some(CrossfadeFilters {
        video: video_filters.join("; "),
        audio: audio_filters.join("; "),
    })
}

pub fn overlay_offset(measured_duration: f64) -> f64 {
    (measured_duration - OVERLAY_LEAD_FROM_END_SECONDS).max(0.0)
}

pub fn overlay_filter(measured_duration: f64) -> String {
    format!(
        "xfade=transition=fade:offset={:.3}:duration={CROSSFADE_SECONDS}",
        overlay_offset(measured_duration)
    )
}
