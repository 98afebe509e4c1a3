//! Events for games with a continuous in-game clock and a kill feed.
//!
//! The clock is read every twenty seconds to line recording time up with game
//! time. Kill feed icons are matched every four seconds between the detected
//! game start and end.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::EventExtractor;
use crate::assembly::concat::cleanup_workspace;
use crate::assembly::MediaTools;
use crate::error::{HighlightError, Result};
use crate::model::{Event, EventName};
use crate::settings::OverlayRegions;
use crate::vision::frames::frame_path;
use crate::vision::ocr::first_timer;
use crate::vision::template::MATCH_THRESHOLD;
use crate::vision::{detect_icons, Detections, FrameSampler, IconTemplate, SampleWindow, TextRecognizer};

pub(crate) const TIMELINE_STEP_SECONDS: u32 = 20;
pub(crate) const KILLFEED_STEP_SECONDS: u32 = 4;
pub(crate) const END_SEARCH_SECONDS: u32 = 21;
/// A start offset needs more votes than this to be trusted.
pub(crate) const MIN_OFFSET_VOTES: usize = 10;

pub struct TimerKillfeedExtractor<'a, R: TextRecognizer> {
    media: &'a MediaTools,
    recording: PathBuf,
    regions: OverlayRegions,
    templates: Vec<IconTemplate>,
    recognizer: R,
    work_directory: PathBuf,
}

impl<'a, R: TextRecognizer> TimerKillfeedExtractor<'a, R> {
    pub fn new(
        media: &'a MediaTools,
        recording: &Path,
        regions: OverlayRegions,
        templates: Vec<IconTemplate>,
        recognizer: R,
        work_directory: &Path,
    ) -> Self {
        Self {
            media,
            recording: recording.to_path_buf(),
            regions,
            templates,
            recognizer,
            work_directory: work_directory.to_path_buf(),
        }
    }

    fn scan(&self, sampler: &FrameSampler<'_>) -> Result<Vec<Event>> {
        let duration = self.media.probe_duration(&self.recording)?.floor() as u32;

        let timer_directory = self.work_directory.join("timer");
        let sampled = sampler.sample(
            SampleWindow {
                start: 0,
                end: duration,
                step: TIMELINE_STEP_SECONDS,
            },
            Some(self.regions.timer),
            &timer_directory,
        )?;
        if sampled.is_empty() {
            return Err(HighlightError::NoFrames(self.recording.clone()));
        }

        let timeline = build_timeline(&self.recognizer.recognize(&timer_directory)?);
        let start = game_start_offset(&timeline)
            .ok_or_else(|| HighlightError::GameStartNotFound(self.recording.clone()))?;
        let last_known = timeline.keys().next_back().copied().unwrap_or(start);
        tracing::info!(
            recording = %self.recording.display(),
            start,
            timeline_entries = timeline.len(),
            "Located game start"
        );

        let end_directory = self.work_directory.join("end");
        sampler.sample(
            SampleWindow {
                start: last_known + 1,
                end: last_known + 1 + END_SEARCH_SECONDS,
                step: 1,
            },
            Some(self.regions.timer),
            &end_directory,
        )?;
        let end = game_end_second(last_known, &self.recognizer.recognize(&end_directory)?);

        let killfeed_directory = self.work_directory.join("killfeed");
        let killfeed_seconds = sampler.sample(
            SampleWindow {
                start,
                end: end + 1,
                step: KILLFEED_STEP_SECONDS,
            },
            Some(self.regions.killfeed),
            &killfeed_directory,
        )?;

        let mut events = scan_killfeed(&killfeed_directory, &killfeed_seconds, &self.templates);
        events.push(Event::new(EventName::GameEnd, f64::from(end)));
        tracing::info!(end, events = events.len(), "Scanned kill feed");
        Ok(events)
    }
}

impl<R: TextRecognizer> EventExtractor for TimerKillfeedExtractor<'_, R> {
    fn extract_events(&self) -> Result<Vec<Event>> {
        let sampler = FrameSampler::new(self.media, &self.recording)?;
        let result = self.scan(&sampler);
        cleanup_workspace(&self.work_directory);
        result
    }
}

/// Recording second to elapsed game seconds, for frames with a legible clock.
pub(crate) fn build_timeline(detections: &Detections) -> BTreeMap<u32, u32> {
    detections
        .iter()
        .filter_map(|(second, texts)| first_timer(texts).map(|elapsed| (*second, elapsed)))
        .collect()
}

/// Most common `recording second - game clock`, floored at one second.
pub(crate) fn game_start_offset(timeline: &BTreeMap<u32, u32>) -> Option<u32> {
    let mut votes: BTreeMap<i64, usize> = BTreeMap::new();
    for (second, elapsed) in timeline {
        *votes.entry(i64::from(*second) - i64::from(*elapsed)).or_default() += 1;
    }

    let mut best: Option<(i64, usize)> = None;
    for (offset, count) in votes {
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((offset, count));
        }
    }

    let (offset, count) = best?;
    if count <= MIN_OFFSET_VOTES {
        tracing::warn!(offset, count, "Game start offset has too few votes");
        return None;
    }
    Some(offset.max(1) as u32)
}

/// Latest second in the end search whose clock is still legible.
pub(crate) fn game_end_second(last_known: u32, detections: &Detections) -> u32 {
    detections
        .iter()
        .filter(|(_, texts)| first_timer(texts).is_some())
        .map(|(second, _)| *second)
        .max()
        .map_or(last_known, |second| second.max(last_known))
}

fn scan_killfeed(directory: &Path, seconds: &[u32], templates: &[IconTemplate]) -> Vec<Event> {
    let mut events = Vec::new();
    for second in seconds {
        let path = frame_path(directory, *second);
        let frame = match image::open(&path) {
            Ok(frame) => frame.to_luma8(),
            Err(error) => {
                tracing::debug!(frame = %path.display(), "Skipping unreadable frame: {error}");
                continue;
            }
        };

        events.extend(
            detect_icons(&frame, templates, MATCH_THRESHOLD)
                .into_iter()
                .map(|found| Event::new(found.name, f64::from(*second))),
        );
    }
    events
}
