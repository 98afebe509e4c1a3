//! Per-second round state for games whose clock resets every round.
//!
//! The recording is sampled once per second in fixed-size chunks, one worker
//! thread per chunk. Recognition runs once after every chunk has finished.

use std::path::{Path, PathBuf};
use std::thread;

use super::EventExtractor;
use crate::assembly::concat::cleanup_workspace;
use crate::assembly::MediaTools;
use crate::error::{HighlightError, Result};
use crate::model::{Event, SecondData};
use crate::settings::CropRegion;
use crate::vision::frames::chunk_windows;
use crate::vision::ocr::first_timer;
use crate::vision::{Detections, FrameSampler, TextRecognizer};

pub(crate) const SAMPLE_STEP_SECONDS: u32 = 1;
/// Readings further than this from the expected countdown are a clock change.
pub(crate) const ROUND_RESET_TOLERANCE_SECONDS: u32 = 5;
/// The buy phase clock every round opens with.
pub(crate) const BUY_PHASE_SECONDS: u32 = 30;

/// Turns recognized text into per-second state.
pub trait SecondDecoder {
    fn decode(&self, seconds: &[u32], detections: &Detections) -> Vec<SecondData>;
}

/// Reads the round clock and numbers rounds by buy phase starts.
///
/// Within a round the clock restarts twice more, once when the action phase
/// begins and once when the spike is planted. Only a clock change that lands
/// on the buy phase value opens a new round. Seconds before the first legible
/// clock belong to round 0. This is a timer-only heuristic: it reports no kill
/// events, and a buy phase that is never legible merges two rounds.
#[derive(Debug, Default, Clone, Copy)]
pub struct RoundTimerDecoder;

fn is_buy_phase_start(time_left: u32) -> bool {
    time_left <= BUY_PHASE_SECONDS && time_left + ROUND_RESET_TOLERANCE_SECONDS >= BUY_PHASE_SECONDS
}

impl SecondDecoder for RoundTimerDecoder {
    fn decode(&self, seconds: &[u32], detections: &Detections) -> Vec<SecondData> {
        let mut round_number = 0;
        let mut previous: Option<(u32, u32)> = None;

        seconds
            .iter()
            .map(|second| {
                let round_time_left = detections.get(second).and_then(|texts| first_timer(texts));
                if let Some(time_left) = round_time_left {
                    match previous {
                        None => round_number = round_number.max(1),
                        Some((previous_second, previous_time_left)) => {
                            let elapsed = second.saturating_sub(previous_second);
                            let expected = previous_time_left.saturating_sub(elapsed);
                            let clock_changed = time_left.abs_diff(expected) > ROUND_RESET_TOLERANCE_SECONDS;
                            if clock_changed && is_buy_phase_start(time_left) {
                                round_number += 1;
                            }
                        }
                    }
                    previous = Some((*second, time_left));
                }

                SecondData {
                    second: *second,
                    round_time_left,
                    round_number,
                    events: Vec::new(),
                }
            })
            .collect()
    }
}

pub struct ChunkedRoundExtractor<'a, R: TextRecognizer, D: SecondDecoder> {
    media: &'a MediaTools,
    recording: PathBuf,
    timer_region: CropRegion,
    chunk_seconds: u32,
    recognizer: R,
    decoder: D,
    work_directory: PathBuf,
}

impl<'a, R: TextRecognizer, D: SecondDecoder> ChunkedRoundExtractor<'a, R, D> {
    pub fn new(
        media: &'a MediaTools,
        recording: &Path,
        timer_region: CropRegion,
        chunk_seconds: u32,
        recognizer: R,
        decoder: D,
        work_directory: &Path,
    ) -> Self {
        Self {
            media,
            recording: recording.to_path_buf(),
            timer_region,
            chunk_seconds,
            recognizer,
            decoder,
            work_directory: work_directory.to_path_buf(),
        }
    }

    pub fn extract_seconds(&self) -> Result<Vec<SecondData>> {
        let sampler = FrameSampler::new(self.media, &self.recording)?;
        let result = self.decode_recording(&sampler);
        cleanup_workspace(&self.work_directory);
        result
    }

    fn decode_recording(&self, sampler: &FrameSampler<'_>) -> Result<Vec<SecondData>> {
        let duration = self.media.probe_duration(&self.recording)?.floor() as u32;
        let seconds = self.sample_chunks(sampler, duration)?;
        if seconds.is_empty() {
            return Err(HighlightError::NoFrames(self.recording.clone()));
        }

        let detections = self.recognizer.recognize(&self.work_directory)?;
        let decoded = self.decoder.decode(&seconds, &detections);
        tracing::info!(
            recording = %self.recording.display(),
            seconds = decoded.len(),
            rounds = decoded.iter().map(|data| data.round_number).max().unwrap_or(0),
            "Decoded round timeline"
        );
        Ok(decoded)
    }

    /// Waits for every chunk. A failed chunk is logged and leaves a gap.
    fn sample_chunks(&self, sampler: &FrameSampler<'_>, duration: u32) -> Result<Vec<u32>> {
        let windows = chunk_windows(duration, self.chunk_seconds, SAMPLE_STEP_SECONDS);
        let work_directory = self.work_directory.as_path();
        let timer_region = self.timer_region;

        let results: Vec<Result<Vec<u32>>> = thread::scope(|scope| {
            let workers: Vec<_> = windows
                .iter()
                .map(|window| {
                    let window = *window;
                    let handle = scope.spawn(move || {
                        sampler.sample(window, Some(timer_region), work_directory)
                    });
                    (window, handle)
                })
                .collect();

            workers
                .into_iter()
                .map(|(window, handle)| {
                    handle.join().unwrap_or_else(|_| {
                        Err(HighlightError::tool(
                            "ffmpeg",
                            format!("sampling worker for {}..{} panicked", window.start, window.end),
                        ))
                    })
                })
                .collect()
        });

        let mut seconds = Vec::new();
        for result in results {
            match result {
                Ok(sampled) => seconds.extend(sampled),
                Err(error) => tracing::warn!("Frame sampling chunk failed: {error}"),
            }
        }
        seconds.sort_unstable();
        Ok(seconds)
    }
}

impl<R: TextRecognizer, D: SecondDecoder> EventExtractor for ChunkedRoundExtractor<'_, R, D> {
    fn extract_events(&self) -> Result<Vec<Event>> {
        let mut events: Vec<Event> = self
            .extract_seconds()?
            .into_iter()
            .flat_map(|data| data.events)
            .collect();
        events.sort_by(|left, right| left.time.total_cmp(&right.time));
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::{RoundTimerDecoder, SecondDecoder};
    use crate::vision::Detections;

    fn timer(time_left: u32) -> Vec<String> {
        vec![format!("{}:{:02}", time_left / 60, time_left % 60)]
    }

    #[test]
    fn action_and_spike_clocks_stay_in_the_round() {
        let mut detections = Detections::new();
        detections.insert(10, timer(30));
        detections.insert(11, timer(29));
        detections.insert(40, timer(100));
        detections.insert(41, timer(99));
        detections.insert(60, timer(45));
        detections.insert(90, timer(30));
        detections.insert(91, timer(29));
        let seconds: Vec<u32> = (8..92).collect();

        let decoded = RoundTimerDecoder.decode(&seconds, &detections);

        let round_at = |second: u32| decoded[(second - 8) as usize].round_number;
        assert_eq!(round_at(8), 0);
        assert_eq!(round_at(10), 1);
        assert_eq!(round_at(40), 1);
        assert_eq!(round_at(60), 1);
        assert_eq!(round_at(89), 1);
        assert_eq!(round_at(90), 2);
        assert_eq!(round_at(91), 2);
        assert_eq!(decoded[(12 - 8) as usize].round_time_left, None);
        assert_eq!(decoded[(41 - 8) as usize].round_time_left, Some(99));
    }

    #[test]
    fn early_round_end_opens_the_next_round() {
        let mut detections = Detections::new();
        detections.insert(0, timer(100));
        detections.insert(1, timer(99));
        detections.insert(2, timer(30));
        detections.insert(3, timer(29));

        let decoded = RoundTimerDecoder.decode(&[0, 1, 2, 3], &detections);

        let rounds: Vec<u32> = decoded.iter().map(|data| data.round_number).collect();
        assert_eq!(rounds, vec![1, 1, 2, 2]);
    }

    #[test]
    fn small_recognition_jitter_stays_in_the_round() {
        let mut detections = Detections::new();
        detections.insert(0, timer(50));
        detections.insert(1, timer(53));
        detections.insert(2, timer(48));

        let decoded = RoundTimerDecoder.decode(&[0, 1, 2], &detections);

        assert!(decoded.iter().all(|data| data.round_number == 1));
    }
}
