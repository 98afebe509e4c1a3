use std::collections::BTreeMap;

use super::demo_parser::ReplayParser;
use super::EventExtractor;
use crate::error::{HighlightError, Result};
use crate::model::{Event, EventName, RoundData};
use crate::segment::segment_rounds;

/// Replay event names read from the demo, in the vocabulary they map to.
pub(crate) const REPLAY_EVENTS: [(&str, EventName); 6] = [
    ("round_freeze_end", EventName::FreezeEnd),
    ("round_end", EventName::RoundEnd),
    ("player_death", EventName::PlayerDeath),
    ("bomb_planted", EventName::BombPlanted),
    ("bomb_defused", EventName::BombDefused),
    ("bomb_exploded", EventName::BombExploded),
];

/// This many events sharing one second means a technical pause replayed state.
pub(crate) const TECHNICAL_PAUSE_EVENT_COUNT: usize = 8;

pub struct ReplayExtractor<P: ReplayParser> {
    parser: P,
}

impl<P: ReplayParser> ReplayExtractor<P> {
    pub fn new(parser: P) -> Self {
        Self { parser }
    }

    /// Events joined with per-tick participant state and split into rounds.
    pub fn extract_rounds(&self) -> Result<Vec<RoundData>> {
        let events = self.extract_events()?;
        let ticks = self.parser.parse_ticks()?;
        if ticks.is_empty() {
            return Err(HighlightError::MalformedGameData(
                "replay contains no participant ticks".to_string(),
            ));
        }

        let rounds = segment_rounds(&ticks, &events);
        if rounds.is_empty() {
            return Err(HighlightError::MalformedGameData(
                "replay contains no rounds".to_string(),
            ));
        }

        tracing::info!(
            rounds = rounds.len(),
            events = events.len(),
            "Segmented replay into rounds"
        );
        Ok(rounds)
    }
}

impl<P: ReplayParser> EventExtractor for ReplayExtractor<P> {
    fn extract_events(&self) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        for (replay_name, name) in REPLAY_EVENTS {
            let parsed = self.parser.parse_events(replay_name)?;
            tracing::debug!(event = replay_name, count = parsed.len(), "Parsed replay events");
            events.extend(
                parsed
                    .into_iter()
                    .map(|event| Event::with_info(name, event.seconds(), event.info)),
            );
        }

        let mut events = remove_technical_pauses(events);
        events.sort_by(|left, right| left.time.total_cmp(&right.time));
        Ok(events)
    }
}

/// Drops every event at a timestamp shared by at least
/// [`TECHNICAL_PAUSE_EVENT_COUNT`] events.
pub(crate) fn remove_technical_pauses(events: Vec<Event>) -> Vec<Event> {
    let mut per_timestamp: BTreeMap<u64, usize> = BTreeMap::new();
    for event in &events {
        *per_timestamp.entry(event.time.to_bits()).or_default() += 1;
    }

    for (time_bits, count) in &per_timestamp {
        if *count >= TECHNICAL_PAUSE_EVENT_COUNT {
            tracing::warn!(
                time = f64::from_bits(*time_bits),
                count,
                "Dropping events recorded during a technical pause"
            );
        }
    }

    events
        .into_iter()
        .filter(|event| {
            per_timestamp
                .get(&event.time.to_bits())
                .is_some_and(|count| *count < TECHNICAL_PAUSE_EVENT_COUNT)
        })
        .collect()
}
