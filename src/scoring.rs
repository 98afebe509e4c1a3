//! Turns event groups into scored highlights.

use std::collections::{BTreeMap, BTreeSet};

use crate::grouping::group_events;
use crate::model::{Event, EventName, Highlight, RoundData, SecondData};

pub(crate) const DEFAULT_EVENT_WEIGHT: u32 = 1;
pub(crate) const GAME_END_WEIGHT: u32 = 100;

pub trait ScoringStrategy {
    fn score(&self, events: &[Event], round: Option<&RoundData>) -> u32;
}

/// Sums a per-event weight. Unlisted events weigh one.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightTable {
    weights: BTreeMap<EventName, u32>,
}

impl Default for WeightTable {
    fn default() -> Self {
        Self {
            weights: BTreeMap::from([(EventName::GameEnd, GAME_END_WEIGHT)]),
        }
    }
}

impl WeightTable {
    pub fn with_overrides(overrides: &BTreeMap<EventName, u32>) -> Self {
        let mut table = Self::default();
        table.weights.extend(overrides.iter().map(|(name, weight)| (*name, *weight)));
        table
    }

    pub fn weight(&self, name: EventName) -> u32 {
        self.weights.get(&name).copied().unwrap_or(DEFAULT_EVENT_WEIGHT)
    }
}

impl ScoringStrategy for WeightTable {
    fn score(&self, events: &[Event], _round: Option<&RoundData>) -> u32 {
        events
            .iter()
            .map(|event| self.weight(event.name))
            .fold(0u32, u32::saturating_add)
    }
}

/// Weight table plus bonuses for decisive rounds and for events per minute.
#[derive(Debug, Clone)]
pub struct RoundContextScorer {
    table: WeightTable,
    round_weight: u32,
    density_weight: u32,
    decisive_rounds: BTreeSet<u32>,
}

impl RoundContextScorer {
    pub fn new(
        table: WeightTable,
        round_weight: u32,
        density_weight: u32,
        decisive_rounds: BTreeSet<u32>,
    ) -> Self {
        Self {
            table,
            round_weight,
            density_weight,
            decisive_rounds,
        }
    }
}

impl ScoringStrategy for RoundContextScorer {
    fn score(&self, events: &[Event], round: Option<&RoundData>) -> u32 {
        let mut score = self.table.score(events, round);

        if round.is_some_and(|round| self.decisive_rounds.contains(&round.number)) {
            score = score.saturating_add(self.round_weight);
        }

        if self.density_weight > 0 {
            if let (Some(first), Some(last)) = (events.first(), events.last()) {
                let minutes = ((last.time - first.time) / 60.0).max(1.0 / 12.0);
                let per_minute = (events.len() as f64 / minutes).round() as u32;
                score = score.saturating_add(self.density_weight.saturating_mul(per_minute));
            }
        }

        score
    }
}

/// `"<count> <event>"` per distinct event name, comma separated.
pub fn summarize_events(events: &[Event]) -> String {
    let mut counts: BTreeMap<EventName, usize> = BTreeMap::new();
    for event in events {
        *counts.entry(event.name).or_default() += 1;
    }
    counts
        .iter()
        .map(|(name, count)| format!("{count} {name}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// One highlight per group, starting at its first event and lasting until
/// its last one.
pub fn build_highlights<G>(
    groups: G,
    game_number: u32,
    round_number: u32,
    round: Option<&RoundData>,
    scorer: &dyn ScoringStrategy,
) -> Vec<Highlight>
where
    G: IntoIterator<Item = Vec<Event>>,
{
    groups
        .into_iter()
        .filter_map(|group| {
            let first = group.first()?;
            let last = group.last()?;
            Some(Highlight::new(
                game_number,
                first.time,
                last.time - first.time,
                round_number,
                scorer.score(&group, round),
                summarize_events(&group),
            ))
        })
        .collect()
}

/// Candidates for games split into rounds from a replay. Round markers are
/// not action and are left out of groups.
pub fn round_candidates(
    rounds: &[RoundData],
    activating_event: Option<EventName>,
    game_number: u32,
    scorer: &dyn ScoringStrategy,
) -> Vec<Highlight> {
    rounds
        .iter()
        .flat_map(|round| {
            let action = round
                .events
                .iter()
                .filter(|event| !event.name.is_structural())
                .cloned();
            build_highlights(
                group_events(action, activating_event),
                game_number,
                round.number,
                Some(round),
                scorer,
            )
        })
        .collect()
}

/// Candidates for games without rounds; everything counts as round one.
pub fn timeline_candidates(
    events: Vec<Event>,
    game_number: u32,
    scorer: &dyn ScoringStrategy,
) -> Vec<Highlight> {
    build_highlights(group_events(events, None), game_number, 1, None, scorer)
}

/// Regroups per-second state by round and builds candidates for each round.
/// Seconds before the first round are ignored.
pub fn combine_seconds(
    seconds: &[SecondData],
    activating_event: Option<EventName>,
    game_number: u32,
    scorer: &dyn ScoringStrategy,
) -> Vec<Highlight> {
    let mut per_round: BTreeMap<u32, RoundData> = BTreeMap::new();
    for data in seconds.iter().filter(|data| data.round_number > 0) {
        let round = per_round
            .entry(data.round_number)
            .or_insert_with(|| RoundData::new(data.round_number, f64::from(data.second)));
        round.end_time = round.end_time.max(f64::from(data.second));
        round.events.extend(data.events.iter().cloned());
    }

    let mut rounds: Vec<RoundData> = per_round.into_values().collect();
    for round in &mut rounds {
        round
            .events
            .sort_by(|left, right| left.time.total_cmp(&right.time));
    }
    round_candidates(&rounds, activating_event, game_number, scorer)
}
