//! Picks which candidate highlights make the final video.
//!
//! Candidates are ranked by value per second. Rounds that shape the match
//! (the pistol rounds, the last regulation round and the final round) are
//! always represented; the remaining budget goes to the densest candidates.
//! Whenever a highlight is taken, the last highlight of its round comes with
//! it so every included round shows how it ended.

use std::collections::BTreeSet;

use crate::model::Highlight;

/// Every included clip costs its duration plus this in padding.
pub(crate) const CLIP_OVERHEAD_SECONDS: f64 = 7.0;
/// Short highlights are ranked as if they lasted this long.
pub(crate) const MIN_DENSITY_DURATION_SECONDS: f64 = 30.0;
pub(crate) const TARGET_SECONDS_PER_ROUND: f64 = 0.45 * 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundFormat {
    pub second_pistol_round: u32,
    pub regulation_rounds: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Sorted by start time.
    pub highlights: Vec<Highlight>,
    pub estimated_seconds: f64,
    pub target_seconds: f64,
}

pub(crate) fn density(highlight: &Highlight) -> f64 {
    f64::from(highlight.value) / highlight.duration_seconds.max(MIN_DENSITY_DURATION_SECONDS)
}

pub(crate) fn mandatory_rounds(rounds_played: u32, format: RoundFormat) -> Vec<u32> {
    let mut rounds = BTreeSet::from([1, format.second_pistol_round, rounds_played]);
    if rounds_played > format.regulation_rounds {
        rounds.insert(format.regulation_rounds);
    }
    rounds.into_iter().filter(|round| *round >= 1).collect()
}

struct SelectionState<'a> {
    ranked: Vec<&'a Highlight>,
    included: BTreeSet<usize>,
    estimated_seconds: f64,
}

impl<'a> SelectionState<'a> {
    fn include(&mut self, index: usize) {
        if self.included.insert(index) {
            self.estimated_seconds += self.ranked[index].duration_seconds + CLIP_OVERHEAD_SECONDS;
        }
    }

    /// Latest-starting highlight of the round; later rank wins ties.
    fn round_ending(&self, round_number: u32) -> Option<usize> {
        self.ranked
            .iter()
            .enumerate()
            .filter(|(_, highlight)| highlight.round_number == round_number)
            .max_by(|(_, left), (_, right)| {
                left.start_time_seconds.total_cmp(&right.start_time_seconds)
            })
            .map(|(index, _)| index)
    }

    fn include_with_round_ending(&mut self, index: usize) {
        self.include(index);
        if let Some(ending) = self.round_ending(self.ranked[index].round_number) {
            self.include(ending);
        }
    }

    fn into_selection(self, target_seconds: f64) -> Selection {
        let mut highlights: Vec<Highlight> = self
            .included
            .iter()
            .map(|index| self.ranked[*index].clone())
            .collect();
        highlights.sort_by(|left, right| left.start_time_seconds.total_cmp(&right.start_time_seconds));
        Selection {
            highlights,
            estimated_seconds: self.estimated_seconds,
            target_seconds,
        }
    }
}

pub fn select_highlights(candidates: &[Highlight], rounds_played: u32, format: RoundFormat) -> Selection {
    let target_seconds = f64::from(rounds_played) * TARGET_SECONDS_PER_ROUND;

    let mut ranked: Vec<&Highlight> = candidates.iter().collect();
    ranked.sort_by(|left, right| density(right).total_cmp(&density(left)));

    let mut state = SelectionState {
        ranked,
        included: BTreeSet::new(),
        estimated_seconds: 0.0,
    };

    for round_number in mandatory_rounds(rounds_played, format) {
        let best = state
            .ranked
            .iter()
            .position(|highlight| highlight.round_number == round_number);
        if let Some(best) = best {
            state.include_with_round_ending(best);
        }
    }

    for index in 0..state.ranked.len() {
        if state.estimated_seconds >= target_seconds {
            break;
        }
        state.include_with_round_ending(index);
    }

    tracing::debug!(
        candidates = candidates.len(),
        selected = state.included.len(),
        estimated_seconds = state.estimated_seconds,
        target_seconds,
        "Selected highlights"
    );
    state.into_selection(target_seconds)
}

/// Keeps every candidate, in start order.
pub fn select_all(candidates: &[Highlight]) -> Selection {
    let mut highlights = candidates.to_vec();
    highlights.sort_by(|left, right| left.start_time_seconds.total_cmp(&right.start_time_seconds));
    let estimated_seconds = highlights
        .iter()
        .map(|highlight| highlight.duration_seconds + CLIP_OVERHEAD_SECONDS)
        .sum();
    Selection {
        highlights,
        estimated_seconds,
        target_seconds: estimated_seconds,
    }
}
