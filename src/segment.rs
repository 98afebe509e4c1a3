//! Per-round segmentation of replay-driven games.
//!
//! Rounds are built from tick telemetry, receive the events that fall inside
//! their window, are repaired when the engine replayed a round, calibrated so
//! that t=0 is the first freeze-end, and finally stripped of round markers.

use std::collections::{BTreeMap, BTreeSet};

use crate::extract::demo_parser::{TickRow, TICK_RATE};
use crate::model::{Event, EventName, RoundData};

pub(crate) const ROUND_WINDOW_PADDING_SECONDS: f64 = 5.0;
pub(crate) const MIN_TEAM_PARTICIPANTS: usize = 10;

pub fn segment_rounds(ticks: &[TickRow], events: &[Event]) -> Vec<RoundData> {
    let mut rounds = build_rounds(ticks);
    assign_events(&mut rounds, events);
    correct_replayed_rounds(&mut rounds);
    calibrate_rounds(&mut rounds);
    clean_rounds(&mut rounds);
    rounds
}

/// Teams seen with fewer distinct participants than a full side rotation are
/// observers or casters.
fn playing_teams(ticks: &[TickRow]) -> BTreeSet<i64> {
    let mut participants: BTreeMap<i64, BTreeSet<&str>> = BTreeMap::new();
    for row in ticks {
        let name = row.name.trim();
        if name.is_empty() {
            continue;
        }
        participants.entry(row.team).or_default().insert(name);
    }

    participants
        .into_iter()
        .filter(|(_, names)| names.len() >= MIN_TEAM_PARTICIPANTS)
        .map(|(team, _)| team)
        .collect()
}

pub fn build_rounds(ticks: &[TickRow]) -> Vec<RoundData> {
    let teams = playing_teams(ticks);
    let mut rows_by_round: BTreeMap<u32, Vec<&TickRow>> = BTreeMap::new();
    for row in ticks {
        if row.round > 0 && teams.contains(&row.team) {
            rows_by_round.entry(row.round).or_default().push(row);
        }
    }

    rows_by_round
        .into_iter()
        .filter_map(|(number, rows)| {
            let end_tick = rows.iter().map(|row| row.tick).max()?;
            let mut round = RoundData::new(number, end_tick as f64 / TICK_RATE);

            let mut loadout_by_tick: BTreeMap<(i64, i64), u64> = BTreeMap::new();
            for row in &rows {
                *loadout_by_tick.entry((row.team, row.tick)).or_insert(0) +=
                    row.equipment_value;
                if row.tick == end_tick && row.health > 0 {
                    *round.alive.entry(row.team).or_insert(0) += 1;
                }
            }

            for ((team, _), value) in loadout_by_tick {
                let peak = round.equipment_value.entry(team).or_insert(0);
                *peak = (*peak).max(value);
            }

            round.teams = rows
                .iter()
                .map(|row| row.team)
                .collect::<BTreeSet<i64>>()
                .into_iter()
                .collect();
            for team in &round.teams {
                round.alive.entry(*team).or_insert(0);
            }

            Some(round)
        })
        .collect()
}

fn last_round_winner(events: &[Event]) -> Option<i64> {
    events
        .iter()
        .rev()
        .find(|event| event.name == EventName::RoundEnd)
        .and_then(|event| event.info.as_number())
}

/// Each round owns the events in `(previous end + 5, end + 5]`.
pub fn assign_events(rounds: &mut [RoundData], events: &[Event]) {
    let mut previous_end: Option<f64> = None;

    for round in rounds.iter_mut() {
        let lower_bound = previous_end.map(|end| end + ROUND_WINDOW_PADDING_SECONDS);
        let upper_bound = round.end_time + ROUND_WINDOW_PADDING_SECONDS;

        round.events = events
            .iter()
            .filter(|event| {
                lower_bound.map_or(true, |lower| event.time > lower) && event.time <= upper_bound
            })
            .cloned()
            .collect();
        round.winner = last_round_winner(&round.events);
        previous_end = Some(round.end_time);
    }
}

/// Locates the first complete freeze-end .. round-end sequence: the first
/// freeze-end, then the earliest round-end strictly after it.
fn first_complete_sequence(events: &[Event]) -> Option<(usize, usize)> {
    let freeze_index = events
        .iter()
        .position(|event| event.name == EventName::FreezeEnd)?;
    let freeze_time = events[freeze_index].time;

    let end_offset = events[freeze_index + 1..]
        .iter()
        .position(|event| event.name == EventName::RoundEnd && event.time > freeze_time)?;

    Some((freeze_index, freeze_index + 1 + end_offset))
}

fn count_events(events: &[Event], name: EventName) -> usize {
    events.iter().filter(|event| event.name == name).count()
}

/// When the engine replays a round, the first play-through lands in the
/// following round's window. That first sequence belongs to the previous round.
pub fn correct_replayed_rounds(rounds: &mut [RoundData]) {
    for index in 0..rounds.len() {
        let events = &rounds[index].events;
        let replayed = count_events(events, EventName::FreezeEnd) > 1
            && count_events(events, EventName::RoundEnd) > 1;
        if !replayed {
            continue;
        }

        if index == 0 {
            tracing::warn!(
                round = rounds[index].number,
                "First round contains a replayed sequence but has no previous round to receive it"
            );
            continue;
        }

        let Some((start, end)) = first_complete_sequence(events) else {
            continue;
        };

        let mut remaining = rounds[index].events.clone();
        let sequence: Vec<Event> = remaining.drain(start..=end).collect();
        let sequence_end = sequence[sequence.len() - 1].time;

        tracing::warn!(
            round = rounds[index].number,
            previous_round = rounds[index - 1].number,
            moved_events = sequence.len(),
            sequence_end,
            "Moving replayed round sequence to the previous round"
        );

        let previous = &mut rounds[index - 1];
        previous.winner = last_round_winner(&sequence);
        previous.end_time = sequence_end;
        previous.events = sequence;

        let current = &mut rounds[index];
        current.winner = last_round_winner(&remaining);
        current.events = remaining;
    }
}

pub fn calibrate_rounds(rounds: &mut [RoundData]) {
    let match_start = rounds
        .iter()
        .flat_map(|round| round.events.iter())
        .filter(|event| event.name == EventName::FreezeEnd)
        .map(|event| event.time)
        .fold(None, |earliest: Option<f64>, time| {
            Some(earliest.map_or(time, |value| value.min(time)))
        });

    let Some(match_start) = match_start else {
        tracing::warn!("No freeze-end event found, leaving round times uncalibrated");
        return;
    };

    for round in rounds.iter_mut() {
        round.end_time -= match_start;
        for event in &mut round.events {
            event.time -= match_start;
        }
    }
}

/// Strips round markers. A round ending with a plant immediately followed by
/// the explosion was saved by the defenders; the explosion is dropped.
pub fn clean_rounds(rounds: &mut [RoundData]) {
    for round in rounds.iter_mut() {
        round.events.retain(|event| !event.name.is_structural());

        let count = round.events.len();
        if count >= 2
            && round.events[count - 2].name == EventName::BombPlanted
            && round.events[count - 1].name == EventName::BombExploded
        {
            round.events.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        assign_events, build_rounds, calibrate_rounds, clean_rounds, correct_replayed_rounds,
        segment_rounds,
    };
    use crate::extract::demo_parser::TickRow;
    use crate::model::{Event, EventInfo, EventName, RoundData};

    fn round_end(time: f64, winner: i64) -> Event {
        Event::with_info(EventName::RoundEnd, time, EventInfo::Number(winner))
    }

    fn tick_rows(round: u32, end_tick: i64, team: i64, names: &[&str]) -> Vec<TickRow> {
        names
            .iter()
            .map(|name| TickRow {
                tick: end_tick,
                round,
                team,
                name: name.to_string(),
                equipment_value: 1000,
                health: 100,
            })
            .collect()
    }

    fn ten_names(prefix: &str) -> Vec<String> {
        (0..10).map(|index| format!("{prefix}{index}")).collect()
    }

    #[test]
    fn builds_rounds_only_for_playing_teams_and_positive_rounds() {
        let terrorists = ten_names("t");
        let terrorist_names: Vec<&str> = terrorists.iter().map(String::as_str).collect();
        let counter_terrorists = ten_names("ct");
        let counter_terrorist_names: Vec<&str> =
            counter_terrorists.iter().map(String::as_str).collect();

        let mut ticks = Vec::new();
        ticks.extend(tick_rows(0, 1_280, 2, &terrorist_names));
        ticks.extend(tick_rows(1, 12_800, 2, &terrorist_names));
        ticks.extend(tick_rows(1, 12_800, 3, &counter_terrorist_names));
        ticks.extend(tick_rows(1, 12_800, 1, &["caster"]));
        ticks.extend(tick_rows(2, 25_600, 3, &counter_terrorist_names));

        let rounds = build_rounds(&ticks);

        assert_eq!(rounds.len(), 2);
        assert_eq!(rounds[0].number, 1);
        assert_eq!(rounds[0].end_time, 100.0);
        assert_eq!(rounds[0].teams, vec![2, 3]);
        assert_eq!(rounds[0].alive.get(&2), Some(&10));
        assert_eq!(rounds[0].equipment_value.get(&3), Some(&10_000));
        assert_eq!(rounds[1].end_time, 200.0);
    }

    #[test]
    fn assigns_every_event_to_exactly_one_round_window() {
        let mut rounds = vec![
            RoundData::new(1, 100.0),
            RoundData::new(2, 200.0),
            RoundData::new(3, 300.0),
        ];

        // Eight events per round, including ones inside the five second tail.
        let times = [
            10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 90.0, 105.0, 105.5, 120.0, 130.0, 140.0, 150.0,
            160.0, 190.0, 204.0, 205.5, 220.0, 240.0, 250.0, 260.0, 270.0, 290.0, 305.0,
        ];
        let events: Vec<Event> = times
            .iter()
            .map(|time| Event::new(EventName::PlayerDeath, *time))
            .collect();
        assert_eq!(events.len(), 24);

        assign_events(&mut rounds, &events);

        assert_eq!(rounds.len(), 3);
        let assigned: usize = rounds.iter().map(|round| round.events.len()).sum();
        assert_eq!(assigned, 24);
        assert_eq!(rounds[0].events.len(), 8);
        assert_eq!(rounds[0].events.last().map(|event| event.time), Some(105.0));
        assert_eq!(rounds[1].events.first().map(|event| event.time), Some(105.5));
        assert_eq!(rounds[1].events.last().map(|event| event.time), Some(204.0));
        assert_eq!(rounds[2].events.first().map(|event| event.time), Some(205.5));
        assert_eq!(rounds[2].events.last().map(|event| event.time), Some(305.0));
    }

    #[test]
    fn winner_comes_from_last_round_end_in_window() {
        let mut rounds = vec![RoundData::new(1, 100.0), RoundData::new(2, 200.0)];
        let events = vec![
            Event::new(EventName::FreezeEnd, 10.0),
            round_end(98.0, 3),
            Event::new(EventName::FreezeEnd, 115.0),
        ];

        assign_events(&mut rounds, &events);

        assert_eq!(rounds[0].winner, Some(3));
        assert_eq!(rounds[1].winner, None);
    }

    #[test]
    fn replayed_round_moves_first_sequence_to_previous_round() {
        let first_sequence = vec![
            Event::new(EventName::FreezeEnd, 100.0),
            Event::new(EventName::PlayerDeath, 140.0),
            round_end(160.0, 2),
        ];
        let second_sequence = vec![Event::new(EventName::FreezeEnd, 165.0), round_end(180.0, 1)];

        let mut previous = RoundData::new(4, 95.0);
        previous.events = vec![Event::new(EventName::FreezeEnd, 20.0), round_end(95.0, 1)];
        let mut current = RoundData::new(5, 180.0);
        current.events = first_sequence.iter().chain(&second_sequence).cloned().collect();
        let mut rounds = vec![previous, current];

        correct_replayed_rounds(&mut rounds);

        assert_eq!(rounds[0].events, first_sequence);
        assert_eq!(rounds[0].end_time, 160.0);
        assert_eq!(rounds[0].winner, Some(2));
        assert_eq!(rounds[1].events, second_sequence);
        assert_eq!(rounds[1].winner, Some(1));
    }

    #[test]
    fn correction_is_a_no_op_without_duplicate_markers() {
        let mut first = RoundData::new(1, 60.0);
        first.events = vec![
            Event::new(EventName::FreezeEnd, 15.0),
            Event::new(EventName::PlayerDeath, 30.0),
            round_end(60.0, 2),
        ];
        let mut second = RoundData::new(2, 130.0);
        second.events = vec![Event::new(EventName::FreezeEnd, 80.0), round_end(130.0, 3)];
        let mut rounds = vec![first, second];
        let before = rounds.clone();

        correct_replayed_rounds(&mut rounds);

        assert_eq!(rounds, before);
    }

    #[test]
    fn calibration_moves_first_freeze_end_to_zero() {
        let mut first = RoundData::new(1, 160.0);
        first.events = vec![
            Event::new(EventName::FreezeEnd, 40.0),
            Event::new(EventName::PlayerDeath, 70.0),
        ];
        let mut second = RoundData::new(2, 260.0);
        second.events = vec![Event::new(EventName::FreezeEnd, 180.0)];
        let mut rounds = vec![first, second];

        calibrate_rounds(&mut rounds);

        assert_eq!(rounds[0].events[0].time, 0.0);
        assert_eq!(rounds[0].events[1].time, 30.0);
        assert_eq!(rounds[0].end_time, 120.0);
        assert_eq!(rounds[1].events[0].time, 140.0);
        assert_eq!(rounds[1].end_time, 220.0);
    }

    #[test]
    fn cleanup_strips_markers_and_saved_bomb_explosions() {
        let mut saved = RoundData::new(1, 100.0);
        saved.events = vec![
            Event::new(EventName::FreezeEnd, 0.0),
            Event::new(EventName::PlayerDeath, 30.0),
            Event::new(EventName::BombPlanted, 60.0),
            round_end(95.0, 2),
            Event::new(EventName::BombExploded, 100.0),
        ];
        let mut retake = RoundData::new(2, 200.0);
        retake.events = vec![
            Event::new(EventName::BombPlanted, 150.0),
            Event::new(EventName::PlayerDeath, 160.0),
            Event::new(EventName::BombExploded, 190.0),
        ];
        let mut rounds = vec![saved, retake];

        clean_rounds(&mut rounds);

        let saved_names: Vec<EventName> = rounds[0].events.iter().map(|event| event.name).collect();
        assert_eq!(saved_names, vec![EventName::PlayerDeath, EventName::BombPlanted]);
        assert_eq!(rounds[1].events.len(), 3);
    }

    #[test]
    fn segments_telemetry_and_events_end_to_end() {
        let terrorists = ten_names("t");
        let terrorist_names: Vec<&str> = terrorists.iter().map(String::as_str).collect();
        let counter_terrorists = ten_names("ct");
        let counter_terrorist_names: Vec<&str> =
            counter_terrorists.iter().map(String::as_str).collect();

        let mut ticks = Vec::new();
        for (round, end_tick) in [(1, 12_800), (2, 25_600)] {
            ticks.extend(tick_rows(round, end_tick, 2, &terrorist_names));
            ticks.extend(tick_rows(round, end_tick, 3, &counter_terrorist_names));
        }

        let events = vec![
            Event::new(EventName::FreezeEnd, 20.0),
            Event::new(EventName::PlayerDeath, 45.0),
            round_end(99.0, 2),
            Event::new(EventName::FreezeEnd, 120.0),
            Event::new(EventName::BombPlanted, 170.0),
            round_end(198.0, 2),
            Event::new(EventName::BombExploded, 199.0),
        ];

        let rounds = segment_rounds(&ticks, &events);

        assert_eq!(rounds.len(), 2);
        assert_eq!(rounds[0].end_time, 80.0);
        assert_eq!(rounds[0].events, vec![Event::new(EventName::PlayerDeath, 25.0)]);
        assert_eq!(rounds[1].events, vec![Event::new(EventName::BombPlanted, 150.0)]);
        assert_eq!(rounds[1].winner, Some(2));
    }
}
