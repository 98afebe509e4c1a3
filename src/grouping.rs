//! Splits a time-ordered event stream into candidate highlight windows.

use std::iter::Peekable;

use crate::model::{Event, EventName};

pub(crate) const MAX_EVENT_GAP_SECONDS: f64 = 20.0;

/// Lazy iterator over event groups.
///
/// A new group starts whenever the gap to the previous event exceeds
/// [`MAX_EVENT_GAP_SECONDS`]. Once the activating event has been seen, every
/// remaining event is held in the current group regardless of gaps.
pub struct EventGroups<I: Iterator<Item = Event>> {
    events: Peekable<I>,
    activating_event: Option<EventName>,
    activated: bool,
}

impl<I: Iterator<Item = Event>> EventGroups<I> {
    pub fn new(events: I, activating_event: Option<EventName>) -> Self {
        Self {
            events: events.peekable(),
            activating_event,
            activated: false,
        }
    }
}

impl<I: Iterator<Item = Event>> Iterator for EventGroups<I> {
    type Item = Vec<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.events.next()?;
        let mut previous_time = first.time;
        self.activated |= Some(first.name) == self.activating_event;
        let mut group = vec![first];

        while let Some(next_event) = self.events.peek() {
            if !self.activated && next_event.time - previous_time > MAX_EVENT_GAP_SECONDS {
                break;
            }

            let Some(event) = self.events.next() else {
                break;
            };
            previous_time = event.time;
            self.activated |= Some(event.name) == self.activating_event;
            group.push(event);
        }

        Some(group)
    }
}

pub fn group_events<I>(events: I, activating_event: Option<EventName>) -> EventGroups<I::IntoIter>
where
    I: IntoIterator<Item = Event>,
{
    EventGroups::new(events.into_iter(), activating_event)
}

#[cfg(test)]
mod tests {
    use super::group_events;
    use crate::model::{Event, EventName};

    fn deaths_at(times: &[f64]) -> Vec<Event> {
        times
            .iter()
            .map(|time| Event::new(EventName::PlayerDeath, *time))
            .collect()
    }

    fn group_times(groups: Vec<Vec<Event>>) -> Vec<Vec<f64>> {
        groups
            .into_iter()
            .map(|group| group.into_iter().map(|event| event.time).collect())
            .collect()
    }

    #[test]
    fn activating_event_holds_the_rest_of_the_sequence() {
        let mut events = deaths_at(&[0.0, 5.0, 30.0, 35.0, 40.0, 90.0, 150.0]);
        events[4].name = EventName::BombPlanted;

        let groups: Vec<Vec<Event>> =
            group_events(events, Some(EventName::BombPlanted)).collect();

        assert_eq!(
            group_times(groups),
            vec![vec![0.0, 5.0], vec![30.0, 35.0, 40.0, 90.0, 150.0]]
        );
    }

    #[test]
    fn gaps_of_exactly_twenty_seconds_stay_together() {
        let events = deaths_at(&[0.0, 20.0, 40.5, 41.0]);
        let groups: Vec<Vec<Event>> = group_events(events, None).collect();

        assert_eq!(group_times(groups), vec![vec![0.0, 20.0], vec![40.5, 41.0]]);
    }

    #[test]
    fn concatenated_groups_reproduce_the_input() {
        let mut events = deaths_at(&[3.0, 4.0, 50.0, 51.0, 52.0, 120.0, 121.0, 300.0, 301.0]);
        events[6].name = EventName::SpikePlanted;

        for activating_event in [None, Some(EventName::SpikePlanted), Some(EventName::BombPlanted)] {
            let flattened: Vec<Event> = group_events(events.clone(), activating_event)
                .flatten()
                .collect();
            assert_eq!(flattened, events);
        }
    }

    #[test]
    fn empty_input_yields_no_groups() {
        assert_eq!(group_events(Vec::new(), None).count(), 0);
    }
}
