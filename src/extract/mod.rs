//! Turns a recorded game into a time-ordered stream of events.

pub mod demo_parser;
pub mod replay;
pub mod round_timeline;
pub mod timeline;

use crate::error::Result;
use crate::model::Event;

pub use demo_parser::{ExternalDemoParser, ReplayParser};
pub use replay::ReplayExtractor;
pub use round_timeline::{ChunkedRoundExtractor, RoundTimerDecoder, SecondDecoder};
pub use timeline::TimerKillfeedExtractor;

/// Each implementation is built for one recording and yields its events
/// sorted ascending by time.
pub trait EventExtractor {
    fn extract_events(&self) -> Result<Vec<Event>>;
}
