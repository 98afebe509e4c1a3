//! Turns finished esports match recordings into highlight videos.
//!
//! Stages run in order: extract events, segment rounds (replay-driven games
//! only), group events, score and select, then assemble the video.

pub mod assembly;
pub mod error;
pub mod extract;
pub mod grouping;
pub mod model;
pub mod pipeline;
pub mod scoring;
pub mod segment;
pub mod selection;
pub mod settings;
pub mod sidecar;
pub mod vision;
pub mod watch;

pub use error::{HighlightError, Result, Severity};
pub use model::{Event, EventInfo, EventName, GameKind, GameRecord, Highlight, MatchRecord, RoundData, SecondData};
pub use pipeline::{GameOutcome, GameStrategy, HighlightPipeline, MatchReport};
pub use settings::PipelineSettings;
