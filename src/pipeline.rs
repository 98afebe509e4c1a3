//! Game-agnostic orchestration. Only the extractor, scorer, selection rule
//! and clip timing vary with the game.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::assembly::concat::cleanup_workspace;
use crate::assembly::{ClipTiming, MediaTools, VideoAssembler};
use crate::error::{HighlightError, Result, Severity};
use crate::extract::{
    ChunkedRoundExtractor, EventExtractor, ExternalDemoParser, ReplayExtractor, RoundTimerDecoder,
    TimerKillfeedExtractor,
};
use crate::model::{EventName, GameKind, GameRecord, Highlight, MatchRecord};
use crate::scoring::{
    combine_seconds, round_candidates, timeline_candidates, RoundContextScorer, WeightTable,
};
use crate::selection::{mandatory_rounds, select_all, select_highlights, RoundFormat, Selection};
use crate::settings::PipelineSettings;
use crate::sidecar::{write_highlight_sidecar, HighlightSidecar};
use crate::vision::{load_templates, PaddleOcr};

const ROUND_BASED_FORMAT: RoundFormat = RoundFormat {
    second_pistol_round: 13,
    regulation_rounds: 24,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OffsetSource {
    /// Supplied with the game record; event times are match time.
    GameRecord,
    /// Event times are already recording seconds.
    Frames,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GameStrategy {
    pub kind: GameKind,
    pub activating_event: Option<EventName>,
    pub timing: ClipTiming,
    /// `None` keeps every candidate.
    pub format: Option<RoundFormat>,
    pub offset: OffsetSource,
}

impl GameStrategy {
    pub fn for_kind(kind: GameKind) -> Self {
        match kind {
            GameKind::CounterStrike => Self {
                kind,
                activating_event: Some(EventName::BombPlanted),
                timing: ClipTiming {
                    lead_seconds: 3.0,
                    trail_seconds: 6.0,
                },
                format: Some(ROUND_BASED_FORMAT),
                offset: OffsetSource::GameRecord,
            },
            GameKind::LeagueOfLegends => Self {
                kind,
                activating_event: None,
                timing: ClipTiming {
                    lead_seconds: 8.0,
                    trail_seconds: 13.0,
                },
                format: None,
                offset: OffsetSource::Frames,
            },
            GameKind::Valorant => Self {
                kind,
                activating_event: Some(EventName::SpikePlanted),
                timing: ClipTiming {
                    lead_seconds: 3.0,
                    trail_seconds: 6.0,
                },
                format: Some(ROUND_BASED_FORMAT),
                offset: OffsetSource::Frames,
            },
        }
    }

    /// Seconds into the recording at which event time 0 happens.
    pub fn recording_offset(&self, game: &GameRecord) -> Result<f64> {
        match self.offset {
            OffsetSource::Frames => Ok(0.0),
            OffsetSource::GameRecord => game.game_start_offset.ok_or_else(|| {
                HighlightError::MalformedGameData(format!("{} has no game start offset", game.label()))
            }),
        }
    }

    /// Rounds played according to the post-game data, for round-based games.
    pub fn rounds_played(&self, game: &GameRecord) -> Result<Option<u32>> {
        if self.format.is_none() {
            return Ok(None);
        }
        match game.rounds_played() {
            Some(0) => Err(HighlightError::MalformedGameData(format!(
                "{} has no rounds played",
                game.label()
            ))),
            Some(rounds_played) => Ok(Some(rounds_played)),
            None => Err(HighlightError::MalformedGameData(format!(
                "{} has no round counts",
                game.label()
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameOutcome {
    pub game_number: u32,
    pub candidates: usize,
    pub selection: Selection,
    pub video: PathBuf,
    pub sidecar: PathBuf,
}

#[derive(Debug, Default)]
pub struct MatchReport {
    pub processed: Vec<GameOutcome>,
    pub failed: Vec<(u32, HighlightError)>,
    pub published: Option<PathBuf>,
    /// Set when combining the match video was attempted and failed.
    pub publish_error: Option<HighlightError>,
}

pub(crate) fn game_video_path(record: &MatchRecord, game_number: u32) -> PathBuf {
    record
        .highlights_folder()
        .join(format!("game_{game_number}_highlights.mkv"))
}

fn game_workspace(record: &MatchRecord, game_number: u32) -> PathBuf {
    record.folder.join("work").join(format!("game_{game_number}"))
}

pub struct HighlightPipeline {
    settings: PipelineSettings,
    media: MediaTools,
}

impl HighlightPipeline {
    pub fn new(settings: PipelineSettings) -> Self {
        let media = MediaTools::resolve(&settings);
        tracing::debug!(ffmpeg = %media.ffmpeg_path().display(), "Resolved media tools");
        Self { settings, media }
    }

    /// Runs every stage for one finished game. Blocks until the game video
    /// exists or a stage fails.
    pub fn process_game(&self, record: &MatchRecord, game: &GameRecord) -> Result<GameOutcome> {
        if !game.recording.is_file() {
            return Err(HighlightError::RecordingMissing(game.recording.clone()));
        }
        tracing::info!(
            game = game.game_number,
            kind = %game.game,
            recording = %game.recording.display(),
            "Processing game"
        );

        let workspace = game_workspace(record, game.game_number);
        let result = self.run_stages(record, game, &workspace);
        cleanup_workspace(&workspace);
        result
    }

    fn run_stages(&self, record: &MatchRecord, game: &GameRecord, workspace: &Path) -> Result<GameOutcome> {
        let strategy = GameStrategy::for_kind(game.game);
        // Post-game data is checked before any extraction work.
        let offset = strategy.recording_offset(game)?;
        let rounds_played = strategy.rounds_played(game)?;

        let candidates = self.candidate_highlights(&strategy, game, rounds_played, workspace)?;
        if candidates.is_empty() {
            return Err(HighlightError::NoHighlights(game.label()));
        }

        let mut sidecar =
            HighlightSidecar::new(&game.recording, game.game, game.game_number, candidates.clone());
        write_highlight_sidecar(&game.recording, &sidecar)?;

        let selection = match (strategy.format, rounds_played) {
            (Some(format), Some(rounds_played)) => select_highlights(&candidates, rounds_played, format),
            _ => select_all(&candidates),
        };
        tracing::info!(
            game = game.game_number,
            candidates = candidates.len(),
            highlights = selection.highlights.len(),
            estimated_seconds = selection.estimated_seconds,
            "Selected highlights"
        );

        sidecar.selected = selection.highlights.clone();
        let sidecar_path = write_highlight_sidecar(&game.recording, &sidecar)?;

        let video = game_video_path(record, game.game_number);
        if let Some(parent) = video.parent() {
            std::fs::create_dir_all(parent).map_err(|error| HighlightError::io(parent, error))?;
        }
        VideoAssembler::new(&self.media).assemble_game(
            &game.recording,
            &selection.highlights,
            offset,
            strategy.timing,
            game.statistics_image.as_deref(),
            &workspace.join("clips"),
            &video,
        )?;
        tracing::info!(game = game.game_number, video = %video.display(), "Game highlights assembled");

        Ok(GameOutcome {
            game_number: game.game_number,
            candidates: candidates.len(),
            selection,
            video,
            sidecar: sidecar_path,
        })
    }

    fn candidate_highlights(
        &self,
        strategy: &GameStrategy,
        game: &GameRecord,
        rounds_played: Option<u32>,
        workspace: &Path,
    ) -> Result<Vec<Highlight>> {
        let weights = WeightTable::with_overrides(&self.settings.weights);
        let regions = self.settings.regions_for(game.tournament.as_deref());

        match strategy.kind {
            GameKind::CounterStrike => {
                let replay = game.replay.as_deref().ok_or_else(|| {
                    HighlightError::MalformedGameData(format!("{} has no replay file", game.label()))
                })?;
                let parser = ExternalDemoParser::new(self.settings.demo_parser_command.clone(), replay)?;
                let rounds = ReplayExtractor::new(parser).extract_rounds()?;

                let decisive_rounds: BTreeSet<u32> = match (strategy.format, rounds_played) {
                    (Some(format), Some(rounds_played)) => {
                        mandatory_rounds(rounds_played, format).into_iter().collect()
                    }
                    _ => BTreeSet::new(),
                };
                let scorer = RoundContextScorer::new(
                    weights,
                    self.settings.round_weight,
                    self.settings.density_weight,
                    decisive_rounds,
                );

                Ok(round_candidates(
                    &rounds,
                    strategy.activating_event,
                    game.game_number,
                    &scorer,
                ))
            }
            GameKind::LeagueOfLegends => {
                let templates = load_templates(&self.settings.templates_dir)?;
                let extractor = TimerKillfeedExtractor::new(
                    &self.media,
                    &game.recording,
                    regions,
                    templates,
                    PaddleOcr::new(self.settings.ocr_command.clone()),
                    &workspace.join("frames"),
                );
                let events = extractor.extract_events()?;

                Ok(timeline_candidates(events, game.game_number, &weights))
            }
            GameKind::Valorant => {
                let extractor = ChunkedRoundExtractor::new(
                    &self.media,
                    &game.recording,
                    regions.timer,
                    self.settings.chunk_seconds,
                    PaddleOcr::new(self.settings.ocr_command.clone()),
                    RoundTimerDecoder,
                    &workspace.join("frames"),
                );
                let seconds = extractor.extract_seconds()?;

                Ok(combine_seconds(
                    &seconds,
                    strategy.activating_event,
                    game.game_number,
                    &weights,
                ))
            }
        }
    }

    /// Concatenates the per-game videos of a finished match, in game order.
    pub fn finish_match(&self, record: &MatchRecord) -> Result<PathBuf> {
        if !record.finished {
            return Err(HighlightError::MalformedGameData(format!(
                "match '{}' is not finished",
                record.name
            )));
        }

        let mut games: Vec<&GameRecord> = record.games.iter().collect();
        games.sort_by_key(|game| game.game_number);
        let videos: Vec<PathBuf> = games
            .iter()
            .map(|game| game_video_path(record, game.game_number))
            .collect();

        VideoAssembler::new(&self.media).combine_games(&videos, &record.highlights_folder())
    }

    /// Processes pending games and marks them highlighted. Publishes the match
    /// video once every game of a finished match is done and no video exists yet.
    pub fn run_match(&self, record: &mut MatchRecord, only_game: Option<u32>) -> MatchReport {
        let mut report = MatchReport::default();
        let pending: Vec<GameRecord> = record
            .pending_games()
            .filter(|game| only_game.map_or(true, |number| game.game_number == number))
            .cloned()
            .collect();

        for game in pending {
            match self.process_game(record, &game) {
                Ok(outcome) => {
                    if let Some(stored) = record
                        .games
                        .iter_mut()
                        .find(|stored| stored.game_number == game.game_number)
                    {
                        stored.highlighted = true;
                    }
                    report.processed.push(outcome);
                }
                Err(error) => {
                    log_failure(&game, &error);
                    report.failed.push((game.game_number, error));
                }
            }
        }

        // Retried on every pass until the match video exists.
        if record.awaiting_publication() {
            match self.finish_match(record) {
                Ok(published) => report.published = Some(published),
                Err(error) => {
                    tracing::error!(
                        match_name = %record.name,
                        "Failed to combine match highlights: {error}"
                    );
                    report.publish_error = Some(error);
                }
            }
        }

        report
    }
}

fn log_failure(game: &GameRecord, error: &HighlightError) {
    match error.severity() {
        Severity::RetryLater => tracing::warn!(
            game = game.game_number,
            kind = %game.game,
            "Game not ready for highlights, will retry: {error}"
        ),
        Severity::Fatal => tracing::error!(
            game = game.game_number,
            kind = %game.game,
            "Highlight processing failed: {error}"
        ),
    }
}
