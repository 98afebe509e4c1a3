use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub(crate) const MIN_HIGHLIGHT_DURATION_SECONDS: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventName {
    FreezeEnd,
    RoundEnd,
    PlayerDeath,
    BombPlanted,
    BombDefused,
    BombExploded,
    Kill,
    Turret,
    Dragon,
    Baron,
    Inhibitor,
    SpikePlanted,
    GameEnd,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::FreezeEnd => "freeze_end",
            EventName::RoundEnd => "round_end",
            EventName::PlayerDeath => "player_death",
            EventName::BombPlanted => "bomb_planted",
            EventName::BombDefused => "bomb_defused",
            EventName::BombExploded => "bomb_exploded",
            EventName::Kill => "kill",
            EventName::Turret => "turret",
            EventName::Dragon => "dragon",
            EventName::Baron => "baron",
            EventName::Inhibitor => "inhibitor",
            EventName::SpikePlanted => "spike_planted",
            EventName::GameEnd => "game_end",
        }
    }

    /// Markers that delimit rounds rather than describe action.
    pub fn is_structural(&self) -> bool {
        matches!(self, EventName::FreezeEnd | EventName::RoundEnd)
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for EventName {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "freeze_end" | "round_freeze_end" => Ok(EventName::FreezeEnd),
            "round_end" => Ok(EventName::RoundEnd),
            "player_death" => Ok(EventName::PlayerDeath),
            "bomb_planted" => Ok(EventName::BombPlanted),
            "bomb_defused" => Ok(EventName::BombDefused),
            "bomb_exploded" => Ok(EventName::BombExploded),
            "kill" => Ok(EventName::Kill),
            "turret" => Ok(EventName::Turret),
            "dragon" => Ok(EventName::Dragon),
            "baron" => Ok(EventName::Baron),
            "inhibitor" => Ok(EventName::Inhibitor),
            "spike_planted" => Ok(EventName::SpikePlanted),
            "game_end" => Ok(EventName::GameEnd),
            other => Err(format!("Unknown event name '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum EventInfo {
    #[default]
    None,
    Number(i64),
    Text(String),
}

impl EventInfo {
    pub fn as_number(&self) -> Option<i64> {
        match self {
            EventInfo::Number(value) => Some(*value),
            EventInfo::Text(value) => value.trim().parse().ok(),
            EventInfo::None => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: EventName,
    pub time: f64,
    #[serde(default)]
    pub info: EventInfo,
}

impl Event {
    pub fn new(name: EventName, time: f64) -> Self {
        Self {
            name,
            time,
            info: EventInfo::None,
        }
    }

    pub fn with_info(name: EventName, time: f64, info: EventInfo) -> Self {
        Self { name, time, info }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundData {
    pub number: u32,
    pub end_time: f64,
    pub teams: Vec<i64>,
    pub alive: BTreeMap<i64, u32>,
    pub equipment_value: BTreeMap<i64, u64>,
    pub winner: Option<i64>,
    pub events: Vec<Event>,
}

impl RoundData {
    pub fn new(number: u32, end_time: f64) -> Self {
        Self {
            number,
            end_time,
            teams: Vec::new(),
            alive: BTreeMap::new(),
            equipment_value: BTreeMap::new(),
            winner: None,
            events: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Highlight {
    pub game_number: u32,
    pub start_time_seconds: f64,
    pub duration_seconds: f64,
    pub round_number: u32,
    pub value: u32,
    pub events: String,
}

impl Highlight {
    /// Durations shorter than five seconds are stretched to five.
    pub fn new(
        game_number: u32,
        start_time_seconds: f64,
        duration_seconds: f64,
        round_number: u32,
        value: u32,
        events: String,
    ) -> Self {
        Self {
            game_number,
            start_time_seconds,
            duration_seconds: duration_seconds.max(MIN_HIGHLIGHT_DURATION_SECONDS),
            round_number,
            value,
            events,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecondData {
    pub second: u32,
    pub round_time_left: Option<u32>,
    pub round_number: u32,
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameKind {
    CounterStrike,
    LeagueOfLegends,
    Valorant,
}

impl fmt::Display for GameKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GameKind::CounterStrike => "counter-strike",
            GameKind::LeagueOfLegends => "league-of-legends",
            GameKind::Valorant => "valorant",
        };
        formatter.write_str(label)
    }
}

/// One game of a match as tracked by the scheduling side. The flags and the
/// capture process id are owned and persisted outside the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRecord {
    pub game: GameKind,
    pub game_number: u32,
    pub recording: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replay: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tournament: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_1_round_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_2_round_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_start_offset: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics_image: Option<PathBuf>,
    #[serde(default)]
    pub finished: bool,
    #[serde(default)]
    pub highlighted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<u32>,
}

impl GameRecord {
    pub fn rounds_played(&self) -> Option<u32> {
        match (self.team_1_round_count, self.team_2_round_count) {
            (Some(team_1), Some(team_2)) => Some(team_1 + team_2),
            _ => None,
        }
    }

    pub fn label(&self) -> String {
        format!("game {} ({})", self.game_number, self.game)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    pub name: String,
    pub folder: PathBuf,
    #[serde(default)]
    pub finished: bool,
    #[serde(default)]
    pub games: Vec<GameRecord>,
}

impl MatchRecord {
    pub fn highlights_folder(&self) -> PathBuf {
        self.folder.join("highlights")
    }

    /// The published match video, `highlights/highlights.mp4`.
    pub fn match_video(&self) -> PathBuf {
        self.highlights_folder().join("highlights.mp4")
    }

    pub fn pending_games(&self) -> impl Iterator<Item = &GameRecord> {
        self.games
            .iter()
            .filter(|game| game.finished && !game.highlighted)
    }

    /// True while a finished, fully highlighted match has no published video.
    pub fn awaiting_publication(&self) -> bool {
        self.finished
            && !self.games.is_empty()
            && self.games.iter().all(|game| game.highlighted)
            && !self.match_video().is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::{Event, EventInfo, EventName, GameRecord, Highlight, MatchRecord};

    #[test]
    fn highlight_duration_is_never_below_five_seconds() {
        let highlight = Highlight::new(1, 120.0, 2.0, 4, 3, "2 player_death".to_string());
        assert_eq!(highlight.duration_seconds, 5.0);

        let highlight = Highlight::new(1, 120.0, 14.0, 4, 3, "2 player_death".to_string());
        assert_eq!(highlight.duration_seconds, 14.0);
    }

    #[test]
    fn event_names_parse_from_replay_vocabulary() {
        assert_eq!("round_freeze_end".parse::<EventName>(), Ok(EventName::FreezeEnd));
        assert_eq!("bomb_planted".parse::<EventName>(), Ok(EventName::BombPlanted));
        assert!("weapon_fire".parse::<EventName>().is_err());
    }

    #[test]
    fn event_info_accepts_numbers_text_and_null() {
        let events: Vec<Event> = serde_json::from_str(
            r#"[
                {"name": "round_end", "time": 10.0, "info": 2},
                {"name": "kill", "time": 11.0, "info": "s1mple"},
                {"name": "freeze_end", "time": 12.0}
            ]"#,
        )
        .expect("Expected events to deserialize");

        assert_eq!(events[0].info.as_number(), Some(2));
        assert_eq!(events[1].info, EventInfo::Text("s1mple".to_string()));
        assert_eq!(events[2].info, EventInfo::None);
    }

    #[test]
    fn pending_games_skip_unfinished_and_highlighted() {
        let manifest: MatchRecord = serde_json::from_str(
            r#"{
                "name": "navi-vs-faze",
                "folder": "/tmp/navi-vs-faze",
                "games": [
                    {"game": "COUNTER_STRIKE", "gameNumber": 1, "recording": "g1.mkv", "finished": true, "highlighted": true},
                    {"game": "COUNTER_STRIKE", "gameNumber": 2, "recording": "g2.mkv", "finished": true},
                    {"game": "COUNTER_STRIKE", "gameNumber": 3, "recording": "g3.mkv"}
                ]
            }"#,
        )
        .expect("Expected match manifest to deserialize");

        let pending: Vec<&GameRecord> = manifest.pending_games().collect();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].game_number, 2);
    }

    #[test]
    fn finished_match_awaits_publication_until_every_game_is_highlighted() {
        let mut manifest: MatchRecord = serde_json::from_str(
            r#"{
                "name": "vitality-vs-spirit",
                "folder": "/definitely/missing/vitality-vs-spirit",
                "finished": true,
                "games": [
                    {"game": "COUNTER_STRIKE", "gameNumber": 1, "recording": "g1.mkv", "finished": true, "highlighted": true},
                    {"game": "COUNTER_STRIKE", "gameNumber": 2, "recording": "g2.mkv", "finished": true}
                ]
            }"#,
        )
        .expect("Expected match manifest to deserialize");
        assert!(!manifest.awaiting_publication());

        manifest.games[1].highlighted = true;
        assert!(manifest.awaiting_publication());

        manifest.finished = false;
        assert!(!manifest.awaiting_publication());
    }
}
