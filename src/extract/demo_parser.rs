use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{HighlightError, Result};
use crate::model::EventInfo;

pub(crate) const TICK_RATE: f64 = 128.0;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReplayEvent {
    pub tick: i64,
    #[serde(default)]
    pub info: EventInfo,
}

impl ReplayEvent {
    /// Whole seconds since the replay started. Events within the same second
    /// share a timestamp.
    pub fn seconds(&self) -> f64 {
        (self.tick as f64 / TICK_RATE).floor()
    }
}

/// One participant at one tick, joined with the round it belongs to.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TickRow {
    pub tick: i64,
    pub round: u32,
    #[serde(alias = "team_num")]
    pub team: i64,
    pub name: String,
    #[serde(default, alias = "current_equip_value")]
    pub equipment_value: u64,
    #[serde(default)]
    pub health: i64,
}

pub trait ReplayParser {
    fn parse_events(&self, event_name: &str) -> Result<Vec<ReplayEvent>>;
    fn parse_ticks(&self) -> Result<Vec<TickRow>>;
}

/// Runs an external demo parser that prints JSON arrays on stdout:
/// `<command> events <demo> <event>` and `<command> ticks <demo>`.
pub struct ExternalDemoParser {
    command: String,
    demo_path: PathBuf,
}

impl ExternalDemoParser {
    pub fn new(command: impl Into<String>, demo_path: &Path) -> Result<Self> {
        if !demo_path.is_file() {
            return Err(HighlightError::ReplayParse {
                path: demo_path.to_path_buf(),
                reason: "replay file does not exist".to_string(),
            });
        }

        Ok(Self {
            command: command.into(),
            demo_path: demo_path.to_path_buf(),
        })
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new(&self.command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|error| self.parse_error(format!("failed to start '{}': {error}", self.command)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.parse_error(format!(
                "'{}' exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|error| self.parse_error(format!("parser output is not UTF-8: {error}")))
    }

    fn parse_error(&self, reason: String) -> HighlightError {
        HighlightError::ReplayParse {
            path: self.demo_path.clone(),
            reason,
        }
    }
}

impl ReplayParser for ExternalDemoParser {
    fn parse_events(&self, event_name: &str) -> Result<Vec<ReplayEvent>> {
        let demo = self.demo_path.to_string_lossy();
        let stdout = self.run(&["events", &demo, event_name])?;
        serde_json::from_str(&stdout).map_err(|error| {
            self.parse_error(format!("invalid '{event_name}' event output: {error}"))
        })
    }

    fn parse_ticks(&self) -> Result<Vec<TickRow>> {
        let demo = self.demo_path.to_string_lossy();
        let stdout = self.run(&["ticks", &demo])?;
        serde_json::from_str(&stdout)
            .map_err(|error| self.parse_error(format!("invalid tick output: {error}")))
    }
}
