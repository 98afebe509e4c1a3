use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The source artifacts are intact; the next scheduled poll can retry.
    RetryLater,
    /// Needs operator attention before the game can be processed.
    Fatal,
}

#[derive(Debug, Error)]
pub enum HighlightError {
    #[error("Recording not found: {0}")]
    RecordingMissing(PathBuf),

    #[error("No frames could be decoded from '{0}'")]
    NoFrames(PathBuf),

    #[error("Failed to parse replay '{path}': {reason}")]
    ReplayParse { path: PathBuf, reason: String },

    #[error("Post-game data is malformed: {0}")]
    MalformedGameData(String),

    #[error("Could not locate the game start in '{0}'")]
    GameStartNotFound(PathBuf),

    #[error("{tool} failed: {reason}")]
    ExternalTool { tool: &'static str, reason: String },

    #[error("No highlights were found for {0}")]
    NoHighlights(String),

    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in '{path}': {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl HighlightError {
    pub fn severity(&self) -> Severity {
        match self {
            HighlightError::MalformedGameData(_) | HighlightError::NoHighlights(_) => {
                Severity::RetryLater
            }
            HighlightError::RecordingMissing(_)
            | HighlightError::NoFrames(_)
            | HighlightError::ReplayParse { .. }
            | HighlightError::GameStartNotFound(_)
            | HighlightError::ExternalTool { .. }
            | HighlightError::Io { .. }
            | HighlightError::Json { .. } => Severity::Fatal,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HighlightError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn tool(tool: &'static str, reason: impl Into<String>) -> Self {
        HighlightError::ExternalTool {
            tool,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HighlightError>;

#[cfg(test)]
mod tests {
    use super::{HighlightError, Severity};
    use std::path::PathBuf;

    #[test]
    fn malformed_game_data_is_retried_on_next_poll() {
        let error = HighlightError::MalformedGameData("empty round list".to_string());
        assert_eq!(error.severity(), Severity::RetryLater);
    }

    #[test]
    fn missing_recording_needs_operator_attention() {
        let error = HighlightError::RecordingMissing(PathBuf::from("/vods/game_1.mkv"));
        assert_eq!(error.severity(), Severity::Fatal);
        assert_eq!(error.to_string(), "Recording not found: /vods/game_1.mkv");
    }
}
