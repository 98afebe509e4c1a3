//! Candidate highlights persisted next to each recording, plus the atomic
//! JSON writes shared with match manifests.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{HighlightError, Result};
use crate::model::{GameKind, Highlight, MatchRecord};

pub(crate) const HIGHLIGHT_SIDECAR_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightSidecar {
    pub schema_version: u32,
    pub recording_file: String,
    pub game: GameKind,
    pub game_number: u32,
    pub created_at: DateTime<Utc>,
    pub highlights: Vec<Highlight>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selected: Vec<Highlight>,
}

impl HighlightSidecar {
    pub fn new(recording_path: &Path, game: GameKind, game_number: u32, highlights: Vec<Highlight>) -> Self {
        let recording_file = recording_path
            .file_name()
            .map(|value| value.to_string_lossy().to_string())
            .unwrap_or_else(|| recording_path.to_string_lossy().to_string());

        Self {
            schema_version: HIGHLIGHT_SIDECAR_SCHEMA_VERSION,
            recording_file,
            game,
            game_number,
            created_at: Utc::now(),
            highlights,
            selected: Vec::new(),
        }
    }
}

pub(crate) fn highlight_sidecar_path(recording_path: &Path) -> PathBuf {
    recording_path.with_extension("highlights.json")
}

fn temporary_path(path: &Path) -> PathBuf {
    let Some(file_name) = path.file_name().and_then(|value| value.to_str()) else {
        return path.with_extension("json.tmp");
    };

    path.with_file_name(format!("{file_name}.tmp"))
}

/// `Ok(None)` when the file does not exist.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let raw_json = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(HighlightError::io(path, error)),
    };

    serde_json::from_str(&raw_json)
        .map(Some)
        .map_err(|source| HighlightError::Json {
            path: path.to_path_buf(),
            source,
        })
}

/// Writes through a temporary file so readers never see a partial document.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent_directory) = path.parent() {
        std::fs::create_dir_all(parent_directory)
            .map_err(|error| HighlightError::io(parent_directory, error))?;
    }

    let temp_path = temporary_path(path);
    let serialized = serde_json::to_string_pretty(value).map_err(|source| HighlightError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(&temp_path, serialized).map_err(|error| HighlightError::io(&temp_path, error))?;

    if let Err(error) = std::fs::rename(&temp_path, path) {
        if let Err(cleanup_error) = std::fs::remove_file(&temp_path) {
            tracing::warn!(
                temp_path = %temp_path.display(),
                "Failed to remove temporary file: {cleanup_error}"
            );
        }
        return Err(HighlightError::io(path, error));
    }

    Ok(())
}

pub fn read_highlight_sidecar(recording_path: &Path) -> Result<Option<HighlightSidecar>> {
    read_json(&highlight_sidecar_path(recording_path))
}

pub fn write_highlight_sidecar(recording_path: &Path, sidecar: &HighlightSidecar) -> Result<PathBuf> {
    let sidecar_path = highlight_sidecar_path(recording_path);
    write_json_atomic(&sidecar_path, sidecar)?;
    Ok(sidecar_path)
}

pub fn read_match_manifest(path: &Path) -> Result<MatchRecord> {
    read_json(path)?.ok_or_else(|| {
        HighlightError::io(
            path,
            std::io::Error::new(ErrorKind::NotFound, "match manifest does not exist"),
        )
    })
}

pub fn write_match_manifest(path: &Path, record: &MatchRecord) -> Result<()> {
    write_json_atomic(path, record)
}

#[cfg(test)]
mod tests {
    use super::{
        highlight_sidecar_path, read_highlight_sidecar, read_match_manifest,
        write_highlight_sidecar, write_match_manifest, HighlightSidecar,
    };
    use crate::error::HighlightError;
    use crate::model::{GameKind, Highlight, MatchRecord};
    use std::path::{Path, PathBuf};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_temp_directory() -> PathBuf {
        let timestamp_nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_nanos())
            .unwrap_or(0);
        let process_id = std::process::id();
        std::env::temp_dir().join(format!(
            "highlight_reel_sidecar_test_{process_id}_{timestamp_nanos}"
        ))
    }

    #[test]
    fn derives_sidecar_path_from_recording_path() {
        let sidecar_path = highlight_sidecar_path(Path::new("/matches/navi-faze/game_1.mp4"));
        assert_eq!(sidecar_path, Path::new("/matches/navi-faze/game_1.highlights.json"));
    }

    #[test]
    fn writes_and_reads_highlight_sidecar() {
        let temp_directory = unique_temp_directory();
        std::fs::create_dir_all(&temp_directory)
            .expect("Expected temporary sidecar test directory to be created");
        let recording_path = temp_directory.join("game_1.mp4");

        assert!(read_highlight_sidecar(&recording_path)
            .expect("Expected missing sidecar read to succeed")
            .is_none());

        let candidates = vec![Highlight::new(1, 120.0, 14.0, 3, 4, "4 player_death".to_string())];
        let sidecar = HighlightSidecar::new(&recording_path, GameKind::CounterStrike, 1, candidates);
        write_highlight_sidecar(&recording_path, &sidecar).expect("Expected sidecar write to succeed");

        let loaded = read_highlight_sidecar(&recording_path)
            .expect("Expected sidecar read to succeed")
            .expect("Expected sidecar to exist");
        assert_eq!(loaded.recording_file, "game_1.mp4");
        assert_eq!(loaded.highlights, sidecar.highlights);
        assert_eq!(loaded.created_at, sidecar.created_at);
        assert!(loaded.selected.is_empty());

        std::fs::remove_dir_all(&temp_directory)
            .expect("Expected temporary sidecar test directory to be removed");
    }

    #[test]
    fn match_manifest_round_trips_through_atomic_write() {
        let temp_directory = unique_temp_directory();
        let manifest_path = temp_directory.join("final.match.json");
        let record: MatchRecord = serde_json::from_str(
            r#"{"name": "final", "folder": "/m/final", "finished": true,
                "games": [{"game": "VALORANT", "gameNumber": 1, "recording": "/m/final/1.mp4", "finished": true}]}"#,
        )
        .expect("Expected match record to deserialize");

        write_match_manifest(&manifest_path, &record).expect("Expected manifest write to succeed");
        let loaded = read_match_manifest(&manifest_path).expect("Expected manifest read to succeed");

        assert_eq!(loaded.games.len(), 1);
        assert_eq!(loaded.games[0].game, GameKind::Valorant);
        assert!(!temp_directory.join("final.match.json.tmp").exists());

        std::fs::remove_dir_all(&temp_directory)
            .expect("Expected temporary sidecar test directory to be removed");
    }

    #[test]
    fn missing_manifest_is_an_io_error() {
        let result = read_match_manifest(Path::new("/definitely/missing.match.json"));
        assert!(matches!(result, Err(HighlightError::Io { .. })));
    }
}
