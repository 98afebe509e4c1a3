//! Watches a directory of match manifests and runs the pipeline for every
//! manifest that has finished, unprocessed games.

use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::{HighlightError, Result};
use crate::pipeline::{HighlightPipeline, MatchReport};
use crate::sidecar::{read_match_manifest, write_match_manifest};

pub(crate) const MANIFEST_SUFFIX: &str = ".match.json";
/// Lets the writer finish before the manifest is read.
pub(crate) const SETTLE_DELAY: Duration = Duration::from_millis(500);

pub(crate) fn is_manifest_path(path: &Path) -> bool {
    path.file_name()
        .and_then(|file_name| file_name.to_str())
        .is_some_and(|file_name| file_name.ends_with(MANIFEST_SUFFIX))
}

fn relevant_manifests(event: &Event) -> Vec<PathBuf> {
    let relevant_kind = matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_));
    if !relevant_kind {
        return Vec::new();
    }

    event
        .paths
        .iter()
        .filter(|path| is_manifest_path(path))
        .cloned()
        .collect()
}

fn existing_manifests(directory: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(directory).map_err(|error| HighlightError::io(directory, error))?;
    let mut manifests: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| is_manifest_path(path))
        .collect();
    manifests.sort();
    Ok(manifests)
}

/// Runs pending games of the manifest at `path` and writes the updated
/// `highlighted` flags back when any game completed. A finished match whose
/// video is still missing is combined again.
pub fn process_manifest_file(
    path: &Path,
    pipeline: &HighlightPipeline,
    only_game: Option<u32>,
) -> Result<MatchReport> {
    let mut record = read_match_manifest(path)?;
    if record.pending_games().next().is_none() && !record.awaiting_publication() {
        tracing::debug!(manifest = %path.display(), "No pending games");
        return Ok(MatchReport::default());
    }

    let report = pipeline.run_match(&mut record, only_game);
    if !report.processed.is_empty() {
        write_match_manifest(path, &record)?;
    }

    tracing::info!(
        manifest = %path.display(),
        processed = report.processed.len(),
        failed = report.failed.len(),
        published = report.published.is_some(),
        "Match manifest processed"
    );
    Ok(report)
}

async fn process_on_blocking_task(path: PathBuf, pipeline: Arc<HighlightPipeline>) {
    let task_path = path.clone();
    let task = tokio::task::spawn_blocking(move || process_manifest_file(&task_path, &pipeline, None));

    match task.await {
        Ok(Ok(_)) => {}
        Ok(Err(error)) => {
            tracing::warn!(manifest = %path.display(), "Failed to process match manifest: {error}");
        }
        Err(error) => {
            tracing::error!(manifest = %path.display(), "Highlight task panicked: {error}");
        }
    }
}

/// Manifests are processed one at a time, in notification order.
pub async fn watch_manifests(directory: PathBuf, pipeline: Arc<HighlightPipeline>) -> Result<()> {
    let (notify_sender, mut notify_receiver) =
        mpsc::unbounded_channel::<std::result::Result<Event, notify::Error>>();

    let mut watcher = notify::recommended_watcher(move |result| {
        if notify_sender.send(result).is_err() {
            tracing::debug!("Manifest watcher notification receiver dropped");
        }
    })
    .map_err(|error| HighlightError::tool("notify", error.to_string()))?;

    watcher
        .watch(&directory, RecursiveMode::NonRecursive)
        .map_err(|error| HighlightError::tool("notify", error.to_string()))?;
    tracing::info!(directory = %directory.display(), "Watching for match manifests");

    for manifest in existing_manifests(&directory)? {
        process_on_blocking_task(manifest, Arc::clone(&pipeline)).await;
    }

    while let Some(notification_result) = notify_receiver.recv().await {
        match notification_result {
            Ok(event) => {
                for manifest in relevant_manifests(&event) {
                    tokio::time::sleep(SETTLE_DELAY).await;
                    process_on_blocking_task(manifest, Arc::clone(&pipeline)).await;
                }
            }
            Err(error) => {
                tracing::warn!("Manifest watcher error: {error}");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{existing_manifests, is_manifest_path, process_manifest_file, relevant_manifests};
    use crate::model::{GameKind, GameRecord, MatchRecord};
    use crate::pipeline::HighlightPipeline;
    use crate::settings::PipelineSettings;
    use crate::sidecar::{read_match_manifest, write_match_manifest};
    use notify::event::{CreateKind, RemoveKind};
    use notify::{Event, EventKind};
    use std::path::{Path, PathBuf};

    fn unique_test_directory(label: &str) -> PathBuf {
        let unique_suffix = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|duration| duration.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!("highlight-reel-watch-{label}-{unique_suffix}"))
    }

    #[test]
    fn recognizes_manifest_file_names() {
        assert!(is_manifest_path(Path::new("/m/final.match.json")));
        assert!(!is_manifest_path(Path::new("/m/final.match.json.tmp")));
        assert!(!is_manifest_path(Path::new("/m/game_1.highlights.json")));
    }

    #[test]
    fn only_created_or_modified_manifests_are_relevant() {
        let created = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/m/final.match.json"))
            .add_path(PathBuf::from("/m/notes.txt"));
        assert_eq!(relevant_manifests(&created), vec![PathBuf::from("/m/final.match.json")]);

        let removed = Event::new(EventKind::Remove(RemoveKind::File))
            .add_path(PathBuf::from("/m/final.match.json"));
        assert!(relevant_manifests(&removed).is_empty());
    }

    #[test]
    fn manifests_without_pending_games_are_left_untouched() {
        let directory = unique_test_directory("pending");
        let manifest_path = directory.join("semi.match.json");
        let record = MatchRecord {
            name: "semi".to_string(),
            folder: directory.clone(),
            finished: false,
            games: vec![GameRecord {
                game: GameKind::LeagueOfLegends,
                game_number: 1,
                recording: directory.join("1.mp4"),
                replay: None,
                tournament: None,
                team_1_round_count: None,
                team_2_round_count: None,
                game_start_offset: None,
                statistics_image: None,
                finished: false,
                highlighted: false,
                process_id: Some(4_242),
            }],
        };
        write_match_manifest(&manifest_path, &record).expect("Expected manifest write to succeed");
        std::fs::write(directory.join("ignored.json"), b"{}").expect("Expected stray file to be written");

        assert_eq!(
            existing_manifests(&directory).expect("Expected directory listing"),
            vec![manifest_path.clone()]
        );

        let pipeline = HighlightPipeline::new(PipelineSettings::default());
        let report = process_manifest_file(&manifest_path, &pipeline, None)
            .expect("Expected manifest processing to succeed");
        assert!(report.processed.is_empty());
        assert!(report.failed.is_empty());

        let reloaded = read_match_manifest(&manifest_path).expect("Expected manifest to reload");
        assert_eq!(reloaded.games[0].process_id, Some(4_242));
        assert!(!reloaded.games[0].highlighted);

        std::fs::remove_dir_all(&directory).expect("Expected test directory to be removed");
    }

    #[test]
    fn finished_manifest_without_match_video_attempts_publication() {
        let directory = unique_test_directory("publish");
        let manifest_path = directory.join("final.match.json");
        let record = MatchRecord {
            name: "final".to_string(),
            folder: directory.clone(),
            finished: true,
            games: vec![GameRecord {
                game: GameKind::CounterStrike,
                game_number: 1,
                recording: directory.join("1.mkv"),
                replay: None,
                tournament: None,
                team_1_round_count: Some(13),
                team_2_round_count: Some(7),
                game_start_offset: Some(12.0),
                statistics_image: None,
                finished: true,
                highlighted: true,
                process_id: None,
            }],
        };
        write_match_manifest(&manifest_path, &record).expect("Expected manifest write to succeed");

        let pipeline = HighlightPipeline::new(PipelineSettings::default());
        let report = process_manifest_file(&manifest_path, &pipeline, None)
            .expect("Expected manifest processing to succeed");

        assert!(report.processed.is_empty());
        assert!(report.published.is_none());
        assert!(report.publish_error.is_some());

        std::fs::remove_dir_all(&directory).expect("Expected test directory to be removed");
    }
}
