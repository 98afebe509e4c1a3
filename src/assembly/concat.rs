use std::fs;
use std::path::{Path, PathBuf};

use super::ffmpeg::MediaTools;
use crate::error::{HighlightError, Result};

pub(crate) const CONCAT_LIST_FILE_NAME: &str = "highlights.txt";

pub(crate) fn create_workspace(workspace: &Path) -> Result<()> {
    fs::create_dir_all(workspace).map_err(|error| HighlightError::io(workspace, error))
}

pub(crate) fn format_concat_entry(path: &Path) -> String {
    let normalized = path.to_string_lossy().replace('\\', "/");
    let escaped = normalized.replace('\'', "'\\''");
    format!("file '{escaped}'\n")
}

pub(crate) fn write_concat_file(list_path: &Path, media_paths: &[PathBuf]) -> Result<()> {
    let contents: String = media_paths
        .iter()
        .map(|media_path| format_concat_entry(media_path))
        .collect();
    fs::write(list_path, contents).map_err(|error| HighlightError::io(list_path, error))
}

/// Drops paths that are missing or empty, logging each one.
pub(crate) fn collect_non_empty_media(media_paths: &[PathBuf]) -> Vec<PathBuf> {
    media_paths
        .iter()
        .filter(|media_path| {
            let usable = media_path
                .metadata()
                .is_ok_and(|metadata| metadata.is_file() && metadata.len() > 0);
            if !usable {
                tracing::warn!(
                    media_path = %media_path.display(),
                    "Skipping missing or empty video"
                );
            }
            usable
        })
        .cloned()
        .collect()
}

/// Joins videos that share codec parameters without re-encoding.
pub(crate) fn concat_lossless(media: &MediaTools, list_path: &Path, output_path: &Path) -> Result<()> {
    let mut command = media.ffmpeg_command();
    command
        .arg("-f")
        .arg("concat")
        .arg("-safe")
        .arg("0")
        .arg("-i")
        .arg(list_path)
        .arg("-c")
        .arg("copy")
        .arg(output_path);
    media.run_ffmpeg(command, "lossless concatenation")
}

/// Re-containers with the index moved to the front for progressive playback.
pub(crate) fn faststart_remux(media: &MediaTools, input_path: &Path, output_path: &Path) -> Result<()> {
    let mut command = media.ffmpeg_command();
    command
        .arg("-i")
        .arg(input_path)
        .arg("-c")
        .arg("copy")
        .arg("-movflags")
        .arg("+faststart")
        .arg(output_path);
    media.run_ffmpeg(command, "faststart remux")
}

pub(crate) fn cleanup_workspace(workspace: &Path) {
    if !workspace.exists() {
        return;
    }
    if let Err(error) = fs::remove_dir_all(workspace) {
        tracing::warn!(
            workspace = %workspace.display(),
            "Failed to remove highlight workspace: {error}"
        );
    }
}

pub(crate) fn remove_file_quietly(path: &Path) {
    if let Err(error) = fs::remove_file(path) {
        if error.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), "Failed to remove file: {error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        cleanup_workspace, collect_non_empty_media, format_concat_entry, write_concat_file,
    };
    use std::fs;
    use std::path::{Path, PathBuf};

    fn unique_test_directory(label: &str) -> PathBuf {
        let unique_suffix = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|duration| duration.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!("highlight-reel-concat-{label}-{unique_suffix}"))
    }

    #[test]
    fn concat_entries_normalize_separators_and_quote_paths() {
        assert_eq!(
            format_concat_entry(Path::new(r"C:\matches\game_1_highlights.mkv")),
            "file 'C:/matches/game_1_highlights.mkv'\n"
        );
        assert_eq!(
            format_concat_entry(Path::new("/tmp/it's.mkv")),
            "file '/tmp/it'\\''s.mkv'\n"
        );
    }

    #[test]
    fn writes_list_in_given_order() {
        let directory = unique_test_directory("list");
        fs::create_dir_all(&directory).expect("Expected test directory to be created");
        let list_path = directory.join("highlights.txt");

        write_concat_file(
            &list_path,
            &[PathBuf::from("/v/game_2.mkv"), PathBuf::from("/v/game_1.mkv")],
        )
        .expect("Expected concat list to be written");

        let contents = fs::read_to_string(&list_path).expect("Expected concat list to be readable");
        assert_eq!(contents, "file '/v/game_2.mkv'\nfile '/v/game_1.mkv'\n");

        cleanup_workspace(&directory);
        assert!(!directory.exists());
    }

    #[test]
    fn skips_missing_and_empty_videos() {
        let directory = unique_test_directory("non-empty");
        fs::create_dir_all(&directory).expect("Expected test directory to be created");
        let full = directory.join("full.mkv");
        let empty = directory.join("empty.mkv");
        fs::write(&full, b"data").expect("Expected video to be written");
        fs::write(&empty, b"").expect("Expected empty video to be written");

        let usable = collect_non_empty_media(&[full.clone(), empty, directory.join("missing.mkv")]);
        assert_eq!(usable, vec![full]);

        cleanup_workspace(&directory);
    }
}
