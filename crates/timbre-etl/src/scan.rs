use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use timbre_core::model::AudioFormat;

/// An audio file found under a sample library, labelled by its directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryEntry {
    pub path: PathBuf,
    /// Name of the directory holding the file.
    pub genre: String,
}

/// Walk `root` for supported audio files laid out as `<root>/<genre>/<file>`.
///
/// The genre is the immediate parent directory's name. Files sitting
/// directly in `root` have no genre and are skipped. Results are sorted by
/// path so repeated builds ingest in the same order.
pub fn scan_library(root: &Path) -> Vec<LibraryEntry> {
    let mut entries: Vec<LibraryEntry> = WalkDir::new(root)
        .min_depth(2)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let path = entry.into_path();
            if !is_audio_file(&path) {
                log::debug!("Skipping non-audio file: {}", path.display());
                return None;
            }
            let genre = path
                .parent()
                .and_then(Path::file_name)
                .map(|name| name.to_string_lossy().into_owned())?;
            log::debug!("Found {} ({})", path.display(), genre);
            Some(LibraryEntry { path, genre })
        })
        .collect();

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    log::info!("Found {} audio files under {}", entries.len(), root.display());
    entries
}

fn is_audio_file(path: &Path) -> bool {
    AudioFormat::from_path(path).is_supported()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_genre_comes_from_parent_directory() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        touch(&root.join("techno/kick.wav"));
        touch(&root.join("techno/hat.MP3"));
        touch(&root.join("ambient/pad.flac"));
        touch(&root.join("ambient/notes.txt"));
        touch(&root.join("loose.wav"));

        let entries = scan_library(root);
        let found: Vec<(&str, String)> = entries
            .iter()
            .map(|e| {
                (
                    e.genre.as_str(),
                    e.path.file_name().unwrap().to_string_lossy().into_owned(),
                )
            })
            .collect();

        assert_eq!(
            found,
            vec![
                ("ambient", "pad.flac".to_string()),
                ("techno", "hat.MP3".to_string()),
                ("techno", "kick.wav".to_string()),
            ]
        );
    }

    #[test]
    fn test_empty_library() {
        let dir = TempDir::new().unwrap();
        assert!(scan_library(dir.path()).is_empty());
    }
}
