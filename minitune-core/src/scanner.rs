//! Local music library scanning.

use crate::config::LibraryConfig;
use crate::metadata::MetadataReader;
use crate::track::Track;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

fn normalized_extensions(config: &LibraryConfig) -> Vec<String> {
    config
        .extensions
        .iter()
        .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| {
            let ext = ext.to_ascii_lowercase();
            extensions.iter().any(|e| *e == ext)
        })
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|s| s.to_str())
        .is_some_and(|name| name.starts_with('.'))
}

/// Audio files under `dir` as tracks, sorted by path.
///
/// Hidden files and directories are skipped. Unreadable entries are ignored.
#[must_use]
pub fn scan_directory(
    dir: &Path,
    config: &LibraryConfig,
    reader: &dyn MetadataReader,
) -> Vec<Track> {
    scan_directory_with_progress(dir, config, reader, |_, _| ControlFlow::Continue(()))
}

/// Like [`scan_directory`], reporting `(processed, total)` after each file.
///
/// Returning `ControlFlow::Break` from `on_progress` stops the scan; the tracks
/// read so far are returned.
#[must_use]
pub fn scan_directory_with_progress<F>(
    dir: &Path,
    config: &LibraryConfig,
    reader: &dyn MetadataReader,
    mut on_progress: F,
) -> Vec<Track>
where
    F: FnMut(usize, usize) -> ControlFlow<()>,
{
    let paths = collect_audio_paths(dir, config);
    let total = paths.len();

    let mut tracks = Vec::with_capacity(total);
    for path in paths {
        let metadata = reader.read(&path);
        tracks.push(Track::from_metadata(&path, metadata));
        if on_progress(tracks.len(), total).is_break() {
            info!(
                "Scan of {} cancelled after {}/{} files",
                dir.display(),
                tracks.len(),
                total
            );
            return tracks;
        }
    }

    info!("Found {} tracks in {}", tracks.len(), dir.display());
    tracks
}

fn collect_audio_paths(dir: &Path, config: &LibraryConfig) -> Vec<PathBuf> {
    let extensions = normalized_extensions(config);
    let mut walker = WalkDir::new(dir);
    if !config.recursive {
        walker = walker.max_depth(1);
    }

    let mut paths: Vec<PathBuf> = walker
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()))
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && has_extension(e.path(), &extensions))
        .map(walkdir::DirEntry::into_path)
        .collect();
    paths.sort();
    paths
}

/// Scan several directories, keeping the order of `dirs`
#[must_use]
pub fn scan_directories(
    dirs: &[PathBuf],
    config: &LibraryConfig,
    reader: &dyn MetadataReader,
) -> Vec<Track> {
    dirs.iter()
        .filter(|dir| {
            let exists = dir.is_dir();
            if !exists {
                debug!("Skipping missing music directory {}", dir.display());
            }
            exists
        })
        .flat_map(|dir| scan_directory(dir, config, reader))
        .collect()
}

/// Sibling `.lrc` file with the same stem as `track_path`, if present
#[must_use]
pub fn find_lyrics_file(track_path: &Path) -> Option<PathBuf> {
    let stem = track_path.file_stem()?;
    let dir = track_path.parent()?;

    let mut name = stem.to_os_string();
    name.push(".lrc");
    let exact = dir.join(name);
    if exact.is_file() {
        return Some(exact);
    }

    // Case-insensitive extension match, e.g. `Song.LRC`
    std::fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .find(|path| {
            path.file_stem() == Some(stem)
                && path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("lrc"))
        })
}
