//! Tag metadata extraction for local media files.

use crate::error::Result;
use crate::time::DurationExt;
use lofty::prelude::*;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown Album";

/// Best-effort metadata for a media file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
    pub album: String,
    /// 0 when the duration could not be determined
    pub duration_ms: u64,
    /// First embedded picture, if any
    pub cover_bytes: Option<Vec<u8>>,
}

impl TrackMetadata {
    /// Defaults used when a file has no readable tags: the file stem as title.
    #[must_use]
    pub fn defaults_for(path: &Path) -> Self {
        Self {
            title: file_stem(path),
            artist: UNKNOWN_ARTIST.to_string(),
            album: UNKNOWN_ALBUM.to_string(),
            duration_ms: 0,
            cover_bytes: None,
        }
    }
}

/// Reads title/artist/album/duration/cover from a media file.
///
/// Implementations never fail; unreadable files produce
/// [`TrackMetadata::defaults_for`].
pub trait MetadataReader: Send + Sync {
    fn read(&self, path: &Path) -> TrackMetadata;
}

/// [`MetadataReader`] backed by `lofty`
#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyMetadataReader;

impl MetadataReader for LoftyMetadataReader {
    fn read(&self, path: &Path) -> TrackMetadata {
        let mut metadata = TrackMetadata::defaults_for(path);
        if let Err(e) = read_tags(path, &mut metadata) {
            debug!("No readable tags in {}: {}", path.display(), e);
        }
        metadata
    }
}

fn read_tags(path: &Path, metadata: &mut TrackMetadata) -> Result<()> {
    let tagged = lofty::read_from_path(path)?;
    metadata.duration_ms = tagged.properties().duration().as_millis_u64();

    let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) else {
        return Ok(());
    };

    if let Some(title) = non_blank(tag.title().as_deref()) {
        metadata.title = title;
    }
    if let Some(artist) = non_blank(tag.artist().as_deref()) {
        metadata.artist = artist;
    }
    if let Some(album) = non_blank(tag.album().as_deref()) {
        metadata.album = album;
    }
    metadata.cover_bytes = tag.pictures().first().map(|p| p.data().to_vec());
    Ok(())
}

/// Read only the stream duration of a local file.
#[must_use]
pub fn probe_duration(path: &Path) -> Option<Duration> {
    let tagged = lofty::read_from_path(path).ok()?;
    let duration = tagged.properties().duration();
    (!duration.is_zero()).then_some(duration)
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_use_file_stem() {
        let meta = TrackMetadata::defaults_for(Path::new("/music/Some Song.flac"));
        assert_eq!(meta.title, "Some Song");
        assert_eq!(meta.artist, UNKNOWN_ARTIST);
        assert_eq!(meta.album, UNKNOWN_ALBUM);
        assert_eq!(meta.duration_ms, 0);
        assert!(meta.cover_bytes.is_none());
    }

    #[test]
    fn test_unreadable_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.mp3");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"definitely not audio").unwrap();

        let meta = LoftyMetadataReader.read(&path);
        assert_eq!(meta, TrackMetadata::defaults_for(&path));
    }

    #[test]
    fn test_missing_file_returns_defaults() {
        let meta = LoftyMetadataReader.read(Path::new("/nonexistent/track.ogg"));
        assert_eq!(meta.title, "track");
        assert!(probe_duration(Path::new("/nonexistent/track.ogg")).is_none());
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  x ")), Some("x".to_string()));
        assert_eq!(non_blank(Some("   ")), None);
        assert_eq!(non_blank(None), None);
    }
}
