use crate::cache::CacheEntry;
use crate::metadata::TrackMetadata;
use crate::provider::RemoteTrack;
use std::path::Path;

/// A playable item in the queue: a local path or a remote URL plus display metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// Local filesystem path or http(s) URL
    pub uri: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    /// 0 if unknown
    pub duration_ms: u64,
    /// Local cover path or cover URL
    pub cover: Option<String>,
}

impl Track {
    /// Create a track with just a URI; the title is derived from the last path segment.
    #[must_use]
    pub fn new(uri: impl Into<String>) -> Self {
        let uri = uri.into();
        let meta = TrackMetadata::defaults_for(Path::new(uri_path(&uri)));
        Self {
            uri,
            title: meta.title,
            artist: meta.artist,
            album: meta.album,
            duration_ms: 0,
            cover: None,
        }
    }

    /// Build a track for a scanned local file.
    #[must_use]
    pub fn from_metadata(path: &Path, metadata: TrackMetadata) -> Self {
        Self {
            uri: path.to_string_lossy().into_owned(),
            title: metadata.title,
            artist: metadata.artist,
            album: metadata.album,
            duration_ms: metadata.duration_ms,
            cover: None,
        }
    }

    /// Build a track for a remote search result that resolved to `play_url`.
    ///
    /// Playable once the engine has a [`RemoteStager`](crate::RemoteStager),
    /// or after caching it and switching to [`from_cache_entry`](Self::from_cache_entry).
    #[must_use]
    pub fn from_remote(remote: RemoteTrack, play_url: impl Into<String>) -> Self {
        Self {
            uri: play_url.into(),
            title: remote.name,
            artist: remote.artist,
            album: remote.album,
            duration_ms: remote.duration_ms,
            cover: remote.cover_url,
        }
    }

    /// Build a track pointing at a cached download.
    #[must_use]
    pub fn from_cache_entry(entry: &CacheEntry) -> Self {
        Self {
            uri: entry.local_path.to_string_lossy().into_owned(),
            title: entry.name.clone(),
            artist: entry.artist.clone(),
            album: entry.album.clone(),
            duration_ms: entry.duration_ms,
            cover: entry
                .cover_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    #[must_use]
    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = artist.into();
        self
    }

    #[must_use]
    pub const fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Whether the URI is an http(s) URL rather than a local path
    #[must_use]
    pub fn is_remote(&self) -> bool {
        is_remote_uri(&self.uri)
    }
}

/// Whether `uri` is an http(s) URL
#[must_use]
pub fn is_remote_uri(uri: &str) -> bool {
    uri.starts_with("http://") || uri.starts_with("https://")
}

/// Path part of a URI, without query string, for deriving names and extensions.
fn uri_path(uri: &str) -> &str {
    if is_remote_uri(uri) {
        uri.split(['?', '#']).next().unwrap_or(uri)
    } else {
        uri
    }
}
