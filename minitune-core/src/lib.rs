pub mod backend;
pub mod backends;
pub mod cache;
pub mod config;
pub mod download;
pub mod error;
pub mod index;
pub mod lrc;
pub mod metadata;
pub mod paths;
pub mod playback;
pub mod provider;
pub mod queue;
pub mod scanner;
pub mod staging;
pub mod sync;
pub mod time;
pub mod track;

pub use backend::{AudioBackend, BackendCandidate, BackendCapabilities, EndOfTrackNotifier};
pub use backends::{BackendKind, SilentBackend};
#[cfg(feature = "backend-rodio")]
pub use backends::RodioBackend;
pub use cache::{CacheEntry, CacheManager, CacheOptions, DownloadTask, DownloadTicket};
pub use config::{
    CacheConfig, LibraryConfig, LoggingConfig, LyricsConfig, MinituneConfig, PlaybackConfig,
};

/// Re-export toml error type for config parsing error handling
pub use toml::de::Error as TomlParseError;
pub use download::{Fetcher, HttpFetcher};
pub use error::{CoreError, Result};
pub use lrc::{LyricLine, Lyrics, LyricsMetadata};
pub use metadata::{LoftyMetadataReader, MetadataReader, TrackMetadata};
pub use paths::{config_dir, config_path, default_cache_dir, CONFIG_DIR_NAME, CONFIG_FILE_NAME};
pub use playback::{EndOfTrack, FallbackClock, PlaybackEngine, PlayerState};
pub use provider::{RemoteMusicService, RemoteTrack, ServiceChain};
pub use queue::{PlayMode, PlayQueue};
pub use scanner::{
    find_lyrics_file, scan_directories, scan_directory, scan_directory_with_progress,
};
pub use staging::RemoteStager;
pub use sync::{LyricsEvent, LyricsSynchronizer};
pub use time::{format_mm_ss, DurationExt};
pub use track::Track;
