use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    // Configuration errors
    #[error("Config file not found at {path}. A template has been created with default settings.")]
    ConfigNotFound { path: PathBuf },

    #[error("Invalid config: {message}")]
    ConfigInvalid { message: String },

    #[error("Failed to parse config file: {0}")]
    ConfigParseError(#[from] toml::de::Error),

    // Playback errors
    #[error("No audio backend could be initialized (tried: {})", tried.join(", "))]
    BackendUnavailable { tried: Vec<String> },

    #[error("Audio backend {backend} failed to initialize: {reason}")]
    BackendInit { backend: String, reason: String },

    #[error("Failed to load {uri}: {reason}")]
    LoadFailed { uri: String, reason: String },

    #[error("Audio backend {backend} error: {reason}")]
    Backend { backend: String, reason: String },

    // Network errors
    #[error("Network request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{url} returned status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Timed out fetching {url}")]
    Timeout { url: String },

    // Cache errors
    #[error("Cache index error: {0}")]
    Index(#[from] rusqlite::Error),

    #[error("Malformed cache index row: {message}")]
    MalformedIndexRow { message: String },

    #[error("Cache entry {id} is being downloaded")]
    EntryBusy { id: String },

    #[error("Download worker is not running")]
    WorkerStopped,

    // Metadata errors
    #[error("Failed to read tags: {0}")]
    Metadata(#[from] lofty::error::LoftyError),

    // IO errors
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
