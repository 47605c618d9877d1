//! Path constants for configuration, cache and log files.

use std::path::PathBuf;

/// The name of the configuration directory under ~/.config/
pub const CONFIG_DIR_NAME: &str = "minitune";

/// The name of the main configuration file
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Subdirectory of the cache root holding downloaded media
pub const SONGS_DIR_NAME: &str = "songs";

/// Subdirectory of the cache root holding downloaded cover images
pub const COVERS_DIR_NAME: &str = "covers";

/// Subdirectory of the cache root holding remote media fetched for playback
pub const STAGING_DIR_NAME: &str = "staging";

/// The name of the cache index database file
pub const CACHE_INDEX_FILE_NAME: &str = "cache_index.db";

/// The name of the log file written when file logging is enabled
pub const LOG_FILE_NAME: &str = "minitune.log";

/// Get the configuration directory path (~/.config/minitune/)
#[must_use]
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join(CONFIG_DIR_NAME)
}

/// Get the config file path (~/.config/minitune/config.toml)
#[must_use]
pub fn config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

/// Get the default cache root (e.g. `~/.cache/minitune/` on Linux)
#[must_use]
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| config_dir().join("cache"))
        .join(CONFIG_DIR_NAME)
}

/// Get the log file path inside the given cache root
#[must_use]
pub fn log_file_path(cache_root: &std::path::Path) -> PathBuf {
    cache_root.join(LOG_FILE_NAME)
}

/// Directories commonly holding music on a desktop machine, when they exist.
#[must_use]
pub fn default_music_dirs() -> Vec<PathBuf> {
    let mut dirs_found: Vec<PathBuf> = [dirs::audio_dir(), dirs::desktop_dir(), dirs::download_dir()]
        .into_iter()
        .flatten()
        .filter(|p| p.is_dir())
        .collect();
    dirs_found.dedup();
    dirs_found
}
