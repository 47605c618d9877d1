use crate::backends::BackendKind;
use crate::error::{CoreError, Result};
use crate::playback::MAX_VOLUME;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MinituneConfig {
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub lyrics: LyricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Backend probe order: the first one that initializes is used
    #[serde(default = "default_backends")]
    pub backends: Vec<BackendKind>,
    #[serde(default = "default_volume")]
    pub volume: u8,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_backends() -> Vec<BackendKind> {
    vec![BackendKind::Rodio, BackendKind::Silent]
}

const fn default_volume() -> u8 {
    70
}

const fn default_poll_interval() -> u64 {
    200
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            backends: default_backends(),
            volume: default_volume(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl PlaybackConfig {
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Directories to scan. Empty means the platform music/desktop/download dirs.
    #[serde(default)]
    pub music_dirs: Vec<PathBuf>,
    #[serde(default = "default_true")]
    pub recursive: bool,
    /// File extensions treated as audio, without the dot
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

const fn default_true() -> bool {
    true
}

fn default_extensions() -> Vec<String> {
    ["mp3", "flac", "wav", "ogg", "m4a", "wma", "aac"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            music_dirs: Vec::new(),
            recursive: default_true(),
            extensions: default_extensions(),
        }
    }
}

impl LibraryConfig {
    /// Configured directories, or the platform defaults when none are set
    #[must_use]
    pub fn effective_dirs(&self) -> Vec<PathBuf> {
        if self.music_dirs.is_empty() {
            crate::paths::default_music_dirs()
        } else {
            self.music_dirs.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache root override; defaults to the platform cache directory
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,
    #[serde(default = "default_cover_timeout")]
    pub cover_timeout_secs: u64,
    /// Soft limit, only reported
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u64,
}

const fn default_max_age_days() -> u32 {
    30
}

const fn default_download_timeout() -> u64 {
    30
}

const fn default_cover_timeout() -> u64 {
    10
}

const fn default_max_size_mb() -> u64 {
    500
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            max_age_days: default_max_age_days(),
            download_timeout_secs: default_download_timeout(),
            cover_timeout_secs: default_cover_timeout(),
            max_size_mb: default_max_size_mb(),
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn root(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(crate::paths::default_cache_dir)
    }

    #[must_use]
    pub const fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    #[must_use]
    pub const fn cover_timeout(&self) -> Duration {
        Duration::from_secs(self.cover_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LyricsConfig {
    #[serde(default = "default_context_lines")]
    pub lines_before: usize,
    #[serde(default = "default_context_lines")]
    pub lines_after: usize,
}

const fn default_context_lines() -> usize {
    2
}

impl Default for LyricsConfig {
    fn default() -> Self {
        Self {
            lines_before: default_context_lines(),
            lines_after: default_context_lines(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Also write logs to `minitune.log` in the cache root
    #[serde(default)]
    pub file: bool,
}

impl MinituneConfig {
    /// Get the config file path (~/.config/minitune/config.toml)
    #[must_use]
    pub fn config_path() -> PathBuf {
        crate::paths::config_path()
    }

    /// Load config from the default location or create the template on first run
    ///
    /// # Errors
    ///
    /// Returns `ConfigNotFound` after writing the template, or an error if the
    /// file cannot be read, parsed or validated.
    pub fn load_or_create() -> Result<Self> {
        Self::load_or_create_at(&Self::config_path())
    }

    /// Same as [`load_or_create`](Self::load_or_create) for an explicit path
    ///
    /// # Errors
    ///
    /// See [`load_or_create`](Self::load_or_create).
    pub fn load_or_create_at(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            if let Some(parent) = config_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(config_path, CONFIG_TEMPLATE)?;
            return Err(CoreError::ConfigNotFound {
                path: config_path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(config_path)?;
        Self::parse(&content)
    }

    /// Parse and validate TOML config text
    ///
    /// # Errors
    ///
    /// Returns `ConfigParseError` for malformed TOML and `ConfigInvalid` for
    /// out-of-range values.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns `ConfigInvalid` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.playback.backends.is_empty() {
            return Err(invalid("playback.backends must list at least one backend"));
        }
        if self.playback.volume > MAX_VOLUME {
            return Err(invalid(format!(
                "playback.volume must be between 0 and {MAX_VOLUME}, got {}",
                self.playback.volume
            )));
        }
        if self.playback.poll_interval_ms == 0 {
            return Err(invalid("playback.poll_interval_ms must be greater than 0"));
        }
        if self.library.extensions.is_empty() {
            return Err(invalid("library.extensions must not be empty"));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> CoreError {
    CoreError::ConfigInvalid {
        message: message.into(),
    }
}

const CONFIG_TEMPLATE: &str = r##"# Minitune Configuration
# ~/.config/minitune/config.toml

[playback]
# Audio backends in probe order: "rodio", "silent"
# The first one that initializes is used. "silent" needs no audio device
# and keeps the player clock running when no output is available.
backends = ["rodio", "silent"]
volume = 70  # 0-100
poll_interval_ms = 200

[library]
# Directories to scan; leave empty for Music, Desktop and Downloads
music_dirs = []
recursive = true
extensions = ["mp3", "flac", "wav", "ogg", "m4a", "wma", "aac"]

[cache]
# dir = "/path/to/cache"  # Defaults to the platform cache directory
max_age_days = 30
download_timeout_secs = 30
cover_timeout_secs = 10
max_size_mb = 500

[lyrics]
# Context lines shown around the current line
lines_before = 2
lines_after = 2

[logging]
# Also write minitune.log into the cache directory
file = false
"##;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_parses_to_defaults() {
        let config = MinituneConfig::parse(CONFIG_TEMPLATE).unwrap();
        let defaults = MinituneConfig::default();
        assert_eq!(config.playback.backends, defaults.playback.backends);
        assert_eq!(config.playback.volume, 70);
        assert_eq!(config.library.extensions, defaults.library.extensions);
        assert_eq!(config.cache.max_age_days, 30);
        assert_eq!(config.lyrics.lines_before, 2);
        assert!(!config.logging.file);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = MinituneConfig::parse("").unwrap();
        assert_eq!(config.playback.poll_interval(), Duration::from_millis(200));
        assert!(config.library.recursive);
        assert!(config.cache.dir.is_none());
    }

    #[test]
    fn test_validation() {
        let err = MinituneConfig::parse("[playback]\nvolume = 101").unwrap_err();
        assert!(matches!(err, CoreError::ConfigInvalid { .. }));

        let err = MinituneConfig::parse("[playback]\nbackends = []").unwrap_err();
        assert!(matches!(err, CoreError::ConfigInvalid { .. }));

        let err = MinituneConfig::parse("[playback]\nbackends = [\"vlc\"]").unwrap_err();
        assert!(matches!(err, CoreError::ConfigParseError(_)));
    }

    #[test]
    fn test_load_or_create_writes_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let err = MinituneConfig::load_or_create_at(&path).unwrap_err();
        assert!(matches!(err, CoreError::ConfigNotFound { .. }));
        assert!(path.exists());

        let config = MinituneConfig::load_or_create_at(&path).unwrap();
        assert_eq!(
            config.playback.backends,
            vec![BackendKind::Rodio, BackendKind::Silent]
        );
    }

    #[test]
    fn test_default_backends_fall_back_to_silent() {
        let config = MinituneConfig::parse("[playback]\nvolume = 50").unwrap();
        assert_eq!(
            config.playback.backends,
            vec![BackendKind::Rodio, BackendKind::Silent]
        );

        let config = MinituneConfig::parse("[playback]\nbackends = [\"rodio\"]").unwrap();
        assert_eq!(config.playback.backends, vec![BackendKind::Rodio]);
    }

    #[test]
    fn test_cache_root_override() {
        let config = MinituneConfig::parse("[cache]\ndir = \"/tmp/mt-cache\"").unwrap();
        assert_eq!(config.cache.root(), PathBuf::from("/tmp/mt-cache"));
    }
}
