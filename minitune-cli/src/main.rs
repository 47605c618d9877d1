use clap::{Parser, ValueEnum};
use minitune_core::config::LyricsConfig;
use minitune_core::paths;
use minitune_core::{
    find_lyrics_file, format_mm_ss, scan_directories, CacheManager, CoreError,
    LoftyMetadataReader, LyricsEvent, LyricsSynchronizer, MinituneConfig, PlayMode, PlayQueue,
    PlaybackEngine, RemoteStager, Track,
};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "minitune", version, about = "Play a music folder with synced lyrics", long_about = None)]
struct Cli {
    /// Directory to play. Defaults to the configured music directories.
    dir: Option<PathBuf>,

    /// Queue traversal order
    #[arg(short, long, value_enum, default_value_t = ModeArg::Sequential)]
    mode: ModeArg,

    /// Volume from 0 to 100, overriding the config file
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..=100))]
    volume: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Sequential,
    LoopOne,
    LoopAll,
    Shuffle,
}

impl From<ModeArg> for PlayMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Sequential => Self::Sequential,
            ModeArg::LoopOne => Self::LoopOne,
            ModeArg::LoopAll => Self::LoopAll,
            ModeArg::Shuffle => Self::Shuffle,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    // Logging settings live in the config, so read it before installing the subscriber
    let loaded = MinituneConfig::load_or_create();
    let log_file = loaded
        .as_ref()
        .ok()
        .filter(|config| config.logging.file)
        .map(|config| paths::log_file_path(&config.cache.root()));
    init_tracing(log_file.as_deref());

    let config = match loaded {
        Ok(config) => config,
        Err(CoreError::ConfigNotFound { path }) => {
            info!(
                "Wrote a config template to {}, continuing with defaults",
                path.display()
            );
            MinituneConfig::default()
        }
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let cache = open_cache(&config);

    let mut engine = match PlaybackEngine::from_config(&config.playback) {
        Ok(engine) => engine,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };
    if let Some(volume) = cli.volume {
        engine.set_volume(volume);
    }
    match RemoteStager::from_config(&config.cache) {
        Ok(stager) => engine.set_remote_stager(stager),
        Err(e) => warn!("Remote media disabled: {e}"),
    }

    let dirs = cli
        .dir
        .map_or_else(|| config.library.effective_dirs(), |dir| vec![dir]);
    let tracks = scan_directories(&dirs, &config.library, &LoftyMetadataReader);
    if tracks.is_empty() {
        warn!("No playable tracks found");
        shutdown_cache(cache);
        return;
    }

    let mut queue = PlayQueue::new();
    queue.extend(tracks);
    queue.set_mode(cli.mode.into());
    info!("Queued {} tracks ({} mode)", queue.len(), queue.mode());

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received Ctrl+C, shutting down...");
        handler_flag.store(false, Ordering::SeqCst);
    }) {
        error!("Failed to set Ctrl+C handler: {e}");
    }

    let mut session = Session {
        engine,
        queue,
        lyrics: LyricsSynchronizer::new(),
        lyrics_config: config.lyrics.clone(),
    };

    if session.play_next() {
        let interval = config.playback.poll_interval();
        while running.load(Ordering::SeqCst) && session.tick() {
            std::thread::sleep(interval);
        }
    } else {
        warn!("None of the queued tracks could be played");
    }

    session.engine.stop();
    shutdown_cache(cache);
    info!("Goodbye");
}

/// Open the download cache and apply the age limit. Playback works without it.
fn open_cache(config: &MinituneConfig) -> Option<CacheManager> {
    match CacheManager::from_config(&config.cache) {
        Ok(cache) => {
            cache.cleanup_older_than(config.cache.max_age_days);
            info!(
                "Download cache at {} ({} entries, {:.1} MB)",
                cache.root().display(),
                cache.list_entries().len(),
                cache.get_cache_size_mb()
            );
            let limit_bytes = config.cache.max_size_mb.saturating_mul(1024 * 1024);
            if cache.get_cache_size_bytes() > limit_bytes {
                warn!(
                    "Download cache exceeds {} MB, consider clearing it",
                    config.cache.max_size_mb
                );
            }
            Some(cache)
        }
        Err(e) => {
            warn!("Download cache unavailable: {e}");
            None
        }
    }
}

fn shutdown_cache(cache: Option<CacheManager>) {
    if let Some(cache) = cache {
        cache.shutdown();
    }
}

/// Owns everything touched from the polling loop
struct Session {
    engine: PlaybackEngine,
    queue: PlayQueue,
    lyrics: LyricsSynchronizer,
    lyrics_config: LyricsConfig,
}

impl Session {
    /// One polling step. Returns false once the queue has run out.
    fn tick(&mut self) -> bool {
        if self.engine.poll().is_some() && !self.play_next() {
            info!("Reached the end of the queue");
            return false;
        }

        let now_ms = self.engine.get_time_ms();
        match self.lyrics.update(now_ms) {
            Some(LyricsEvent::LineChanged { index }) => {
                if let Some(line) = self.lyrics.line_at(index) {
                    info!("[{}] {}", format_mm_ss(line.time_ms), line.text);
                }
                for (line, current) in self.lyrics.window(
                    now_ms,
                    self.lyrics_config.lines_before,
                    self.lyrics_config.lines_after,
                ) {
                    debug!("{} {}", if current { ">" } else { " " }, line.text);
                }
            }
            Some(LyricsEvent::BeforeFirstLine) => debug!("Waiting for the first lyric line"),
            None => {}
        }
        true
    }

    /// Advance the queue and start the next playable track.
    ///
    /// Tracks that fail to load are skipped, giving up after one pass over the queue.
    fn play_next(&mut self) -> bool {
        for _ in 0..self.queue.len() {
            let Some(track) = self.queue.advance().cloned() else {
                return false;
            };
            if self.start(&track) {
                return true;
            }
            warn!("Skipping {}", track.uri);
        }
        false
    }

    fn start(&mut self, track: &Track) -> bool {
        if !self.engine.load(&track.uri) {
            return false;
        }
        self.load_lyrics(track);
        if !self.engine.play() {
            return false;
        }
        info!(
            "Playing {} - {} [{}]",
            track.artist,
            track.title,
            format_mm_ss(self.engine.get_duration_ms())
        );
        true
    }

    fn load_lyrics(&mut self, track: &Track) {
        self.lyrics.clear();
        if track.is_remote() {
            return;
        }
        let Some(path) = find_lyrics_file(Path::new(&track.uri)) else {
            debug!("No lyrics for {}", track.uri);
            return;
        };
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                self.lyrics.load(&content);
                info!("Loaded {} lyric lines from {}", self.lyrics.len(), path.display());
            }
            Err(e) => warn!("Failed to read lyrics {}: {}", path.display(), e),
        }
    }
}

/// Initialize tracing with console output and optional file logging
fn init_tracing(log_file: Option<&Path>) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer();

    if let Some(log_path) = log_file {
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        match File::create(log_path) {
            Ok(file) => {
                let file_layer = tracing_subscriber::fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt_layer)
                    .with(file_layer)
                    .init();

                return;
            }
            Err(e) => {
                eprintln!("Failed to create log file at {}: {e}", log_path.display());
            }
        }
    }

    // Fallback: console only
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["minitune", "/music", "--mode", "loop-all", "-v", "40"]).unwrap();
        assert_eq!(cli.dir, Some(PathBuf::from("/music")));
        assert_eq!(PlayMode::from(cli.mode), PlayMode::LoopAll);
        assert_eq!(cli.volume, Some(40));

        assert!(Cli::try_parse_from(["minitune", "--volume", "101"]).is_err());

        let cli = Cli::try_parse_from(["minitune"]).unwrap();
        assert_eq!(cli.dir, None);
        assert_eq!(cli.mode, ModeArg::Sequential);
    }
}
