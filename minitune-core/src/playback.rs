//! Backend-agnostic playback state machine.

use crate::backend::{AudioBackend, BackendCandidate, BackendCapabilities, EndOfTrackNotifier};
use crate::backends;
use crate::config::PlaybackConfig;
use crate::error::{CoreError, Result};
use crate::staging::RemoteStager;
use crate::time::{fraction, DurationExt};
use crate::track::is_remote_uri;
use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Highest accepted volume
pub const MAX_VOLUME: u8 = 100;

/// Where the engine is in `Idle → Loaded → Playing ⇄ Paused → Stopped`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerState {
    /// Nothing loaded, or the last playback ran to its end
    #[default]
    Idle,
    Loaded,
    Playing,
    Paused,
    Stopped,
}

impl PlayerState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loaded => "loaded",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reported once per playback that ran to its end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndOfTrack {
    pub generation: u64,
    pub uri: String,
}

/// Callback invoked from [`PlaybackEngine::poll`] when a playback ends
pub type EndOfTrackHandler = Box<dyn FnMut(&EndOfTrack)>;

/// Wall-clock stand-in for backends that cannot report elapsed time.
///
/// Holds the time accumulated before the last pause plus the instant the
/// current run started. Never goes backwards while running.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackClock {
    accumulated: Duration,
    running_since: Option<Instant>,
}

impl FallbackClock {
    /// Start (or keep) running from the current value
    pub fn start(&mut self) {
        if self.running_since.is_none() {
            self.running_since = Some(Instant::now());
        }
    }

    /// Freeze at the current value
    pub fn pause(&mut self) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += since.elapsed();
        }
    }

    pub fn resume(&mut self) {
        self.start();
    }

    /// Back to zero, not running
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Jump to `position`, keeping the running/paused status
    pub fn seek(&mut self, position: Duration) {
        self.accumulated = position;
        if self.running_since.is_some() {
            self.running_since = Some(Instant::now());
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.accumulated + self.running_since.map_or(Duration::ZERO, |since| since.elapsed())
    }
}

/// Drives one [`AudioBackend`] through the player state machine.
///
/// Every successful `load`, every `stop` and every fresh `play` bumps the
/// generation. Backends report end-of-track tagged with the generation they
/// were started under; [`poll`](Self::poll) drops anything older.
///
/// Failures are logged and collapsed to `false` so the orchestrator only has
/// to branch on the outcome.
///
/// Backends play local files. With a [`RemoteStager`] attached, http(s)
/// URIs are fetched into a local file first and that file is loaded.
pub struct PlaybackEngine {
    backend: Box<dyn AudioBackend>,
    capabilities: BackendCapabilities,
    state: PlayerState,
    loaded_uri: Option<String>,
    volume: u8,
    generation: u64,
    clock: FallbackClock,
    end_tx: Sender<u64>,
    end_rx: Receiver<u64>,
    on_end: Option<EndOfTrackHandler>,
    stager: Option<RemoteStager>,
    /// Local copy backing the loaded remote URI
    staged: Option<PathBuf>,
}

impl PlaybackEngine {
    /// Wrap an already initialized backend.
    #[must_use]
    pub fn new(backend: Box<dyn AudioBackend>) -> Self {
        let (end_tx, end_rx) = mpsc::channel();
        Self {
            capabilities: backend.capabilities(),
            backend,
            state: PlayerState::Idle,
            loaded_uri: None,
            volume: MAX_VOLUME,
            generation: 0,
            clock: FallbackClock::default(),
            end_tx,
            end_rx,
            on_end: None,
            stager: None,
            staged: None,
        }
    }

    /// Use the first candidate that initializes.
    ///
    /// # Errors
    ///
    /// Returns `BackendUnavailable` listing every backend tried if none of
    /// them could be initialized.
    pub fn probe(candidates: Vec<BackendCandidate>) -> Result<Self> {
        let mut tried = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            match (candidate.init)() {
                Ok(backend) => {
                    info!("Using audio backend: {}", candidate.name);
                    return Ok(Self::new(backend));
                }
                Err(e) => {
                    warn!("Audio backend {} unavailable: {}", candidate.name, e);
                    tried.push(candidate.name.to_string());
                }
            }
        }
        Err(CoreError::BackendUnavailable { tried })
    }

    /// Probe the configured backends and apply the configured volume.
    ///
    /// # Errors
    ///
    /// Returns `BackendUnavailable` if none of the configured backends initialize.
    pub fn from_config(config: &PlaybackConfig) -> Result<Self> {
        let mut engine = Self::probe(backends::candidates(&config.backends))?;
        engine.set_volume(config.volume);
        Ok(engine)
    }

    /// Enable loading http(s) URIs by staging them through `stager`.
    pub fn set_remote_stager(&mut self, stager: RemoteStager) {
        self.stager = Some(stager);
    }

    /// Load `uri`, stopping whatever was playing.
    ///
    /// A remote URI is fetched completely before the backend sees it, so an
    /// unreachable URL fails here. On failure the reason is logged and the
    /// previous media and state are left exactly as they were.
    #[must_use]
    pub fn load(&mut self, uri: &str) -> bool {
        let staged = if is_remote_uri(uri) {
            let Some(stager) = self.stager.as_mut() else {
                warn!("Cannot load {}: remote media is not enabled", uri);
                return false;
            };
            match stager.stage(uri) {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!("Failed to fetch {}: {}", uri, e);
                    return false;
                }
            }
        } else {
            None
        };

        let loaded = {
            let local: Cow<'_, str> = match &staged {
                Some(path) => path.to_string_lossy(),
                None => Cow::Borrowed(uri),
            };
            self.backend.load(&local)
        };
        if let Err(e) = loaded {
            warn!("Failed to load {}: {}", uri, e);
            self.discard_staged(staged.as_deref());
            return false;
        }

        let previous = std::mem::replace(&mut self.staged, staged);
        self.discard_staged(previous.as_deref());
        self.bump_generation();
        self.clock.reset();
        self.backend.set_volume(self.volume);
        self.loaded_uri = Some(uri.to_string());
        self.state = PlayerState::Loaded;
        debug!("Loaded {} (generation {})", uri, self.generation);
        true
    }

    /// Start playback of the loaded media.
    ///
    /// From `Paused` this resumes. From `Loaded` it starts at the current
    /// position, which is the start unless a seek happened since the load.
    /// From `Stopped` or `Idle` it starts over from the beginning.
    #[must_use]
    pub fn play(&mut self) -> bool {
        let Some(uri) = self.loaded_uri.as_deref() else {
            debug!("Play requested with nothing loaded");
            return false;
        };
        match self.state {
            PlayerState::Playing => return true,
            PlayerState::Paused => return self.resume(),
            PlayerState::Idle | PlayerState::Loaded | PlayerState::Stopped => {}
        }

        let generation = self.generation.wrapping_add(1);
        let notifier = EndOfTrackNotifier::new(generation, self.end_tx.clone());
        if let Err(e) = self.backend.play(notifier) {
            warn!("Failed to play {}: {}", uri, e);
            return false;
        }
        self.generation = generation;
        if self.state != PlayerState::Loaded {
            self.clock.reset();
        }
        self.clock.start();
        self.state = PlayerState::Playing;
        true
    }

    /// Pause if playing. Returns whether the engine is now paused.
    pub fn pause(&mut self) -> bool {
        if self.state != PlayerState::Playing {
            return self.state == PlayerState::Paused;
        }
        if let Err(e) = self.backend.pause() {
            warn!("Failed to pause: {}", e);
            return false;
        }
        self.clock.pause();
        self.state = PlayerState::Paused;
        true
    }

    /// Resume if paused. Returns whether the engine is now playing.
    pub fn resume(&mut self) -> bool {
        if self.state != PlayerState::Paused {
            return self.state == PlayerState::Playing;
        }
        if let Err(e) = self.backend.resume() {
            warn!("Failed to resume: {}", e);
            return false;
        }
        self.clock.resume();
        self.state = PlayerState::Playing;
        true
    }

    pub fn toggle_pause(&mut self) -> bool {
        match self.state {
            PlayerState::Playing => self.pause(),
            PlayerState::Paused => self.resume(),
            _ => false,
        }
    }

    /// Stop output and invalidate any pending end-of-track. The media stays
    /// loaded, so `play` starts it again from the top.
    pub fn stop(&mut self) {
        if self.loaded_uri.is_none() {
            return;
        }
        self.backend.stop();
        self.bump_generation();
        self.clock.reset();
        self.state = PlayerState::Stopped;
    }

    /// Set the volume in percent. Values above 100 are clamped. Applied to
    /// the next load when nothing is loaded.
    pub fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(MAX_VOLUME);
        if self.loaded_uri.is_some() {
            self.backend.set_volume(self.volume);
        }
    }

    /// Seek to `position` (fraction of the duration, clamped to `0.0..=1.0`).
    ///
    /// Needs loaded media with a known duration.
    pub fn seek(&mut self, position: f64) -> bool {
        if self.loaded_uri.is_none() {
            return false;
        }
        let Some(duration) = self.backend.duration().filter(|d| !d.is_zero()) else {
            debug!("Seek ignored: duration unknown");
            return false;
        };
        let position = if position.is_nan() {
            0.0
        } else {
            position.clamp(0.0, 1.0)
        };
        let target = duration.mul_f64(position);
        if let Err(e) = self.backend.seek(target) {
            warn!("Failed to seek to {:?}: {}", target, e);
            return false;
        }
        self.clock.seek(target);
        true
    }

    /// Playback progress as a fraction of the duration; `0.0` when unknown.
    #[must_use]
    pub fn get_position(&self) -> f64 {
        match self.backend.duration() {
            Some(duration) => fraction(self.elapsed(), duration),
            None => 0.0,
        }
    }

    #[must_use]
    pub fn get_time_ms(&self) -> u64 {
        self.elapsed().as_millis_u64()
    }

    /// Duration of the loaded media in milliseconds; 0 when unknown
    #[must_use]
    pub fn get_duration_ms(&self) -> u64 {
        if self.loaded_uri.is_none() {
            return 0;
        }
        self.backend.duration().map_or(0, |d| d.as_millis_u64())
    }

    /// Install the callback [`poll`](Self::poll) invokes on end-of-track.
    pub fn set_end_of_track_handler(&mut self, handler: EndOfTrackHandler) {
        self.on_end = Some(handler);
    }

    /// Process end-of-track notifications. Call regularly from the owning thread.
    ///
    /// Returns the event and invokes the handler at most once per playback.
    /// Notifications from earlier generations are dropped. Backends without
    /// native end detection end when the fallback clock reaches the duration.
    pub fn poll(&mut self) -> Option<EndOfTrack> {
        let mut ended = false;
        while let Ok(generation) = self.end_rx.try_recv() {
            if generation == self.generation && self.state == PlayerState::Playing {
                ended = true;
            } else {
                debug!(
                    "Discarding end-of-track for generation {} (current {}, {})",
                    generation, self.generation, self.state
                );
            }
        }

        if !ended && !self.capabilities.native_end && self.state == PlayerState::Playing {
            ended = self
                .backend
                .duration()
                .is_some_and(|d| !d.is_zero() && self.clock.elapsed() >= d);
        }
        if !ended {
            return None;
        }

        self.clock.pause();
        self.state = PlayerState::Idle;
        let event = EndOfTrack {
            generation: self.generation,
            uri: self.loaded_uri.clone().unwrap_or_default(),
        };
        debug!("End of track: {}", event.uri);
        if let Some(handler) = self.on_end.as_mut() {
            handler(&event);
        }
        Some(event)
    }

    #[must_use]
    pub const fn state(&self) -> PlayerState {
        self.state
    }

    #[must_use]
    pub const fn volume(&self) -> u8 {
        self.volume
    }

    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    #[must_use]
    pub fn loaded_uri(&self) -> Option<&str> {
        self.loaded_uri.as_deref()
    }

    #[must_use]
    pub const fn current_generation(&self) -> u64 {
        self.generation
    }

    fn discard_staged(&self, path: Option<&Path>) {
        if let (Some(path), Some(stager)) = (path, &self.stager) {
            stager.discard(path);
        }
    }

    fn bump_generation(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    fn elapsed(&self) -> Duration {
        if self.loaded_uri.is_none() {
            return Duration::ZERO;
        }
        let native = if self.capabilities.native_time && self.state != PlayerState::Stopped {
            self.backend.time()
        } else {
            None
        };
        let elapsed = native.unwrap_or_else(|| self.clock.elapsed());
        match self.backend.duration() {
            Some(duration) if !duration.is_zero() => elapsed.min(duration),
            _ => elapsed,
        }
    }
}

impl fmt::Debug for PlaybackEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackEngine")
            .field("backend", &self.backend.name())
            .field("state", &self.state)
            .field("loaded_uri", &self.loaded_uri)
            .field("volume", &self.volume)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}
