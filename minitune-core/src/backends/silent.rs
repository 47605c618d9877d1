use crate::backend::{AudioBackend, BackendCapabilities, EndOfTrackNotifier};
use crate::error::{CoreError, Result};
use crate::metadata::probe_duration;
use crate::track::is_remote_uri;
use std::path::{Path, PathBuf};
use std::time::Duration;

const NAME: &str = "silent";

/// Backend without an audio device.
///
/// Accepts any existing local file and reports its tagged duration. Timing and
/// end-of-track are left to the engine's fallback clock, which makes this the
/// backend for headless runs and machines without sound output.
#[derive(Debug, Default)]
pub struct SilentBackend {
    loaded: Option<PathBuf>,
    duration: Option<Duration>,
    volume: u8,
}

impl SilentBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn volume(&self) -> u8 {
        self.volume
    }

    fn require_loaded(&self) -> Result<&Path> {
        self.loaded.as_deref().ok_or_else(|| CoreError::Backend {
            backend: NAME.to_string(),
            reason: "nothing loaded".to_string(),
        })
    }
}

impl AudioBackend for SilentBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            native_time: false,
            native_end: false,
            seek: true,
        }
    }

    fn load(&mut self, uri: &str) -> Result<()> {
        if is_remote_uri(uri) {
            return Err(CoreError::LoadFailed {
                uri: uri.to_string(),
                reason: "remote media must be staged locally first".to_string(),
            });
        }
        let path = Path::new(uri);
        if !path.is_file() {
            return Err(CoreError::LoadFailed {
                uri: uri.to_string(),
                reason: "file does not exist".to_string(),
            });
        }
        self.duration = probe_duration(path);
        self.loaded = Some(path.to_path_buf());
        Ok(())
    }

    fn play(&mut self, _on_end: EndOfTrackNotifier) -> Result<()> {
        self.require_loaded().map(|_| ())
    }

    fn pause(&mut self) -> Result<()> {
        self.require_loaded().map(|_| ())
    }

    fn resume(&mut self) -> Result<()> {
        self.require_loaded().map(|_| ())
    }

    fn stop(&mut self) {}

    fn set_volume(&mut self, volume: u8) {
        self.volume = volume;
    }

    fn seek(&mut self, _position: Duration) -> Result<()> {
        self.require_loaded().map(|_| ())
    }

    fn time(&self) -> Option<Duration> {
        None
    }

    fn duration(&self) -> Option<Duration> {
        self.duration
    }
}
