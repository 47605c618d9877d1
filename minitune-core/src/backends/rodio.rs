//! Device output through `rodio`.

use crate::backend::{AudioBackend, BackendCapabilities, EndOfTrackNotifier};
use crate::error::{CoreError, Result};
use crate::metadata::probe_duration;
use crate::track::is_remote_uri;
use ::rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink, Source};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

const NAME: &str = "rodio";

struct LoadedMedia {
    path: PathBuf,
    duration: Option<Duration>,
}

/// Plays local files on the default output device.
///
/// Every playback gets its own paused [`Sink`]. A watcher thread blocks on
/// the sink and fires the end-of-track notifier once it drains, which also
/// happens when the sink is stopped. The engine drops those late notifications
/// by generation.
pub struct RodioBackend {
    // Must outlive every sink connected to its mixer
    stream: OutputStream,
    sink: Option<Arc<Sink>>,
    loaded: Option<LoadedMedia>,
    volume: f32,
}

impl RodioBackend {
    /// Open the system's default output device.
    ///
    /// # Errors
    ///
    /// Returns `BackendInit` if no output device can be opened.
    pub fn open_default() -> Result<Self> {
        let mut stream =
            OutputStreamBuilder::open_default_stream().map_err(|e| CoreError::BackendInit {
                backend: NAME.to_string(),
                reason: e.to_string(),
            })?;
        // rodio prints to stderr when the stream is dropped
        stream.log_on_drop(false);
        info!("Opened default audio output");

        Ok(Self {
            stream,
            sink: None,
            loaded: None,
            volume: 1.0,
        })
    }

    /// Decode `path` into a fresh paused sink.
    fn prepare_sink(&self, path: &Path) -> Result<(Sink, Option<Duration>)> {
        let uri = path.to_string_lossy();
        let file = File::open(path).map_err(|e| CoreError::LoadFailed {
            uri: uri.to_string(),
            reason: e.to_string(),
        })?;
        let source = Decoder::new(BufReader::new(file)).map_err(|e| CoreError::LoadFailed {
            uri: uri.to_string(),
            reason: e.to_string(),
        })?;
        let duration = source.total_duration();

        let sink = Sink::connect_new(self.stream.mixer());
        sink.pause();
        sink.set_volume(self.volume);
        sink.append(source);
        Ok((sink, duration))
    }

    fn backend_error(reason: impl Into<String>) -> CoreError {
        CoreError::Backend {
            backend: NAME.to_string(),
            reason: reason.into(),
        }
    }
}

impl AudioBackend for RodioBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            native_time: true,
            native_end: true,
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
        let path = PathBuf::from(uri);
        let (sink, decoded_duration) = self.prepare_sink(&path)?;
        let duration = decoded_duration.or_else(|| probe_duration(&path));

        if let Some(old) = self.sink.replace(Arc::new(sink)) {
            old.stop();
        }
        debug!("Loaded {} ({:?})", path.display(), duration);
        self.loaded = Some(LoadedMedia { path, duration });
        Ok(())
    }

    fn play(&mut self, on_end: EndOfTrackNotifier) -> Result<()> {
        let path = match &self.loaded {
            Some(media) => media.path.clone(),
            None => return Err(Self::backend_error("nothing loaded")),
        };

        // A stopped or drained sink has nothing left to play
        let reusable = self.sink.as_ref().is_some_and(|s| !s.empty());
        if !reusable {
            let (sink, _) = self.prepare_sink(&path)?;
            if let Some(old) = self.sink.replace(Arc::new(sink)) {
                old.stop();
            }
        }
        let Some(sink) = self.sink.clone() else {
            return Err(Self::backend_error("no sink"));
        };

        let watcher = Arc::clone(&sink);
        thread::Builder::new()
            .name(format!("rodio-end-{}", on_end.generation()))
            .spawn(move || {
                watcher.sleep_until_end();
                on_end.notify();
            })
            .map_err(|e| Self::backend_error(format!("failed to spawn watcher: {e}")))?;

        sink.play();
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        let sink = self
            .sink
            .as_ref()
            .ok_or_else(|| Self::backend_error("nothing playing"))?;
        sink.pause();
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        let sink = self
            .sink
            .as_ref()
            .ok_or_else(|| Self::backend_error("nothing playing"))?;
        sink.play();
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
    }

    fn set_volume(&mut self, volume: u8) {
        self.volume = f32::from(volume) / 100.0;
        if let Some(sink) = &self.sink {
            sink.set_volume(self.volume);
        }
    }

    fn seek(&mut self, position: Duration) -> Result<()> {
        let sink = self
            .sink
            .as_ref()
            .ok_or_else(|| Self::backend_error("nothing loaded"))?;
        sink.try_seek(position)
            .map_err(|e| Self::backend_error(format!("seek failed: {e}")))
    }

    fn time(&self) -> Option<Duration> {
        self.sink.as_ref().map(|s| s.get_pos())
    }

    fn duration(&self) -> Option<Duration> {
        self.loaded.as_ref().and_then(|m| m.duration)
    }
}
