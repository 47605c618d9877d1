//! The seam between the playback engine and concrete audio outputs.

use crate::error::Result;
use std::fmt;
use std::sync::mpsc::Sender;
use std::time::Duration;
use tracing::debug;

/// What a backend can report by itself.
///
/// The engine fills the gaps with its fallback clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCapabilities {
    /// `time()` reports the real playback position
    pub native_time: bool,
    /// The backend calls its [`EndOfTrackNotifier`] when media runs out
    pub native_end: bool,
    /// `seek()` actually moves the output
    pub seek: bool,
}

/// An audio output that can play one piece of media at a time.
///
/// Backends are owned by the orchestrating thread and need not be `Send`.
/// Only the [`EndOfTrackNotifier`] handed to `play` crosses threads.
pub trait AudioBackend {
    /// Short identifier used in logs and configuration
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> BackendCapabilities;

    /// Prepare `uri` for playback, replacing whatever was loaded.
    ///
    /// # Errors
    ///
    /// Returns an error if the media cannot be opened or decoded. The
    /// previously loaded media must stay untouched in that case.
    fn load(&mut self, uri: &str) -> Result<()>;

    /// Start the loaded media from the beginning.
    ///
    /// # Errors
    ///
    /// Returns an error if nothing is loaded or the output refuses to start.
    fn play(&mut self, on_end: EndOfTrackNotifier) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the output cannot be paused.
    fn pause(&mut self) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the output cannot be resumed.
    fn resume(&mut self) -> Result<()>;

    /// Stop output. The media stays loaded so a later `play` restarts it.
    fn stop(&mut self);

    /// Volume in percent, already clamped to `0..=100`
    fn set_volume(&mut self, volume: u8);

    /// # Errors
    ///
    /// Returns an error if the media does not support seeking.
    fn seek(&mut self, position: Duration) -> Result<()>;

    /// Current position, if the backend tracks it
    fn time(&self) -> Option<Duration>;

    /// Length of the loaded media, if known
    fn duration(&self) -> Option<Duration>;
}

/// One-shot handle a backend uses to report that playback ran out.
///
/// Carries the generation of the playback it belongs to so the engine can
/// drop notifications that arrive after a `stop` or a new `load`.
#[derive(Clone)]
pub struct EndOfTrackNotifier {
    generation: u64,
    tx: Sender<u64>,
}

impl EndOfTrackNotifier {
    pub(crate) const fn new(generation: u64, tx: Sender<u64>) -> Self {
        Self { generation, tx }
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Safe to call from any thread, any number of times.
    pub fn notify(&self) {
        if self.tx.send(self.generation).is_err() {
            debug!(
                "End-of-track for generation {} dropped: engine is gone",
                self.generation
            );
        }
    }
}

impl fmt::Debug for EndOfTrackNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndOfTrackNotifier")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Constructor for a backend, tried lazily during probing
pub type BackendInit = Box<dyn FnOnce() -> Result<Box<dyn AudioBackend>>>;

/// A named entry in the backend probe order
pub struct BackendCandidate {
    pub name: &'static str,
    pub init: BackendInit,
}

impl BackendCandidate {
    #[must_use]
    pub fn new<F>(name: &'static str, init: F) -> Self
    where
        F: FnOnce() -> Result<Box<dyn AudioBackend>> + 'static,
    {
        Self {
            name,
            init: Box::new(init),
        }
    }
}

impl fmt::Debug for BackendCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendCandidate")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_notifier_sends_generation_across_threads() {
        let (tx, rx) = mpsc::channel();
        let notifier = EndOfTrackNotifier::new(7, tx);
        let remote = notifier.clone();

        std::thread::spawn(move || remote.notify()).join().unwrap();
        assert_eq!(rx.recv().unwrap(), 7);
        assert_eq!(notifier.generation(), 7);
    }

    #[test]
    fn test_notifier_after_receiver_dropped_is_harmless() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        EndOfTrackNotifier::new(1, tx).notify();
    }
}
