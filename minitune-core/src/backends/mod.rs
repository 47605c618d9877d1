//! Concrete [`AudioBackend`](crate::AudioBackend) implementations.

#[cfg(feature = "backend-rodio")]
mod rodio;
mod silent;

#[cfg(feature = "backend-rodio")]
pub use self::rodio::RodioBackend;
pub use silent::SilentBackend;

use crate::backend::{AudioBackend, BackendCandidate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Backends that can be listed in `playback.backends`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Device output through rodio
    Rodio,
    /// No output; time comes from the engine's fallback clock
    Silent,
}

impl BackendKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rodio => "rodio",
            Self::Silent => "silent",
        }
    }

    /// Lazily constructed probe entry for this backend
    #[must_use]
    pub fn candidate(self) -> BackendCandidate {
        match self {
            Self::Rodio => BackendCandidate::new(self.as_str(), rodio_init),
            Self::Silent => BackendCandidate::new(self.as_str(), || {
                Ok(Box::new(SilentBackend::new()) as Box<dyn AudioBackend>)
            }),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Probe entries for `kinds`, in order
#[must_use]
pub fn candidates(kinds: &[BackendKind]) -> Vec<BackendCandidate> {
    kinds.iter().map(|kind| kind.candidate()).collect()
}

#[cfg(feature = "backend-rodio")]
fn rodio_init() -> crate::Result<Box<dyn AudioBackend>> {
    Ok(Box::new(RodioBackend::open_default()?))
}

#[cfg(not(feature = "backend-rodio"))]
fn rodio_init() -> crate::Result<Box<dyn AudioBackend>> {
    Err(crate::CoreError::BackendInit {
        backend: BackendKind::Rodio.to_string(),
        reason: "built without the backend-rodio feature".to_string(),
    })
}
