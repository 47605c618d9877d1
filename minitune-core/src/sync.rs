use crate::lrc::{LyricLine, Lyrics, LyricsMetadata};

/// Events emitted when the highlighted lyric line changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LyricsEvent {
    /// Playback moved onto the line at `index`
    LineChanged { index: usize },
    /// Playback is before the first timestamped line (e.g. after a seek back)
    BeforeFirstLine,
}

/// Holds the lyrics of the current track and maps playback time to lines.
///
/// The synchronizer owns no clock. Callers feed it the playback time in
/// milliseconds, typically from [`crate::PlaybackEngine::get_time_ms`].
#[derive(Debug, Default)]
pub struct LyricsSynchronizer {
    lyrics: Lyrics,
    last_index: Option<usize>,
}

impl LyricsSynchronizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current lyrics with parsed LRC text.
    pub fn load(&mut self, lrc: &str) {
        self.set_lyrics(Lyrics::parse(lrc));
    }

    /// Replace the current lyrics with an already parsed set.
    pub fn set_lyrics(&mut self, lyrics: Lyrics) {
        self.lyrics = lyrics;
        self.last_index = None;
    }

    pub fn clear(&mut self) {
        self.set_lyrics(Lyrics::default());
    }

    #[must_use]
    pub fn has_lyrics(&self) -> bool {
        !self.lyrics.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lyrics.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lyrics.is_empty()
    }

    #[must_use]
    pub fn line_at(&self, index: usize) -> Option<&LyricLine> {
        self.lyrics.lines.get(index)
    }

    #[must_use]
    pub fn lines(&self) -> &[LyricLine] {
        &self.lyrics.lines
    }

    #[must_use]
    pub fn metadata(&self) -> &LyricsMetadata {
        &self.lyrics.metadata
    }

    #[must_use]
    pub fn current_index(&self, t_ms: u64) -> Option<usize> {
        self.lyrics.current_index(t_ms)
    }

    #[must_use]
    pub fn current_and_next(&self, t_ms: u64) -> (Option<&LyricLine>, Option<&LyricLine>) {
        self.lyrics.current_and_next(t_ms)
    }

    #[must_use]
    pub fn window(&self, t_ms: u64, before: usize, after: usize) -> Vec<(&LyricLine, bool)> {
        self.lyrics.window(t_ms, before, after)
    }

    /// Advance to `t_ms`, returning an event only when the current line changed
    /// since the previous call.
    pub fn update(&mut self, t_ms: u64) -> Option<LyricsEvent> {
        let index = self.lyrics.current_index(t_ms);
        if index == self.last_index {
            return None;
        }
        self.last_index = index;
        Some(index.map_or(LyricsEvent::BeforeFirstLine, |index| {
            LyricsEvent::LineChanged { index }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "[ti:Sample]\n[00:01.00]one\n[00:02.00]two\n[00:03.00]three";

    #[test]
    fn test_load_and_query() {
        let mut sync = LyricsSynchronizer::new();
        assert!(!sync.has_lyrics());

        sync.load(SAMPLE);
        assert!(sync.has_lyrics());
        assert_eq!(sync.len(), 3);
        assert_eq!(sync.metadata().title.as_deref(), Some("Sample"));
        assert_eq!(sync.line_at(1).map(|l| l.text.as_str()), Some("two"));
        assert_eq!(sync.current_index(2500), Some(1));

        let (current, next) = sync.current_and_next(2500);
        assert_eq!(current.map(|l| l.time_ms), Some(2000));
        assert_eq!(next.map(|l| l.time_ms), Some(3000));
    }

    #[test]
    fn test_update_emits_only_on_change() {
        let mut sync = LyricsSynchronizer::new();
        sync.load(SAMPLE);

        assert_eq!(sync.update(500), None);
        assert_eq!(sync.update(1000), Some(LyricsEvent::LineChanged { index: 0 }));
        assert_eq!(sync.update(1500), None);
        assert_eq!(sync.update(3200), Some(LyricsEvent::LineChanged { index: 2 }));
        assert_eq!(sync.update(100), Some(LyricsEvent::BeforeFirstLine));
        assert_eq!(sync.update(200), None);
    }

    #[test]
    fn test_clear_resets_state() {
        let mut sync = LyricsSynchronizer::new();
        sync.load(SAMPLE);
        sync.update(2000);

        sync.clear();
        assert!(sync.is_empty());
        assert!(sync.window(2000, 1, 1).is_empty());
        assert_eq!(sync.update(2000), None);

        // Reloading starts tracking from scratch
        sync.load(SAMPLE);
        assert_eq!(sync.update(2000), Some(LyricsEvent::LineChanged { index: 1 }));
    }
}
