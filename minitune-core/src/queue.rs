//! Ordered play queue with a current-position cursor and traversal modes.

use crate::track::Track;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Traversal policy for [`PlayQueue::advance`] and [`PlayQueue::retreat`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayMode {
    /// Walk forward, stop at the end
    #[default]
    Sequential,
    /// Repeat the current track
    LoopOne,
    /// Walk forward, wrap to the start
    LoopAll,
    /// Walk a random permutation, wrapping around
    Shuffle,
}

impl PlayMode {
    /// The mode after this one in the cycle order.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Sequential => Self::LoopOne,
            Self::LoopOne => Self::LoopAll,
            Self::LoopAll => Self::Shuffle,
            Self::Shuffle => Self::Sequential,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::LoopOne => "loop_one",
            Self::LoopAll => "loop_all",
            Self::Shuffle => "shuffle",
        }
    }
}

impl std::fmt::Display for PlayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shuffle permutation over queue indices and the cursor walking it.
///
/// `started` is false right after a regeneration: the next advance lands on
/// `order[0]` rather than skipping it.
#[derive(Debug, Clone, Default)]
struct ShuffleOrder {
    order: Vec<usize>,
    cursor: usize,
    started: bool,
}

/// Ordered track list owning its tracks.
///
/// `current` is always `None` or a valid index into `tracks`.
#[derive(Debug)]
pub struct PlayQueue {
    tracks: Vec<Track>,
    current: Option<usize>,
    mode: PlayMode,
    shuffle: ShuffleOrder,
    rng: StdRng,
}

impl Default for PlayQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayQueue {
    /// Create an empty queue in [`PlayMode::Sequential`]
    #[must_use]
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Create an empty queue whose shuffles are reproducible
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            tracks: Vec::new(),
            current: None,
            mode: PlayMode::default(),
            shuffle: ShuffleOrder::default(),
            rng,
        }
    }

    pub fn append(&mut self, track: Track) {
        self.tracks.push(track);
        self.on_contents_changed();
    }

    /// Append several tracks with a single shuffle regeneration.
    pub fn extend(&mut self, tracks: impl IntoIterator<Item = Track>) {
        let before = self.tracks.len();
        self.tracks.extend(tracks);
        if self.tracks.len() != before {
            self.on_contents_changed();
        }
    }

    /// Remove the track at `index`. Returns false if the index is out of range.
    ///
    /// Removing a track before the current one keeps the same track current.
    /// Removing the current track moves the cursor onto the track that slid into
    /// its place, or the new last track.
    pub fn remove(&mut self, index: usize) -> bool {
        if index >= self.tracks.len() {
            return false;
        }
        self.tracks.remove(index);

        let len = self.tracks.len();
        self.current = match self.current {
            _ if len == 0 => None,
            Some(c) if index < c => Some(c - 1),
            Some(c) => Some(c.min(len - 1)),
            None => None,
        };
        self.on_contents_changed();
        true
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
        self.current = None;
        self.shuffle = ShuffleOrder::default();
    }

    #[must_use]
    pub fn current(&self) -> Option<&Track> {
        self.current.and_then(|i| self.tracks.get(i))
    }

    #[must_use]
    pub const fn current_index(&self) -> Option<usize> {
        self.current
    }

    /// Make `index` current. Returns false if out of range.
    pub fn set_current(&mut self, index: usize) -> bool {
        if index >= self.tracks.len() {
            return false;
        }
        self.current = Some(index);
        if self.mode == PlayMode::Shuffle {
            if let Some(pos) = self.shuffle.order.iter().position(|&i| i == index) {
                self.shuffle.cursor = pos;
                self.shuffle.started = true;
            }
        }
        true
    }

    /// Move to the next track according to the play mode.
    ///
    /// Returns `None` when the queue is empty or, in sequential mode, when
    /// the end has been reached (the cursor stays on the last track).
    pub fn advance(&mut self) -> Option<&Track> {
        let len = self.tracks.len();
        if len == 0 {
            return None;
        }

        match self.mode {
            PlayMode::Sequential => {
                let next = self.current.map_or(0, |i| i + 1);
                if next >= len {
                    self.current = Some(len - 1);
                    return None;
                }
                self.current = Some(next);
            }
            PlayMode::LoopOne => {
                self.current = Some(self.current.unwrap_or(0));
            }
            PlayMode::LoopAll => {
                self.current = Some(self.current.map_or(0, |i| (i + 1) % len));
            }
            PlayMode::Shuffle => {
                let n = self.shuffle.order.len();
                let pos = if self.shuffle.started {
                    (self.shuffle.cursor + 1) % n
                } else {
                    0
                };
                self.step_shuffle_to(pos);
            }
        }
        self.current()
    }

    /// Move to the previous track, mirroring [`advance`](Self::advance).
    ///
    /// In sequential mode, stepping back from the first track returns `None`
    /// and the cursor stays on the first track.
    pub fn retreat(&mut self) -> Option<&Track> {
        let len = self.tracks.len();
        if len == 0 {
            return None;
        }

        match self.mode {
            PlayMode::Sequential => match self.current {
                Some(i) if i > 0 => self.current = Some(i - 1),
                _ => {
                    self.current = Some(0);
                    return None;
                }
            },
            PlayMode::LoopOne => {
                self.current = Some(self.current.unwrap_or(0));
            }
            PlayMode::LoopAll => {
                self.current = Some(match self.current {
                    Some(i) if i > 0 => i - 1,
                    _ => len - 1,
                });
            }
            PlayMode::Shuffle => {
                let n = self.shuffle.order.len();
                let pos = if self.shuffle.started {
                    (self.shuffle.cursor + n - 1) % n
                } else {
                    n - 1
                };
                self.step_shuffle_to(pos);
            }
        }
        self.current()
    }

    #[must_use]
    pub const fn mode(&self) -> PlayMode {
        self.mode
    }

    /// Switch play mode. Entering (or re-entering) shuffle regenerates the permutation.
    pub fn set_mode(&mut self, mode: PlayMode) {
        self.mode = mode;
        if mode == PlayMode::Shuffle {
            self.regenerate_shuffle();
        } else {
            self.shuffle = ShuffleOrder::default();
        }
        debug!("Play mode set to {}", mode);
    }

    /// Advance to the next mode in the cycle and return it.
    pub fn cycle_mode(&mut self) -> PlayMode {
        self.set_mode(self.mode.next());
        self.mode
    }

    #[must_use]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Current shuffle permutation; empty outside [`PlayMode::Shuffle`].
    #[must_use]
    pub fn shuffle_order(&self) -> &[usize] {
        &self.shuffle.order
    }

    fn on_contents_changed(&mut self) {
        if self.mode == PlayMode::Shuffle {
            self.regenerate_shuffle();
        }
    }

    fn step_shuffle_to(&mut self, pos: usize) {
        self.shuffle.cursor = pos;
        self.shuffle.started = true;
        self.current = self.shuffle.order.get(pos).copied();
    }

    /// Fresh random permutation of all indices with the cursor reset.
    ///
    /// With more than two tracks the current track is kept off the first slot
    /// so the next advance never repeats it.
    fn regenerate_shuffle(&mut self) {
        let n = self.tracks.len();
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut self.rng);

        if n > 2 && self.current.is_some() && order.first().copied() == self.current {
            let swap_with = self.rng.gen_range(1..n);
            order.swap(0, swap_with);
        }

        self.shuffle = ShuffleOrder {
            order,
            cursor: 0,
            started: false,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_of(n: usize, seed: u64) -> PlayQueue {
        let mut queue = PlayQueue::with_seed(seed);
        queue.extend((0..n).map(|i| Track::new(format!("/music/track{i}.mp3"))));
        queue
    }

    fn assert_bijection(queue: &PlayQueue) {
        let mut sorted = queue.shuffle_order().to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..queue.len()).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_queue() {
        let mut queue = PlayQueue::new();
        assert!(queue.is_empty());
        assert!(queue.current().is_none());
        assert_eq!(queue.current_index(), None);
        assert!(queue.advance().is_none());
        assert!(queue.retreat().is_none());
        assert!(!queue.remove(0));
        assert!(!queue.set_current(0));
    }

    #[test]
    fn test_sequential_stops_at_end() {
        let n = 4;
        let mut queue = queue_of(n, 1);
        assert!(queue.set_current(0));

        // From index 0, n - 1 more tracks remain
        for expected in 1..n {
            let track = queue.advance().map(|t| t.uri.clone());
            assert_eq!(track, Some(format!("/music/track{expected}.mp3")));
        }
        assert!(queue.advance().is_none());
        assert_eq!(queue.current_index(), Some(n - 1));
        assert!(queue.advance().is_none());
    }

    #[test]
    fn test_sequential_from_unset_returns_each_track_once() {
        let n = 5;
        let mut queue = queue_of(n, 1);
        for _ in 0..n {
            assert!(queue.advance().is_some());
        }
        assert!(queue.advance().is_none());
        assert_eq!(queue.current_index(), Some(n - 1));
    }

    #[test]
    fn test_sequential_retreat_stops_at_start() {
        let mut queue = queue_of(3, 1);
        queue.set_current(1);
        assert_eq!(queue.retreat().map(|t| t.title.clone()), Some("track0".to_string()));
        assert!(queue.retreat().is_none());
        assert_eq!(queue.current_index(), Some(0));
    }

    #[test]
    fn test_loop_one_repeats() {
        let mut queue = queue_of(3, 1);
        queue.set_mode(PlayMode::LoopOne);
        queue.set_current(2);
        for _ in 0..5 {
            assert_eq!(queue.advance().map(|t| t.title.clone()), Some("track2".to_string()));
        }
        assert_eq!(queue.retreat().map(|t| t.title.clone()), Some("track2".to_string()));
    }

    #[test]
    fn test_loop_all_wraps_both_ways() {
        let mut queue = queue_of(3, 1);
        queue.set_mode(PlayMode::LoopAll);
        queue.set_current(2);
        assert_eq!(queue.advance().map(|t| t.title.clone()), Some("track0".to_string()));
        assert_eq!(queue.retreat().map(|t| t.title.clone()), Some("track2".to_string()));
        assert_eq!(queue.retreat().map(|t| t.title.clone()), Some("track1".to_string()));
    }

    #[test]
    fn test_cycle_mode_order() {
        let mut queue = queue_of(3, 1);
        assert_eq!(queue.mode(), PlayMode::Sequential);
        assert_eq!(queue.cycle_mode(), PlayMode::LoopOne);
        assert_eq!(queue.cycle_mode(), PlayMode::LoopAll);
        assert_eq!(queue.cycle_mode(), PlayMode::Shuffle);
        assert_bijection(&queue);
        assert_eq!(queue.cycle_mode(), PlayMode::Sequential);
        assert!(queue.shuffle_order().is_empty());
    }

    #[test]
    fn test_shuffle_is_bijection_after_every_regeneration() {
        for seed in 0..20 {
            let mut queue = queue_of(7, seed);
            queue.set_mode(PlayMode::Shuffle);
            assert_bijection(&queue);

            queue.append(Track::new("/music/extra.mp3"));
            assert_bijection(&queue);

            assert!(queue.remove(3));
            assert_bijection(&queue);

            queue.set_mode(PlayMode::Shuffle);
            assert_bijection(&queue);
        }
    }

    #[test]
    fn test_shuffle_visits_every_track_once_per_cycle() {
        let n = 6;
        let mut queue = queue_of(n, 9);
        queue.set_mode(PlayMode::Shuffle);

        let mut seen: Vec<usize> = (0..n)
            .filter_map(|_| {
                queue.advance()?;
                queue.current_index()
            })
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..n).collect::<Vec<_>>());

        // Wraps around to the first slot of the permutation
        let first = queue.shuffle_order()[0];
        queue.advance();
        assert_eq!(queue.current_index(), Some(first));
    }

    #[test]
    fn test_shuffle_retreat_walks_permutation_backwards() {
        let mut queue = queue_of(5, 3);
        queue.set_mode(PlayMode::Shuffle);
        let order = queue.shuffle_order().to_vec();

        queue.advance();
        queue.advance();
        assert_eq!(queue.current_index(), Some(order[1]));
        queue.retreat();
        assert_eq!(queue.current_index(), Some(order[0]));
        queue.retreat();
        assert_eq!(queue.current_index(), Some(order[4]));
    }

    #[test]
    fn test_shuffle_avoids_repeating_current_first() {
        for seed in 0..200 {
            let mut queue = queue_of(4, seed);
            queue.set_current(2);
            queue.set_mode(PlayMode::Shuffle);
            assert_ne!(queue.shuffle_order()[0], 2, "seed {seed}");
            assert_ne!(queue.advance().map(|t| t.title.clone()), Some("track2".to_string()));
        }
    }

    #[test]
    fn test_set_current_syncs_shuffle_cursor() {
        let mut queue = queue_of(5, 11);
        queue.set_mode(PlayMode::Shuffle);
        let order = queue.shuffle_order().to_vec();

        assert!(queue.set_current(order[2]));
        queue.advance();
        assert_eq!(queue.current_index(), Some(order[3]));
    }

    #[test]
    fn test_remove_current_from_three() {
        for removed in 0..3 {
            let mut queue = queue_of(3, 1);
            queue.set_current(removed);
            assert!(queue.remove(removed));
            let current = queue.current_index().unwrap();
            assert!(current < queue.len());
        }

        let mut queue = queue_of(3, 1);
        queue.set_current(2);
        assert!(queue.remove(2));
        assert_eq!(queue.current_index(), Some(1));
        assert!(queue.remove(1));
        assert!(queue.remove(0));
        assert_eq!(queue.current_index(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_remove_before_current_keeps_track() {
        let mut queue = queue_of(4, 1);
        queue.set_current(2);
        assert!(queue.remove(0));
        assert_eq!(queue.current_index(), Some(1));
        assert_eq!(queue.current().map(|t| t.title.clone()), Some("track2".to_string()));
    }

    #[test]
    fn test_remove_in_shuffle_regenerates() {
        let mut queue = queue_of(5, 5);
        queue.set_mode(PlayMode::Shuffle);
        queue.advance();
        queue.advance();
        let current = queue.current_index().unwrap();
        assert!(queue.remove(current));
        assert_eq!(queue.shuffle_order().len(), 4);
        assert_bijection(&queue);
        assert!(queue.current_index().unwrap() < queue.len());
    }

    #[test]
    fn test_remove_out_of_range() {
        let mut queue = queue_of(2, 1);
        assert!(!queue.remove(2));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_clear() {
        let mut queue = queue_of(3, 1);
        queue.set_mode(PlayMode::Shuffle);
        queue.advance();
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.current_index(), None);
        assert!(queue.shuffle_order().is_empty());
        assert!(queue.advance().is_none());
    }
}
