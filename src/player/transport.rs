//! Queue and transport state: current track, shuffle pool, history,
//! pause/repeat/shuffle/mute toggles and volume.
//!
//! Every transition is an in-memory mutation. Nothing here talks to the
//! engine; the control loop turns transitions into IPC commands.

use std::collections::VecDeque;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Upper bound of the volume the player itself allows.
pub const VOLUME_MAX: u8 = 100;

/// One playable entry of the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
  pub title: String,
  /// Opaque address handed to the engine.
  pub source: String,
}

impl Track {
  pub fn new(title: impl Into<String>, source: impl Into<String>) -> Self {
    Self {
      title: title.into(),
      source: source.into(),
    }
  }
}

/// Which main panel the dashboard shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum View {
  #[default]
  Player,
  Queue,
}

/// Authoritative playback state, owned by the control loop.
pub struct TransportState {
  queue: Arc<Vec<Track>>,
  current: usize,
  shuffle_pool: VecDeque<usize>,
  history: Vec<usize>,
  paused: bool,
  volume: u8,
  muted: bool,
  repeat: bool,
  shuffle: bool,
  view: View,
  rng: StdRng,
}

impl TransportState {
  pub fn new(volume: u8) -> Self {
    Self::with_rng(volume, StdRng::from_entropy())
  }

  /// State with a caller-provided RNG, for reproducible shuffles.
  pub fn with_rng(volume: u8, rng: StdRng) -> Self {
    Self {
      queue: Arc::new(Vec::new()),
      current: 0,
      shuffle_pool: VecDeque::new(),
      history: Vec::new(),
      paused: false,
      volume: volume.min(VOLUME_MAX),
      muted: false,
      repeat: false,
      shuffle: false,
      view: View::Player,
      rng,
    }
  }

  /// Replace the queue wholesale.
  pub fn load_queue(&mut self, tracks: Vec<Track>) {
    self.queue = Arc::new(tracks);
    self.current = 0;
    self.history.clear();
    self.shuffle_pool.clear();
    if self.shuffle {
      self.refill_pool();
    }
  }

  /// Make `idx` current. Returns the track, or `None` if `idx` is out of range.
  pub fn start_track(&mut self, idx: usize, push_history: bool) -> Option<Track> {
    let track = self.queue.get(idx)?.clone();
    if push_history && idx != self.current {
      self.history.push(self.current);
    }
    self.current = idx;
    self.shuffle_pool.retain(|&i| i != idx);
    self.paused = false;
    Some(track)
  }

  /// Index to play after the current one, or `None` for an empty queue.
  ///
  /// With shuffle on this consumes the pool, refilling it with a fresh
  /// permutation once drained.
  pub fn next_index(&mut self) -> Option<usize> {
    if self.queue.is_empty() {
      return None;
    }
    if !self.shuffle {
      return Some((self.current + 1) % self.queue.len());
    }
    if self.shuffle_pool.is_empty() {
      self.refill_pool();
    }
    Some(self.shuffle_pool.pop_front().unwrap_or(self.current))
  }

  /// Index to go back to: the top of the history, else the previous slot.
  pub fn previous_index(&mut self) -> usize {
    self
      .history
      .pop()
      .unwrap_or_else(|| self.current.saturating_sub(1))
  }

  pub fn toggle_pause(&mut self) -> bool {
    self.paused = !self.paused;
    self.paused
  }

  pub fn toggle_shuffle(&mut self) -> bool {
    self.shuffle = !self.shuffle;
    if self.shuffle {
      self.refill_pool();
    } else {
      self.shuffle_pool.clear();
    }
    self.shuffle
  }

  pub fn toggle_repeat(&mut self) -> bool {
    self.repeat = !self.repeat;
    self.repeat
  }

  pub fn toggle_mute(&mut self) -> bool {
    self.muted = !self.muted;
    self.muted
  }

  /// Change volume by `delta`, clamped to `0..=100`.
  pub fn adjust_volume(&mut self, delta: i32) -> u8 {
    self.volume = (self.volume as i32 + delta).clamp(0, VOLUME_MAX as i32) as u8;
    self.volume
  }

  /// Validate a relative seek. `None` when there is nothing to seek in.
  pub fn seek_relative(&self, seconds: f64) -> Option<f64> {
    (!self.queue.is_empty() && seconds.is_finite() && seconds != 0.0).then_some(seconds)
  }

  pub fn toggle_view(&mut self) -> View {
    self.view = match self.view {
      View::Player => View::Queue,
      View::Queue => View::Player,
    };
    self.view
  }

  pub fn set_view(&mut self, view: View) {
    self.view = view;
  }

  /// Adopt a volume reported by the engine.
  pub fn sync_volume(&mut self, engine_volume: f64) -> bool {
    if !engine_volume.is_finite() {
      return false;
    }
    let volume = engine_volume.round().clamp(0.0, VOLUME_MAX as f64) as u8;
    let changed = volume != self.volume;
    self.volume = volume;
    changed
  }

  /// Adopt a mute state reported by the engine.
  pub fn sync_muted(&mut self, muted: bool) -> bool {
    let changed = muted != self.muted;
    self.muted = muted;
    changed
  }

  pub fn set_shuffle(&mut self, on: bool) {
    if on != self.shuffle {
      self.toggle_shuffle();
    }
  }

  pub fn set_repeat(&mut self, on: bool) {
    self.repeat = on;
  }

  fn refill_pool(&mut self) {
    let mut pool: Vec<usize> = (0..self.queue.len()).filter(|&i| i != self.current).collect();
    pool.shuffle(&mut self.rng);
    self.shuffle_pool = pool.into();
  }

  pub fn queue(&self) -> &Arc<Vec<Track>> {
    &self.queue
  }

  pub fn current_index(&self) -> usize {
    self.current
  }

  pub fn current_track(&self) -> Option<&Track> {
    self.queue.get(self.current)
  }

  pub fn shuffle_pool(&self) -> &VecDeque<usize> {
    &self.shuffle_pool
  }

  pub fn history(&self) -> &[usize] {
    &self.history
  }

  pub fn paused(&self) -> bool {
    self.paused
  }

  pub fn volume(&self) -> u8 {
    self.volume
  }

  pub fn muted(&self) -> bool {
    self.muted
  }

  pub fn repeat(&self) -> bool {
    self.repeat
  }

  pub fn shuffle(&self) -> bool {
    self.shuffle
  }

  pub fn view(&self) -> View {
    self.view
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashSet;

  fn tracks(n: usize) -> Vec<Track> {
    (0..n)
      .map(|i| Track::new(format!("Track {}", i), format!("https://example.com/{}", i)))
      .collect()
  }

  fn state(n: usize, seed: u64) -> TransportState {
    let mut state = TransportState::with_rng(70, StdRng::seed_from_u64(seed));
    state.load_queue(tracks(n));
    state
  }

  #[test]
  fn test_shuffle_cycle_visits_every_other_index_once() {
    for n in 2..12 {
      for seed in 0..8 {
        let mut s = state(n, seed);
        s.start_track(n / 2, false);
        s.toggle_shuffle();
        let reset_at = s.current_index();

        let mut seen = HashSet::new();
        for _ in 0..n - 1 {
          let idx = s.next_index().unwrap();
          assert_ne!(idx, reset_at, "n={} seed={}", n, seed);
          assert!(seen.insert(idx), "repeat of {} before cycle end", idx);
        }
        assert_eq!(seen.len(), n - 1);
        assert!(s.shuffle_pool().is_empty());
      }
    }
  }

  #[test]
  fn test_drained_pool_refills_without_current() {
    let mut s = state(5, 3);
    s.toggle_shuffle();
    for _ in 0..4 {
      let idx = s.next_index().unwrap();
      s.start_track(idx, true);
    }
    assert!(s.shuffle_pool().is_empty());

    let current = s.current_index();
    let next = s.next_index().unwrap();
    assert_ne!(next, current);
    assert!(!s.shuffle_pool().contains(&current));
    assert_eq!(s.shuffle_pool().len(), 3);
  }

  #[test]
  fn test_single_track_shuffle_returns_current() {
    let mut s = state(1, 0);
    s.toggle_shuffle();
    assert_eq!(s.next_index(), Some(0));
    assert_eq!(s.next_index(), Some(0));
  }

  #[test]
  fn test_start_track_removes_from_pool_idempotently() {
    let mut s = state(6, 1);
    s.toggle_shuffle();
    assert!(s.shuffle_pool().contains(&4));

    s.start_track(4, true);
    assert!(!s.shuffle_pool().contains(&4));
    s.start_track(4, true);
    assert!(!s.shuffle_pool().contains(&4));
    assert_eq!(s.shuffle_pool().len(), 4);
    // Replaying the current track does not grow history.
    assert_eq!(s.history(), &[0]);
  }

  #[test]
  fn test_history_is_a_stack() {
    let mut s = state(10, 0);
    s.start_track(5, true);
    s.start_track(2, true);
    s.start_track(7, true);

    let back = s.previous_index();
    assert_eq!(back, 2);
    s.start_track(back, false);

    assert_eq!(s.previous_index(), 5);
  }

  #[test]
  fn test_previous_without_history_steps_back() {
    let mut s = state(4, 0);
    s.start_track(3, false);
    assert_eq!(s.previous_index(), 2);

    let mut s = state(4, 0);
    assert_eq!(s.previous_index(), 0);
  }

  #[test]
  fn test_next_wraps_without_shuffle() {
    let mut s = state(3, 0);
    assert_eq!(s.next_index(), Some(1));
    s.start_track(2, true);
    assert_eq!(s.next_index(), Some(0));
  }

  #[test]
  fn test_next_on_empty_queue() {
    let mut s = TransportState::with_rng(70, StdRng::seed_from_u64(0));
    assert_eq!(s.next_index(), None);
    assert!(s.start_track(0, true).is_none());
    assert_eq!(s.seek_relative(10.0), None);
  }

  #[test]
  fn test_volume_is_clamped() {
    for start in [0u8, 37, 100] {
      let mut s = TransportState::with_rng(start, StdRng::seed_from_u64(0));
      assert_eq!(s.adjust_volume(1000), 100);
      assert_eq!(s.adjust_volume(-1000), 0);
    }
    let mut s = TransportState::with_rng(70, StdRng::seed_from_u64(0));
    assert_eq!(s.adjust_volume(5), 75);
    assert_eq!(s.adjust_volume(-10), 65);
  }

  #[test]
  fn test_load_queue_resets_position_and_history() {
    let mut s = state(5, 0);
    s.toggle_shuffle();
    s.start_track(3, true);
    s.start_track(1, true);

    s.load_queue(tracks(4));
    assert_eq!(s.current_index(), 0);
    assert!(s.history().is_empty());
    assert_eq!(s.shuffle_pool().len(), 3);
    assert!(!s.shuffle_pool().contains(&0));
  }

  #[test]
  fn test_shuffle_off_clears_pool() {
    let mut s = state(5, 0);
    assert!(s.toggle_shuffle());
    assert_eq!(s.shuffle_pool().len(), 4);
    assert!(!s.toggle_shuffle());
    assert!(s.shuffle_pool().is_empty());
  }

  #[test]
  fn test_start_track_unpauses() {
    let mut s = state(2, 0);
    assert!(s.toggle_pause());
    s.start_track(1, true);
    assert!(!s.paused());
  }

  #[test]
  fn test_sync_from_engine() {
    let mut s = state(1, 0);
    assert!(s.sync_volume(130.0));
    assert_eq!(s.volume(), 100);
    assert!(!s.sync_volume(100.2));
    assert!(!s.sync_volume(f64::NAN));
    assert!(s.sync_muted(true));
    assert!(!s.sync_muted(true));
  }
}
