//! What the control loop consumes from and publishes to the dashboard.

use std::sync::Arc;

use super::transport::{Track, TransportState, View};

/// Keyboard/command events understood by the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
  Quit,
  Next,
  Previous,
  TogglePause,
  ToggleShuffle,
  ToggleRepeat,
  ToggleMute,
  VolumeUp,
  VolumeDown,
  SeekForward,
  SeekBackward,
  SelectQueueIndex(usize),
  SwitchView,
}

/// Loop-level lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoopPhase {
  #[default]
  Idle,
  Loading,
  Playing,
  Paused,
  Stopped,
  Failed,
}

impl LoopPhase {
  pub fn is_terminal(self) -> bool {
    matches!(self, LoopPhase::Stopped | LoopPhase::Failed)
  }
}

/// Immutable per-tick view of the player.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
  pub phase: LoopPhase,
  pub queue: Arc<Vec<Track>>,
  pub current_index: usize,
  pub paused: bool,
  pub shuffle: bool,
  pub repeat: bool,
  pub volume: u8,
  pub muted: bool,
  pub view: View,
  /// Queue indices not yet played in the current shuffle cycle.
  pub shuffle_pool: Vec<usize>,
  /// Seconds elapsed; `None` while unknown (buffering or channel down).
  pub position: Option<f64>,
  pub duration: Option<f64>,
  pub status_message: Option<String>,
}

impl Snapshot {
  pub(crate) fn capture(
    phase: LoopPhase,
    state: &TransportState,
    telemetry: Telemetry,
    status_message: Option<String>,
  ) -> Self {
    Self {
      phase,
      queue: state.queue().clone(),
      current_index: state.current_index(),
      paused: state.paused(),
      shuffle: state.shuffle(),
      repeat: state.repeat(),
      volume: state.volume(),
      muted: state.muted(),
      view: state.view(),
      shuffle_pool: state.shuffle_pool().iter().copied().collect(),
      position: telemetry.position,
      duration: telemetry.duration,
      status_message,
    }
  }

  pub fn current_track(&self) -> Option<&Track> {
    self.queue.get(self.current_index)
  }

  /// Played fraction in `0.0..=1.0`, when both position and duration are known.
  pub fn progress(&self) -> Option<f64> {
    match (self.position, self.duration) {
      (Some(pos), Some(dur)) if dur > 0.0 => Some((pos / dur).clamp(0.0, 1.0)),
      _ => None,
    }
  }

  /// Whether `idx` was already played in the running shuffle cycle.
  pub fn played_this_cycle(&self, idx: usize) -> bool {
    self.shuffle && idx != self.current_index && !self.shuffle_pool.contains(&idx)
  }
}

/// Last known engine position and duration.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Telemetry {
  pub position: Option<f64>,
  pub duration: Option<f64>,
}

impl Telemetry {
  /// Seconds left, when both values are known and the duration is positive.
  pub fn remaining(&self) -> Option<f64> {
    match (self.position, self.duration) {
      (Some(pos), Some(dur)) if dur > 0.0 => Some(dur - pos),
      _ => None,
    }
  }
}
