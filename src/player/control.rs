//! Fixed-cadence control loop.
//!
//! Each tick drains at most one input event, polls position and duration,
//! detects the end of the current track (or an engine crash) and publishes
//! a [`Snapshot`]. The loop is the only owner of [`TransportState`] and the
//! only caller of the [`Engine`].

use std::future::Future;
use std::time::Duration;

use async_channel::{Receiver, TryRecvError};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

use super::art::ArtTrigger;
use super::engine::Engine;
use super::snapshot::{InputEvent, LoopPhase, Snapshot, Telemetry};
use super::transport::{TransportState, View};
use crate::media::{MediaQueue, ResolveError};
use crate::mpv::{IpcError, MpvCommand, SpawnError};

const VOLUME_STATUS_TTL: Duration = Duration::from_millis(1500);
const SEEK_STATUS_TTL: Duration = Duration::from_millis(1000);

/// Conditions that end a playback session.
#[derive(Debug, Error)]
pub enum PlayerError {
  #[error("failed to load media: {0}")]
  Resolution(#[from] ResolveError),

  #[error("failed to start MPV: {0}")]
  Spawn(#[from] SpawnError),
}

/// Timing and step sizes of the loop.
#[derive(Debug, Clone)]
pub struct LoopPolicy {
  pub tick: Duration,
  /// Remaining seconds below which a track counts as finished.
  pub end_threshold: f64,
  pub volume_step: u8,
  pub seek_step: f64,
  pub status_ttl: Duration,
  /// Read volume and mute back from the engine every this many ticks.
  pub telemetry_sync_ticks: u32,
}

impl Default for LoopPolicy {
  fn default() -> Self {
    Self {
      tick: Duration::from_millis(100),
      end_threshold: 0.8,
      volume_step: 5,
      seek_step: 10.0,
      status_ttl: Duration::from_secs(3),
      telemetry_sync_ticks: 10,
    }
  }
}

/// The player's control loop.
pub struct ControlLoop<E, A = ()> {
  engine: E,
  state: TransportState,
  policy: LoopPolicy,
  art: A,
  input: Receiver<InputEvent>,
  snapshots: watch::Sender<Snapshot>,
  phase: LoopPhase,
  telemetry: Telemetry,
  end_armed: bool,
  status: Option<(String, Instant)>,
  ticks: u64,
}

impl<E: Engine, A: ArtTrigger> ControlLoop<E, A> {
  pub fn new(
    engine: E,
    state: TransportState,
    policy: LoopPolicy,
    art: A,
    input: Receiver<InputEvent>,
    snapshots: watch::Sender<Snapshot>,
  ) -> Self {
    Self {
      engine,
      state,
      policy,
      art,
      input,
      snapshots,
      phase: LoopPhase::Idle,
      telemetry: Telemetry::default(),
      end_armed: false,
      status: None,
      ticks: 0,
    }
  }

  pub fn phase(&self) -> LoopPhase {
    self.phase
  }

  pub fn state(&self) -> &TransportState {
    &self.state
  }

  /// Resolve the queue through `loading` and start its first track.
  ///
  /// Input is watched while the resolver runs: a quit (or a closed input
  /// channel) drops the resolution and stops the loop without starting the
  /// engine. Other keys are discarded.
  pub async fn load_from<F>(&mut self, loading: F) -> Result<(), PlayerError>
  where
    F: Future<Output = Result<MediaQueue, ResolveError>>,
  {
    self.begin_loading();
    tokio::pin!(loading);

    loop {
      let step = tokio::select! {
        result = &mut loading => Ok(result),
        event = self.input.recv() => Err(event.ok()),
      };
      match step {
        Ok(result) => return self.load(result).await,
        Err(Some(InputEvent::Quit)) | Err(None) => {
          log::info!("Quit while loading, abandoning resolution");
          self.quit().await;
          return Ok(());
        }
        Err(Some(event)) => log::debug!("Ignoring {:?} while loading", event),
      }
    }
  }

  fn begin_loading(&mut self) {
    self.phase = LoopPhase::Loading;
    self.set_status("◐  fetching playlist…", self.policy.status_ttl);
    self.publish();
  }

  /// Install the result of a queue load and start its first track.
  pub async fn load(&mut self, result: Result<MediaQueue, ResolveError>) -> Result<(), PlayerError> {
    match self.try_load(result).await {
      Ok(()) => Ok(()),
      Err(e) => {
        self.fail(&e).await;
        Err(e)
      }
    }
  }

  async fn try_load(&mut self, result: Result<MediaQueue, ResolveError>) -> Result<(), PlayerError> {
    let queue = result?;
    if queue.tracks.is_empty() {
      return Err(ResolveError::NoTracks.into());
    }
    log::info!(
      "Loaded queue '{}' with {} tracks",
      queue.title.as_deref().unwrap_or("untitled"),
      queue.tracks.len()
    );
    self.state.load_queue(queue.tracks);
    self.start(0, false).await?;
    self.publish();
    Ok(())
  }

  /// Tick until the loop reaches `Stopped` or `Failed`.
  pub async fn run(&mut self) -> Result<LoopPhase, PlayerError> {
    let mut interval = tokio::time::interval(self.policy.tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while !self.phase.is_terminal() {
      interval.tick().await;
      if let Err(e) = self.tick().await {
        self.fail(&e).await;
        return Err(e);
      }
    }
    Ok(self.phase)
  }

  /// One pass of the loop.
  pub async fn tick(&mut self) -> Result<(), PlayerError> {
    self.ticks += 1;

    self.handle_pending_input().await?;
    if self.phase.is_terminal() {
      return Ok(());
    }

    self.poll_telemetry().await;
    if self.policy.telemetry_sync_ticks > 0
      && self.ticks % u64::from(self.policy.telemetry_sync_ticks) == 0
    {
      self.sync_engine_settings().await;
    }
    self.check_end_of_track().await?;
    self.check_engine_exit().await?;

    self.publish();
    Ok(())
  }

  async fn handle_pending_input(&mut self) -> Result<(), PlayerError> {
    match self.input.try_recv() {
      Ok(event) => self.handle_input(event).await,
      Err(TryRecvError::Empty) => Ok(()),
      Err(TryRecvError::Closed) => {
        log::info!("Input channel closed, quitting");
        self.quit().await;
        Ok(())
      }
    }
  }

  async fn handle_input(&mut self, event: InputEvent) -> Result<(), PlayerError> {
    log::debug!("Input: {:?}", event);
    let ttl = self.policy.status_ttl;

    match event {
      InputEvent::Quit => self.quit().await,
      InputEvent::Next => {
        if let Some(next) = self.state.next_index() {
          self.start(next, true).await?;
        }
      }
      InputEvent::Previous => {
        if !self.state.queue().is_empty() {
          let previous = self.state.previous_index();
          self.start(previous, false).await?;
        }
      }
      InputEvent::SelectQueueIndex(idx) => {
        if idx < self.state.queue().len() {
          self.start(idx, true).await?;
          self.state.set_view(View::Player);
        }
      }
      InputEvent::TogglePause => {
        if self.state.queue().is_empty() {
          return Ok(());
        }
        let paused = self.state.toggle_pause();
        if !paused && self.engine.has_session() && !self.engine.is_alive() {
          log::info!("MPV exited while paused, restarting the current track");
          let current = self.state.current_index();
          return self.start(current, false).await;
        }
        self.phase = if paused {
          LoopPhase::Paused
        } else {
          LoopPhase::Playing
        };
        self.set_status(if paused { "⏸  paused" } else { "▶  resumed" }, ttl);
        self.command(MpvCommand::set_pause(paused)).await;
      }
      InputEvent::ToggleShuffle => {
        if self.state.toggle_shuffle() {
          let pool = self.state.shuffle_pool().len();
          self.set_status(format!("⇄  shuffle on  ·  {} tracks in pool", pool), ttl);
        } else {
          self.set_status("⇒  shuffle off", ttl);
        }
      }
      InputEvent::ToggleRepeat => {
        let repeat = self.state.toggle_repeat();
        self.set_status(format!("↺  repeat {}", on_off(repeat)), ttl);
      }
      InputEvent::ToggleMute => {
        let muted = self.state.toggle_mute();
        self.set_status(if muted { "✕  muted" } else { "✕  unmuted" }, ttl);
        self.command(MpvCommand::set_mute(muted)).await;
      }
      InputEvent::VolumeUp | InputEvent::VolumeDown => {
        let step = i32::from(self.policy.volume_step);
        let delta = if event == InputEvent::VolumeUp { step } else { -step };
        let volume = self.state.adjust_volume(delta);
        self.set_status(format!("♪  {}%", volume), VOLUME_STATUS_TTL);
        self.command(MpvCommand::set_volume(i64::from(volume))).await;
      }
      InputEvent::SeekForward | InputEvent::SeekBackward => {
        let step = if event == InputEvent::SeekForward {
          self.policy.seek_step
        } else {
          -self.policy.seek_step
        };
        if let Some(seconds) = self.state.seek_relative(step) {
          let icon = if seconds > 0.0 { "⏩  +" } else { "⏪  −" };
          self.set_status(format!("{}{} s", icon, seconds.abs()), SEEK_STATUS_TTL);
          self.command(MpvCommand::seek_relative(seconds)).await;
        }
      }
      InputEvent::SwitchView => {
        self.state.toggle_view();
      }
    }
    Ok(())
  }

  /// Read position and duration. A broken channel gets one bounded
  /// reconnect attempt per tick; values read as unknown until it is back.
  async fn poll_telemetry(&mut self) {
    if !self.engine.has_session() {
      self.telemetry = Telemetry::default();
      return;
    }

    match self.read_telemetry().await {
      Ok(telemetry) => self.telemetry = telemetry,
      Err(e) => {
        self.telemetry = Telemetry::default();
        if !e.is_channel_failure() {
          log::debug!("Telemetry read failed: {}", e);
          return;
        }
        if !self.engine.is_alive() {
          return;
        }
        match self.engine.reconnect().await {
          Ok(()) => {
            log::info!("Reconnected to MPV");
            self.set_status("⟳  reconnected", self.policy.status_ttl);
          }
          Err(e) => log::debug!("Reconnect failed: {}", e),
        }
      }
    }
  }

  async fn read_telemetry(&mut self) -> Result<Telemetry, IpcError> {
    let position = self.read_seconds("time-pos").await?;
    let duration = self.read_seconds("duration").await?;
    Ok(Telemetry { position, duration })
  }

  /// A property MPV reports as unavailable (idle, buffering) reads as `None`.
  async fn read_seconds(&mut self, name: &str) -> Result<Option<f64>, IpcError> {
    match self.engine.get_property(name).await {
      Ok(value) => Ok(value.as_f64()),
      Err(IpcError::Command(_)) => Ok(None),
      Err(e) => Err(e),
    }
  }

  /// Adopt volume and mute changes made on the engine side.
  async fn sync_engine_settings(&mut self) {
    if !self.engine.has_session() {
      return;
    }
    if let Ok(volume) = self.engine.get_property("volume").await {
      if let Some(volume) = volume.as_f64() {
        if self.state.sync_volume(volume) {
          log::debug!("Volume synced from MPV: {}", self.state.volume());
        }
      }
    }
    if let Ok(muted) = self.engine.get_property("mute").await {
      if let Some(muted) = muted.as_bool() {
        if self.state.sync_muted(muted) {
          log::debug!("Mute synced from MPV: {}", muted);
        }
      }
    }
  }

  async fn check_end_of_track(&mut self) -> Result<(), PlayerError> {
    if self.state.paused() || !self.engine.is_alive() {
      return Ok(());
    }

    let near_end = self
      .telemetry
      .remaining()
      .is_some_and(|remaining| remaining < self.policy.end_threshold);
    if !near_end {
      self.end_armed = false;
      return Ok(());
    }
    if self.end_armed {
      return Ok(());
    }

    self.end_armed = true;
    log::info!("Track {} finished", self.state.current_index());
    self.advance_after_end().await
  }

  async fn check_engine_exit(&mut self) -> Result<(), PlayerError> {
    if !self.engine.has_session() || self.engine.is_alive() || self.state.paused() {
      return Ok(());
    }

    if self.state.queue().is_empty() {
      log::warn!("MPV exited with an empty queue");
      self.engine.shutdown().await;
      self.phase = LoopPhase::Idle;
      return Ok(());
    }

    log::warn!("MPV exited unexpectedly, advancing");
    self.set_status("⚠  engine exited, advancing", self.policy.status_ttl);
    self.advance_after_end().await
  }

  async fn advance_after_end(&mut self) -> Result<(), PlayerError> {
    if self.state.repeat() {
      let current = self.state.current_index();
      return self.start(current, false).await;
    }
    match self.state.next_index() {
      Some(next) => self.start(next, true).await,
      None => Ok(()),
    }
  }

  async fn start(&mut self, idx: usize, push_history: bool) -> Result<(), PlayerError> {
    let Some(track) = self.state.start_track(idx, push_history) else {
      return Ok(());
    };
    self.telemetry = Telemetry::default();

    let mode = self
      .engine
      .play(&track.source, self.state.volume(), self.state.muted())
      .await?;
    log::info!("Playing track {} '{}' ({:?})", idx, track.title, mode);

    self.art.trigger(&track.source);
    self.phase = LoopPhase::Playing;
    self.set_status(format!("▶  {}", truncate(&track.title, 40)), self.policy.status_ttl);
    Ok(())
  }

  /// Send a command whose failure is absorbed into the status line.
  async fn command(&mut self, cmd: MpvCommand) {
    let verb = cmd.verb().to_string();
    if let Err(e) = self.engine.send(cmd).await {
      log::warn!("MPV {} failed: {}", verb, e);
      self.set_status(format!("⚠  {}", e), self.policy.status_ttl);
    }
  }

  async fn quit(&mut self) {
    log::info!("Quit requested");
    self.art.cancel();
    self.engine.shutdown().await;
    self.input.close();
    self.phase = LoopPhase::Stopped;
    self.telemetry = Telemetry::default();
    self.publish();
  }

  async fn fail(&mut self, error: &PlayerError) {
    log::error!("Playback failed: {}", error);
    self.art.cancel();
    self.engine.shutdown().await;
    self.input.close();
    self.phase = LoopPhase::Failed;
    self.set_status(format!("✕  {}", error), self.policy.status_ttl);
    self.publish();
  }

  fn set_status(&mut self, message: impl Into<String>, ttl: Duration) {
    self.status = Some((message.into(), Instant::now() + ttl));
  }

  fn current_status(&self) -> Option<String> {
    self
      .status
      .as_ref()
      .filter(|(_, until)| Instant::now() < *until)
      .map(|(message, _)| message.clone())
  }

  fn publish(&self) {
    let snapshot = Snapshot::capture(self.phase, &self.state, self.telemetry, self.current_status());
    self.snapshots.send_replace(snapshot);
  }
}

fn on_off(on: bool) -> &'static str {
  if on {
    "on"
  } else {
    "off"
  }
}

/// Cut `s` to `max` characters, marking the cut with an ellipsis.
pub(crate) fn truncate(s: &str, max: usize) -> String {
  if s.chars().count() <= max {
    return s.to_string();
  }
  let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
  out.push('…');
  out
}
