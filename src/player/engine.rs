//! The control loop's view of the playback engine.

use crate::mpv::{IpcError, MpvCommand, MpvResponse, PropertyValue, SpawnError};

/// How a track start reached the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
  /// The live process loaded the new source in place.
  HotSwap,
  /// A new process was spawned.
  Spawned,
}

/// Playback engine: process supervision plus the IPC channel behind it.
///
/// Implemented by [`crate::mpv::MpvClient`]; tests drive the control loop
/// through an in-memory implementation.
#[allow(async_fn_in_trait)]
pub trait Engine {
  /// Start `source`, hot-swapping into a live session when possible and
  /// falling back to terminate + spawn otherwise.
  async fn play(&mut self, source: &str, volume: u8, muted: bool) -> Result<StartMode, SpawnError>;

  /// Send one command over the current channel.
  async fn send(&mut self, cmd: MpvCommand) -> Result<MpvResponse, IpcError>;

  /// Bounded attempt to re-open the channel of a still-running process.
  async fn reconnect(&mut self) -> Result<(), IpcError>;

  /// Whether a session (process + channel handle) exists at all.
  fn has_session(&self) -> bool;

  /// Non-blocking liveness poll of the engine process.
  fn is_alive(&mut self) -> bool;

  /// Quit, close the channel and stop the process. Idempotent.
  async fn shutdown(&mut self);

  /// Read a property.
  async fn get_property(&mut self, name: &str) -> Result<PropertyValue, IpcError> {
    Ok(self.send(MpvCommand::get_property(name)).await?.value())
  }
}
