//! High-level MPV client: one supervised process and its IPC channel.

use std::time::Duration;

use super::ipc::IpcError;
use super::process::{Session, SpawnError, Supervisor, SupervisorConfig};
use super::protocol::{MpvCommand, MpvResponse};
use crate::player::{Engine, StartMode};

/// High-level MPV client. Holds at most one live session.
pub struct MpvClient {
  supervisor: Supervisor,
  session: Option<Session>,
  reconnect_attempts: u32,
  reconnect_delay: Duration,
}

impl MpvClient {
  /// Create a new MPV client. No process is started until the first track.
  pub fn new(config: SupervisorConfig, reconnect_attempts: u32, reconnect_delay: Duration) -> Self {
    Self {
      supervisor: Supervisor::new(config),
      session: None,
      reconnect_attempts,
      reconnect_delay,
    }
  }

  #[cfg(test)]
  pub(crate) fn with_session(config: SupervisorConfig, session: Session) -> Self {
    let mut client = Self::new(config, 3, Duration::from_millis(10));
    client.session = Some(session);
    client
  }

  async fn try_hot_swap(session: &mut Session, source: &str) -> Result<(), IpcError> {
    if !session.is_alive() || !session.ipc().is_connected() {
      return Err(IpcError::NotConnected);
    }
    session.ipc().send(&MpvCommand::loadfile_replace(source)).await?;
    // A paused engine stays paused across loadfile.
    session.ipc().send(&MpvCommand::set_pause(false)).await?;
    Ok(())
  }
}

impl Engine for MpvClient {
  async fn play(&mut self, source: &str, volume: u8, muted: bool) -> Result<StartMode, SpawnError> {
    if let Some(session) = self.session.as_mut() {
      match Self::try_hot_swap(session, source).await {
        Ok(()) => {
          log::info!("Hot-swapped source into MPV (pid {:?})", session.pid());
          return Ok(StartMode::HotSwap);
        }
        Err(e) => log::info!("Hot-swap unavailable ({}), respawning MPV", e),
      }
    }

    if let Some(mut old) = self.session.take() {
      self.supervisor.terminate(&mut old).await;
    }

    let session = self.supervisor.spawn(source, volume, muted).await?;
    self.session = Some(session);
    Ok(StartMode::Spawned)
  }

  async fn send(&mut self, cmd: MpvCommand) -> Result<MpvResponse, IpcError> {
    match self.session.as_mut() {
      Some(session) => session.ipc().send(&cmd).await,
      None => Err(IpcError::NotConnected),
    }
  }

  async fn reconnect(&mut self) -> Result<(), IpcError> {
    let session = self.session.as_mut().ok_or(IpcError::NotConnected)?;
    self
      .supervisor
      .reconnect(session, self.reconnect_attempts, self.reconnect_delay)
      .await?;
    log::info!("MPV IPC channel re-established");
    Ok(())
  }

  fn has_session(&self) -> bool {
    self.session.is_some()
  }

  fn is_alive(&mut self) -> bool {
    self.session.as_mut().map(Session::is_alive).unwrap_or(false)
  }

  async fn shutdown(&mut self) {
    if let Some(mut session) = self.session.take() {
      self.supervisor.terminate(&mut session).await;
      log::info!("MPV client stopped");
    }
  }
}

#[cfg(all(test, unix))]
mod tests {
  use super::*;
  use crate::mpv::process::ipc_path;
  use crate::mpv::testing::{start_later, stub_mpv, FakeMpv};
  use crate::mpv::MpvIpc;
  use serde_json::json;
  use tokio::process::Command;

  fn config() -> SupervisorConfig {
    SupervisorConfig {
      mpv_path: Some("/nonexistent/mpv-binary".into()),
      connect_attempts: 2,
      connect_delay: Duration::from_millis(5),
      ipc_timeout: Duration::from_millis(300),
      terminate_timeout: Duration::from_millis(500),
      ..SupervisorConfig::default()
    }
  }

  async fn client_on(fake: &FakeMpv) -> MpvClient {
    client_with(fake, config()).await
  }

  async fn client_with(fake: &FakeMpv, config: SupervisorConfig) -> MpvClient {
    let child = Command::new("sleep").arg("30").kill_on_drop(true).spawn().unwrap();
    let mut ipc = MpvIpc::new(Duration::from_millis(300));
    ipc
      .connect(fake.path(), 5, Duration::from_millis(10))
      .await
      .unwrap();
    // A full round trip means the fake is serving this connection, so a
    // later kick reaches it.
    ipc.send(&MpvCommand::get_property("mute")).await.unwrap();
    MpvClient::with_session(config, Session::from_parts(child, ipc, fake.path().to_path_buf()))
  }

  #[tokio::test]
  async fn test_play_hot_swaps_live_session() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeMpv::start(dir.path().join("mpv.sock"));
    fake.set("pause", json!(true));
    let mut client = client_on(&fake).await;

    let mode = client.play("https://example.com/b", 70, false).await.unwrap();

    assert_eq!(mode, StartMode::HotSwap);
    assert_eq!(fake.get("path"), Some(json!("https://example.com/b")));
    assert_eq!(fake.get("pause"), Some(json!(false)));
    assert_eq!(fake.connections(), 1);
  }

  #[tokio::test]
  async fn test_lost_channel_reconnects_without_respawn() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeMpv::start(dir.path().join("mpv.sock"));
    fake.set("volume", json!(55.0));
    let mut client = client_on(&fake).await;

    fake.kick();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let err = client.get_property("volume").await.unwrap_err();
    assert!(matches!(err, IpcError::ChannelLost(_)));

    client.reconnect().await.unwrap();
    let volume = client.get_property("volume").await.unwrap();
    assert_eq!(volume.as_f64(), Some(55.0));
    assert_eq!(fake.connections(), 2);
    assert!(client.is_alive());
  }

  #[tokio::test]
  async fn test_set_then_get_volume() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeMpv::start(dir.path().join("mpv.sock"));
    let mut client = client_on(&fake).await;

    client.send(MpvCommand::set_volume(42)).await.unwrap();
    let volume = client.get_property("volume").await.unwrap();
    assert_eq!(volume.as_f64(), Some(42.0));
  }

  #[tokio::test]
  async fn test_failed_hot_swap_falls_back_to_spawn() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeMpv::start(dir.path().join("mpv.sock"));
    let mut client = client_on(&fake).await;

    fake.kick();
    tokio::time::sleep(Duration::from_millis(20)).await;
    // The binary is missing, so the respawn itself fails.
    let err = client.play("https://example.com/c", 70, false).await.unwrap_err();

    assert!(matches!(err, SpawnError::SpawnFailed(_)));
    assert!(!client.has_session());
  }

  #[tokio::test]
  async fn test_lost_channel_on_hot_swap_respawns() {
    let dir = tempfile::tempdir().unwrap();
    let old = FakeMpv::start(dir.path().join("old.sock"));
    let config = SupervisorConfig {
      mpv_path: Some(stub_mpv(dir.path())),
      socket_dir: dir.path().to_path_buf(),
      connect_attempts: 100,
      connect_delay: Duration::from_millis(10),
      ..config()
    };
    let mut client = client_with(&old, config).await;

    old.kick();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let fresh = start_later(ipc_path(dir.path(), 1), Duration::from_millis(50));
    let mode = client.play("https://example.com/d", 70, false).await.unwrap();
    let fresh = fresh.await.unwrap();

    assert_eq!(mode, StartMode::Spawned);
    assert!(client.is_alive());
    let volume = client.get_property("volume").await.unwrap();
    assert_eq!(volume.as_f64(), Some(100.0));
    assert_eq!(fresh.connections(), 1);
    assert_eq!(old.connections(), 1);

    client.shutdown().await;
    assert!(fresh.verbs().contains(&"quit".to_string()));
  }

  #[tokio::test]
  async fn test_send_without_session() {
    let mut client = MpvClient::new(config(), 1, Duration::from_millis(1));
    let err = client.send(MpvCommand::set_pause(true)).await.unwrap_err();
    assert_eq!(err, IpcError::NotConnected);
    assert_eq!(client.reconnect().await.unwrap_err(), IpcError::NotConnected);
    assert!(!client.is_alive());
  }

  #[tokio::test]
  async fn test_shutdown_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeMpv::start(dir.path().join("mpv.sock"));
    let mut client = client_on(&fake).await;

    client.shutdown().await;
    client.shutdown().await;

    assert!(!client.has_session());
    assert!(fake.verbs().contains(&"quit".to_string()));
  }
}
