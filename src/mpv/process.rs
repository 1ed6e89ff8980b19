//! MPV process detection, spawning and termination.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::process::{Child, Command};

use super::ipc::MpvIpc;
use super::protocol::MpvCommand;

#[derive(Error, Debug)]
pub enum SpawnError {
  #[error("MPV executable not found")]
  NotFound,
  #[error("Failed to spawn MPV: {0}")]
  SpawnFailed(#[from] std::io::Error),
  #[error("MPV did not open its IPC channel at {path} after {attempts} attempts")]
  ChannelTimeout { path: PathBuf, attempts: u32 },
}

/// Get the IPC socket/pipe path for the `seq`-th engine of this process.
///
/// The process id keeps concurrent player instances apart; the sequence
/// number keeps a respawned engine off a stale socket. `dir` is ignored on
/// Windows, where pipes live in their own namespace.
pub fn ipc_path(dir: &Path, seq: u32) -> PathBuf {
  let name = format!("musicalterm-{}-{}", std::process::id(), seq);
  #[cfg(windows)]
  {
    let _ = dir;
    PathBuf::from(format!(r"\\.\pipe\{}", name))
  }
  #[cfg(not(windows))]
  {
    dir.join(format!("{}.sock", name))
  }
}

/// Remove a leftover socket file.
pub fn cleanup_ipc(path: &Path) {
  #[cfg(not(windows))]
  {
    let _ = std::fs::remove_file(path);
  }
  // Windows named pipes are cleaned up automatically
  #[cfg(windows)]
  let _ = path;
}

/// Find MPV executable in common locations.
pub fn find_mpv() -> Option<PathBuf> {
  if let Ok(path) = which::which("mpv") {
    return Some(path);
  }

  #[cfg(windows)]
  let common_paths: &[&str] = &[
    r"C:\Program Files\mpv\mpv.exe",
    r"C:\Program Files (x86)\mpv\mpv.exe",
    r"C:\mpv\mpv.exe",
  ];
  #[cfg(target_os = "macos")]
  let common_paths: &[&str] = &["/usr/local/bin/mpv", "/opt/homebrew/bin/mpv"];
  #[cfg(all(not(windows), not(target_os = "macos")))]
  let common_paths: &[&str] = &["/usr/bin/mpv", "/usr/local/bin/mpv"];

  common_paths
    .iter()
    .map(PathBuf::from)
    .find(|p| p.exists())
}

/// Tunables for spawning and stopping the engine.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
  pub mpv_path: Option<PathBuf>,
  pub extra_args: Vec<String>,
  /// Directory for the per-session IPC sockets.
  pub socket_dir: PathBuf,
  pub connect_attempts: u32,
  pub connect_delay: Duration,
  pub ipc_timeout: Duration,
  pub terminate_timeout: Duration,
}

impl Default for SupervisorConfig {
  fn default() -> Self {
    Self {
      mpv_path: None,
      extra_args: Vec::new(),
      socket_dir: std::env::temp_dir(),
      connect_attempts: 20,
      connect_delay: Duration::from_millis(100),
      ipc_timeout: Duration::from_secs(2),
      terminate_timeout: Duration::from_secs(2),
    }
  }
}

/// A running engine process and the IPC channel to it.
pub struct Session {
  child: Child,
  ipc: MpvIpc,
  socket: PathBuf,
}

impl Session {
  pub(crate) fn from_parts(child: Child, ipc: MpvIpc, socket: PathBuf) -> Self {
    Self { child, ipc, socket }
  }

  pub fn ipc(&mut self) -> &mut MpvIpc {
    &mut self.ipc
  }

  pub fn socket(&self) -> &Path {
    &self.socket
  }

  /// Process id, or `None` once the process has been reaped.
  pub fn pid(&self) -> Option<u32> {
    self.child.id()
  }

  /// Non-blocking exit-status poll.
  pub fn is_alive(&mut self) -> bool {
    matches!(self.child.try_wait(), Ok(None))
  }

  fn exit_status(&mut self) -> Option<ExitStatus> {
    self.child.try_wait().ok().flatten()
  }
}

/// Owns spawning and stopping of engine processes.
pub struct Supervisor {
  config: SupervisorConfig,
  spawned: u32,
}

impl Supervisor {
  pub fn new(config: SupervisorConfig) -> Self {
    Self { config, spawned: 0 }
  }

  pub fn config(&self) -> &SupervisorConfig {
    &self.config
  }

  /// Spawn MPV playing `source` and wait for its IPC channel.
  pub async fn spawn(&mut self, source: &str, volume: u8, muted: bool) -> Result<Session, SpawnError> {
    let mpv_exe = self
      .config
      .mpv_path
      .clone()
      .or_else(find_mpv)
      .ok_or(SpawnError::NotFound)?;

    self.spawned += 1;
    let socket = ipc_path(&self.config.socket_dir, self.spawned);
    cleanup_ipc(&socket);

    log::info!("Spawning MPV: {:?} with IPC: {}", mpv_exe, socket.display());
    if !self.config.extra_args.is_empty() {
      log::info!("Extra MPV args: {:?}", self.config.extra_args);
    }

    let mut cmd = Command::new(&mpv_exe);
    cmd
      .arg(format!("--input-ipc-server={}", socket.display()))
      .arg("--no-video")
      .arg("--no-terminal")
      .arg("--keep-open=no")
      .arg("--ytdl-format=bestaudio/best")
      .arg(format!("--volume={}", volume))
      .arg(format!("--mute={}", if muted { "yes" } else { "no" }));

    for arg in &self.config.extra_args {
      cmd.arg(arg);
    }

    let mut child = cmd
      .arg("--")
      .arg(source)
      .stdin(Stdio::null())
      .stdout(Stdio::null())
      .stderr(Stdio::null())
      .kill_on_drop(true)
      .spawn()?;

    let mut ipc = MpvIpc::new(self.config.ipc_timeout);
    let attempts = self.config.connect_attempts.max(1);

    for attempt in 0..attempts {
      if attempt > 0 {
        tokio::time::sleep(self.config.connect_delay).await;
      }
      if let Ok(Some(status)) = child.try_wait() {
        log::warn!("MPV exited before opening its channel: {}", status);
        break;
      }
      if ipc.connect(&socket, 1, Duration::ZERO).await.is_ok() {
        log::info!("MPV client connected (pid {:?})", child.id());
        return Ok(Session::from_parts(child, ipc, socket));
      }
    }

    let _ = child.kill().await;
    cleanup_ipc(&socket);
    Err(SpawnError::ChannelTimeout {
      path: socket,
      attempts,
    })
  }

  /// Quit, close, then stop the process: graceful signal first, forced kill
  /// after the timeout. Safe on a session whose process is already gone.
  pub async fn terminate(&self, session: &mut Session) {
    if session.ipc.is_connected() {
      if let Err(e) = session.ipc.send(&MpvCommand::quit()).await {
        log::debug!("MPV quit command failed: {}", e);
      }
    }
    session.ipc.close();

    if let Some(status) = session.exit_status() {
      log::debug!("MPV already exited: {}", status);
      cleanup_ipc(&session.socket);
      return;
    }

    request_stop(&mut session.child);

    match tokio::time::timeout(self.config.terminate_timeout, session.child.wait()).await {
      Ok(Ok(status)) => log::info!("MPV process exited with: {}", status),
      Ok(Err(e)) => log::error!("wait() failed: {}", e),
      Err(_) => {
        log::warn!(
          "MPV still running after {:?}, killing",
          self.config.terminate_timeout
        );
        if let Err(e) = session.child.kill().await {
          log::error!("kill() failed: {}", e);
        }
      }
    }

    cleanup_ipc(&session.socket);
  }

  /// Re-open the channel of a live session without respawning.
  pub async fn reconnect(
    &self,
    session: &mut Session,
    attempts: u32,
    delay: Duration,
  ) -> Result<(), super::IpcError> {
    if !session.is_alive() {
      return Err(super::IpcError::NotConnected);
    }
    let socket = session.socket.clone();
    session.ipc.connect(&socket, attempts, delay).await
  }
}

#[cfg(unix)]
fn request_stop(child: &mut Child) {
  use nix::sys::signal::{kill, Signal};
  use nix::unistd::Pid;

  let Some(pid) = child.id() else {
    return;
  };
  log::debug!("Sending SIGTERM to MPV {}", pid);
  if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
    if e != nix::errno::Errno::ESRCH {
      log::warn!("Failed to send SIGTERM to {}: {}", pid, e);
    }
  }
}

#[cfg(not(unix))]
fn request_stop(child: &mut Child) {
  if let Err(e) = child.start_kill() {
    log::warn!("Failed to stop MPV: {}", e);
  }
}
