//! Half-duplex IPC connection to MPV.
//!
//! Handles platform-specific socket/pipe connections. A command is written,
//! then lines are read until the matching response arrives; events that mpv
//! pushes in between are skipped. No second command is written before the
//! previous response has been consumed.

use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use super::protocol::{MpvCommand, MpvMessage, MpvResponse, DELIMITER};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IpcError {
  /// No channel is open; returned immediately without blocking.
  #[error("IPC channel not connected")]
  NotConnected,
  /// The channel broke mid-command and has been invalidated.
  #[error("IPC channel lost: {0}")]
  ChannelLost(String),
  /// MPV answered with an error marker; the channel stays usable.
  #[error("MPV error: {0}")]
  Command(String),
}

impl IpcError {
  /// Whether the caller should try to reconnect before the next command.
  pub fn is_channel_failure(&self) -> bool {
    matches!(self, IpcError::NotConnected | IpcError::ChannelLost(_))
  }
}

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One open connection: a buffered read half and a write half.
struct Channel {
  reader: BufReader<BoxedReader>,
  writer: BoxedWriter,
}

/// MPV IPC client. Holds at most one open channel.
pub struct MpvIpc {
  channel: Option<Channel>,
  timeout: Duration,
  line: Vec<u8>,
}

impl MpvIpc {
  /// Create a client with no channel attached.
  pub fn new(timeout: Duration) -> Self {
    Self {
      channel: None,
      timeout,
      line: Vec::with_capacity(256),
    }
  }

  /// Connect to MPV IPC socket/pipe, retrying with a fixed delay.
  pub async fn connect(
    &mut self,
    path: &Path,
    attempts: u32,
    delay: Duration,
  ) -> Result<(), IpcError> {
    self.close();
    let mut last_error = None;

    for attempt in 0..attempts.max(1) {
      if attempt > 0 {
        tokio::time::sleep(delay).await;
      }

      match Self::try_connect(path).await {
        Ok(channel) => {
          log::debug!("IPC connected to {} on attempt {}", path.display(), attempt + 1);
          self.channel = Some(channel);
          return Ok(());
        }
        Err(e) => {
          log::debug!("IPC connect attempt {} failed: {}", attempt + 1, e);
          last_error = Some(e);
        }
      }
    }

    Err(IpcError::ChannelLost(
      last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "unknown error".into()),
    ))
  }

  #[cfg(windows)]
  async fn try_connect(path: &Path) -> std::io::Result<Channel> {
    use tokio::net::windows::named_pipe::ClientOptions;

    let client = ClientOptions::new().open(path)?;
    let (reader, writer) = tokio::io::split(client);
    Ok(Channel {
      reader: BufReader::new(Box::new(reader)),
      writer: Box::new(writer),
    })
  }

  #[cfg(not(windows))]
  async fn try_connect(path: &Path) -> std::io::Result<Channel> {
    use tokio::net::UnixStream;

    let stream = UnixStream::connect(path).await?;
    let (reader, writer) = stream.into_split();
    Ok(Channel {
      reader: BufReader::new(Box::new(reader)),
      writer: Box::new(writer),
    })
  }

  /// Attach an already-open stream pair as the channel.
  pub fn attach<R, W>(&mut self, reader: R, writer: W)
  where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
  {
    self.channel = Some(Channel {
      reader: BufReader::new(Box::new(reader)),
      writer: Box::new(writer),
    });
  }

  /// Check if a channel is open.
  pub fn is_connected(&self) -> bool {
    self.channel.is_some()
  }

  /// Send a command and wait (bounded) for its response.
  ///
  /// Any I/O failure, malformed line, or timeout drops the channel and
  /// yields [`IpcError::ChannelLost`]. Nothing is retried here.
  pub async fn send(&mut self, cmd: &MpvCommand) -> Result<MpvResponse, IpcError> {
    let channel = self.channel.as_mut().ok_or(IpcError::NotConnected)?;
    let frame = cmd
      .to_frame()
      .map_err(|e| IpcError::Command(format!("unserializable command: {}", e)))?;

    log::trace!("Sending MPV command: {}", cmd.verb());

    let outcome = tokio::time::timeout(
      self.timeout,
      round_trip(channel, &frame, &mut self.line),
    )
    .await
    .unwrap_or_else(|_| Err(IpcError::ChannelLost("response timed out".into())));

    match outcome {
      Ok(response) if response.is_success() => Ok(response),
      Ok(response) => Err(IpcError::Command(
        response.error.unwrap_or_else(|| "unknown error".into()),
      )),
      Err(e) => {
        log::warn!("MPV IPC '{}' failed: {}", cmd.verb(), e);
        self.channel = None;
        Err(e)
      }
    }
  }

  /// Close the connection. Safe to call when already closed.
  pub fn close(&mut self) {
    if self.channel.take().is_some() {
      log::debug!("MPV IPC channel closed");
    }
    self.line.clear();
  }
}

async fn round_trip(
  channel: &mut Channel,
  frame: &[u8],
  line: &mut Vec<u8>,
) -> Result<MpvResponse, IpcError> {
  let lost = |e: std::io::Error| IpcError::ChannelLost(e.to_string());

  channel.writer.write_all(frame).await.map_err(lost)?;
  channel.writer.flush().await.map_err(lost)?;

  loop {
    line.clear();
    let read = channel
      .reader
      .read_until(DELIMITER, line)
      .await
      .map_err(lost)?;

    if read == 0 {
      return Err(IpcError::ChannelLost("closed by engine".into()));
    }
    if line.last() != Some(&DELIMITER) {
      return Err(IpcError::ChannelLost("closed mid-message".into()));
    }

    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
      continue;
    }

    match MpvMessage::parse(text) {
      Ok(MpvMessage::Response(response)) => return Ok(response),
      Ok(MpvMessage::Event(event)) => {
        log::debug!("MPV event while awaiting response: {} {:?}", event.event, event.reason);
      }
      Err(e) => return Err(IpcError::ChannelLost(format!("malformed response: {}", e))),
    }
  }
}

#[cfg(all(test, unix))]
mod tests {
  use super::*;
  use crate::mpv::testing::FakeMpv;
  use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

  const TIMEOUT: Duration = Duration::from_millis(500);

  /// Attach one end of an in-memory pipe and hand back the other end.
  fn attached() -> (MpvIpc, tokio::io::DuplexStream) {
    let (client, server) = tokio::io::duplex(4096);
    let (reader, writer) = tokio::io::split(client);
    let mut ipc = MpvIpc::new(TIMEOUT);
    ipc.attach(reader, writer);
    (ipc, server)
  }

  #[tokio::test]
  async fn test_send_without_channel_is_not_connected() {
    let mut ipc = MpvIpc::new(TIMEOUT);
    let started = std::time::Instant::now();
    let err = ipc.send(&MpvCommand::get_property("volume")).await.unwrap_err();
    assert_eq!(err, IpcError::NotConnected);
    assert!(started.elapsed() < Duration::from_millis(50));
  }

  #[tokio::test]
  async fn test_partial_reads_are_buffered_until_delimiter() {
    let (mut ipc, server) = attached();
    tokio::spawn(async move {
      let mut server = BufReader::new(server);
      let mut request = String::new();
      server.read_line(&mut request).await.unwrap();
      let stream = server.get_mut();
      stream.write_all(br#"{"data":4"#).await.unwrap();
      stream.flush().await.unwrap();
      tokio::time::sleep(Duration::from_millis(30)).await;
      stream.write_all(b"2,\"error\":\"success\"}\n").await.unwrap();
    });

    let response = ipc.send(&MpvCommand::get_property("volume")).await.unwrap();
    assert_eq!(response.value().as_f64(), Some(42.0));
    assert!(ipc.is_connected());
  }

  #[tokio::test]
  async fn test_events_before_response_are_skipped() {
    let (mut ipc, server) = attached();
    tokio::spawn(async move {
      let mut server = BufReader::new(server);
      let mut request = String::new();
      server.read_line(&mut request).await.unwrap();
      let stream = server.get_mut();
      stream
        .write_all(b"{\"event\":\"playback-restart\"}\n\n{\"error\":\"success\"}\n")
        .await
        .unwrap();
    });

    let response = ipc.send(&MpvCommand::set_pause(true)).await.unwrap();
    assert!(response.is_success());
  }

  #[tokio::test]
  async fn test_closed_channel_is_invalidated() {
    let (mut ipc, server) = attached();
    drop(server);

    let err = ipc.send(&MpvCommand::get_property("time-pos")).await.unwrap_err();
    assert!(matches!(err, IpcError::ChannelLost(_)));
    assert!(!ipc.is_connected());

    let err = ipc.send(&MpvCommand::get_property("time-pos")).await.unwrap_err();
    assert_eq!(err, IpcError::NotConnected);
  }

  #[tokio::test]
  async fn test_malformed_response_is_channel_lost() {
    let (mut ipc, server) = attached();
    tokio::spawn(async move {
      let mut server = BufReader::new(server);
      let mut request = String::new();
      server.read_line(&mut request).await.unwrap();
      server.get_mut().write_all(b"}{ nonsense\n").await.unwrap();
    });

    let err = ipc.send(&MpvCommand::get_property("duration")).await.unwrap_err();
    assert!(matches!(err, IpcError::ChannelLost(_)));
    assert!(!ipc.is_connected());
  }

  #[tokio::test]
  async fn test_silent_engine_times_out() {
    let (client, _server) = tokio::io::duplex(4096);
    let (reader, writer) = tokio::io::split(client);
    let mut ipc = MpvIpc::new(Duration::from_millis(50));
    ipc.attach(reader, writer);

    let err = ipc.send(&MpvCommand::get_property("duration")).await.unwrap_err();
    assert!(matches!(err, IpcError::ChannelLost(_)));
    assert!(!ipc.is_connected());
  }

  #[tokio::test]
  async fn test_error_marker_keeps_channel() {
    let (mut ipc, server) = attached();
    tokio::spawn(async move {
      let mut server = BufReader::new(server);
      let mut request = String::new();
      server.read_line(&mut request).await.unwrap();
      server
        .get_mut()
        .write_all(b"{\"error\":\"property unavailable\"}\n")
        .await
        .unwrap();
    });

    let err = ipc.send(&MpvCommand::get_property("time-pos")).await.unwrap_err();
    assert_eq!(err, IpcError::Command("property unavailable".into()));
    assert!(ipc.is_connected());
  }

  #[tokio::test]
  async fn test_volume_round_trip_over_unix_socket() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeMpv::start(dir.path().join("mpv.sock"));

    let mut ipc = MpvIpc::new(TIMEOUT);
    ipc
      .connect(fake.path(), 5, Duration::from_millis(10))
      .await
      .unwrap();

    ipc.send(&MpvCommand::set_volume(42)).await.unwrap();
    let response = ipc.send(&MpvCommand::get_property("volume")).await.unwrap();
    assert_eq!(response.value().as_f64(), Some(42.0));
  }

  #[tokio::test]
  async fn test_connect_to_missing_socket_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut ipc = MpvIpc::new(TIMEOUT);
    let err = ipc
      .connect(&dir.path().join("absent.sock"), 2, Duration::from_millis(5))
      .await
      .unwrap_err();
    assert!(matches!(err, IpcError::ChannelLost(_)));
    assert!(!ipc.is_connected());
  }
}
