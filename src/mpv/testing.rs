//! In-process stand-in for an mpv IPC server, for tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Write an executable that accepts any mpv arguments and just stays alive,
/// so a test can play the engine's process side while a [`FakeMpv`] plays
/// its socket.
pub(crate) fn stub_mpv(dir: &Path) -> PathBuf {
  use std::os::unix::fs::PermissionsExt;

  let path = dir.join("mpv-stub");
  std::fs::write(&path, "#!/bin/sh\nexec sleep 30\n").expect("write mpv stub");
  std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod mpv stub");
  path
}

/// Bind a [`FakeMpv`] at `path` after `delay`, once the supervisor has
/// cleared any stale socket there.
pub(crate) fn start_later(path: PathBuf, delay: Duration) -> JoinHandle<FakeMpv> {
  tokio::spawn(async move {
    tokio::time::sleep(delay).await;
    FakeMpv::start(path)
  })
}

struct Shared {
  props: Mutex<HashMap<String, Value>>,
  commands: Mutex<Vec<Vec<Value>>>,
  connections: AtomicUsize,
}

/// Fake mpv listening on a Unix socket. Keeps a property table and a log of
/// received commands.
pub(crate) struct FakeMpv {
  path: PathBuf,
  shared: Arc<Shared>,
  kick_tx: watch::Sender<u64>,
  task: JoinHandle<()>,
}

impl FakeMpv {
  /// Bind `path` and start accepting connections.
  pub fn start(path: PathBuf) -> Self {
    let listener = UnixListener::bind(&path).expect("bind fake mpv socket");
    let shared = Arc::new(Shared {
      props: Mutex::new(HashMap::from([
        ("volume".to_string(), json!(100.0)),
        ("mute".to_string(), json!(false)),
        ("pause".to_string(), json!(false)),
      ])),
      commands: Mutex::new(Vec::new()),
      connections: AtomicUsize::new(0),
    });
    let (kick_tx, kick_rx) = watch::channel(0u64);

    let accept_shared = shared.clone();
    let task = tokio::spawn(async move {
      while let Ok((stream, _)) = listener.accept().await {
        accept_shared.connections.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(serve(stream, accept_shared.clone(), kick_rx.clone()));
      }
    });

    Self {
      path,
      shared,
      kick_tx,
      task,
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn set(&self, name: &str, value: Value) {
    self.shared.props.lock().insert(name.to_string(), value);
  }

  pub fn get(&self, name: &str) -> Option<Value> {
    self.shared.props.lock().get(name).cloned()
  }

  /// Verbs of all commands received so far.
  pub fn verbs(&self) -> Vec<String> {
    self
      .shared
      .commands
      .lock()
      .iter()
      .filter_map(|c| c.first().and_then(Value::as_str).map(str::to_string))
      .collect()
  }

  /// Number of accepted connections.
  pub fn connections(&self) -> usize {
    self.shared.connections.load(Ordering::SeqCst)
  }

  /// Drop every open connection while continuing to listen.
  pub fn kick(&self) {
    self.kick_tx.send_modify(|generation| *generation += 1);
  }
}

impl Drop for FakeMpv {
  fn drop(&mut self) {
    self.task.abort();
    self.kick();
    let _ = std::fs::remove_file(&self.path);
  }
}

async fn serve(stream: UnixStream, shared: Arc<Shared>, mut kick: watch::Receiver<u64>) {
  kick.borrow_and_update();
  let (reader, mut writer) = stream.into_split();
  let mut lines = BufReader::new(reader).lines();

  loop {
    let line = tokio::select! {
      _ = kick.changed() => return,
      line = lines.next_line() => match line {
        Ok(Some(line)) => line,
        _ => return,
      },
    };

    let Ok(request) = serde_json::from_str::<Value>(&line) else {
      return;
    };
    let args = request["command"].as_array().cloned().unwrap_or_default();
    shared.commands.lock().push(args.clone());

    let (reply, quit) = apply(&shared, &args);
    if writer.write_all(reply.as_bytes()).await.is_err() || quit {
      return;
    }
  }
}

fn apply(shared: &Shared, args: &[Value]) -> (String, bool) {
  let ok = "{\"error\":\"success\"}\n".to_string();
  let verb = args.first().and_then(Value::as_str).unwrap_or_default();
  let name = args.get(1).and_then(Value::as_str).unwrap_or_default().to_string();
  let mut props = shared.props.lock();

  match verb {
    "set_property" => {
      props.insert(name, args.get(2).cloned().unwrap_or(Value::Null));
      (ok, false)
    }
    "get_property" => match props.get(&name) {
      Some(value) if !value.is_null() => {
        (format!("{}\n", json!({ "data": value, "error": "success" })), false)
      }
      _ => ("{\"error\":\"property unavailable\"}\n".to_string(), false),
    },
    "cycle" => {
      let flipped = !props.get(&name).and_then(Value::as_bool).unwrap_or(false);
      props.insert(name, json!(flipped));
      (ok, false)
    }
    "seek" => {
      let offset = args.get(1).and_then(Value::as_f64).unwrap_or(0.0);
      let pos = props.get("time-pos").and_then(Value::as_f64).unwrap_or(0.0);
      props.insert("time-pos".into(), json!((pos + offset).max(0.0)));
      (ok, false)
    }
    "loadfile" => {
      props.insert("path".into(), json!(name));
      props.insert("time-pos".into(), json!(0.0));
      (format!("{{\"event\":\"start-file\"}}\n{}", ok), false)
    }
    "quit" => (ok, true),
    _ => ("{\"error\":\"invalid parameter\"}\n".to_string(), false),
  }
}
