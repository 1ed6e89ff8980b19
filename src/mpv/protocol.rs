//! MPV JSON IPC protocol types.
//!
//! Reference: https://mpv.io/manual/master/#json-ipc
//!
//! Every message is one JSON object terminated by a single `\n`. The client
//! is strictly half-duplex, so commands carry no request id; unsolicited
//! events interleaved with responses are recognised and skipped by the
//! reader.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message delimiter on the IPC channel.
pub const DELIMITER: u8 = b'\n';

/// Upper bound of mpv's `volume` property with the default `--volume-max`.
pub const ENGINE_VOLUME_MAX: i64 = 150;

/// Command sent to MPV via IPC.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MpvCommand {
  pub command: Vec<Value>,
}

impl MpvCommand {
  pub fn new(args: Vec<Value>) -> Self {
    Self { command: args }
  }

  /// Replace the currently playing source without restarting the process.
  pub fn loadfile_replace(url: &str) -> Self {
    Self::new(vec!["loadfile".into(), url.into(), "replace".into()])
  }

  /// Seek relative to the current position; negative values rewind.
  pub fn seek_relative(seconds: f64) -> Self {
    Self::new(vec!["seek".into(), seconds.into(), "relative".into()])
  }

  /// Set pause state.
  pub fn set_pause(paused: bool) -> Self {
    Self::new(vec!["set_property".into(), "pause".into(), paused.into()])
  }

  /// Set volume, clamped to the engine range.
  pub fn set_volume(volume: i64) -> Self {
    let volume = volume.clamp(0, ENGINE_VOLUME_MAX);
    Self::new(vec!["set_property".into(), "volume".into(), volume.into()])
  }

  /// Set mute state.
  pub fn set_mute(muted: bool) -> Self {
    Self::new(vec!["set_property".into(), "mute".into(), muted.into()])
  }

  /// Get a property value.
  pub fn get_property(name: &str) -> Self {
    Self::new(vec!["get_property".into(), name.into()])
  }

  /// Cycle (toggle) a property.
  pub fn cycle(property: &str) -> Self {
    Self::new(vec!["cycle".into(), property.into()])
  }

  /// Quit MPV.
  pub fn quit() -> Self {
    Self::new(vec!["quit".into()])
  }

  /// The verb of this command, for logging.
  pub fn verb(&self) -> &str {
    self
      .command
      .first()
      .and_then(Value::as_str)
      .unwrap_or("<empty>")
  }

  /// Serialize to a single framed line including the trailing delimiter.
  pub fn to_frame(&self) -> Result<Vec<u8>, serde_json::Error> {
    let mut frame = serde_json::to_vec(self)?;
    frame.push(DELIMITER);
    Ok(frame)
  }
}

/// Response from MPV for a command.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MpvResponse {
  /// "success" or an error message. Absent on some bare data replies.
  #[serde(default)]
  pub error: Option<String>,
  /// Response data (command-specific).
  #[serde(default)]
  pub data: Option<Value>,
}

impl MpvResponse {
  /// Check if the command succeeded.
  pub fn is_success(&self) -> bool {
    matches!(self.error.as_deref(), None | Some("success"))
  }

  /// Convert the `data` payload into a typed property value.
  pub fn value(&self) -> PropertyValue {
    self
      .data
      .clone()
      .map(PropertyValue::from)
      .unwrap_or(PropertyValue::Null)
  }
}

/// Event sent by MPV (property changes, playback events, etc.).
#[derive(Debug, Clone, Deserialize)]
pub struct MpvEvent {
  /// Event type (e.g., "end-file", "start-file", "idle").
  pub event: String,
  /// Reason for end-file events (e.g., "eof", "stop", "quit", "error").
  pub reason: Option<String>,
}

/// Typed property values from MPV.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
  Bool(bool),
  Number(f64),
  String(String),
  Json(String),
  Null,
}

impl PropertyValue {
  pub fn as_f64(&self) -> Option<f64> {
    match self {
      PropertyValue::Number(n) => Some(*n),
      _ => None,
    }
  }

  pub fn as_bool(&self) -> Option<bool> {
    match self {
      PropertyValue::Bool(b) => Some(*b),
      _ => None,
    }
  }
}

impl From<Value> for PropertyValue {
  fn from(value: Value) -> Self {
    match value {
      Value::Bool(b) => PropertyValue::Bool(b),
      Value::Number(n) => PropertyValue::Number(n.as_f64().unwrap_or(0.0)),
      Value::String(s) => PropertyValue::String(s),
      Value::Array(_) | Value::Object(_) => PropertyValue::Json(value.to_string()),
      Value::Null => PropertyValue::Null,
    }
  }
}

/// Message received from MPV IPC (either response or event).
#[derive(Debug, Clone)]
pub enum MpvMessage {
  Response(MpvResponse),
  Event(MpvEvent),
}

/// A line that is valid JSON but neither a response nor an event.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
  #[error("invalid JSON: {0}")]
  Json(#[from] serde_json::Error),
  #[error("unrecognised message: {0}")]
  Unrecognised(String),
}

impl MpvMessage {
  /// Parse a JSON line from MPV.
  pub fn parse(line: &str) -> Result<Self, ParseError> {
    let value: Value = serde_json::from_str(line)?;
    let Some(object) = value.as_object() else {
      return Err(ParseError::Unrecognised(line.to_string()));
    };

    if object.contains_key("event") {
      Ok(MpvMessage::Event(serde_json::from_value(value)?))
    } else if object.contains_key("error") || object.contains_key("data") {
      Ok(MpvMessage::Response(serde_json::from_value(value)?))
    } else {
      Err(ParseError::Unrecognised(line.to_string()))
    }
  }
}
