//! Application configuration with persistence.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mpv::SupervisorConfig;
use crate::player::{LoopPolicy, VOLUME_MAX};

/// Largest cover-art edge in pixels; 48 terminal rows at two pixels a row.
pub const ART_SIZE_MAX: u32 = 96;

/// Errors that can occur while loading or saving the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to access config file {path}: {source}")]
  Io {
    path: PathBuf,
    source: std::io::Error,
  },

  #[error("malformed config file {path}: {source}")]
  Parse {
    path: PathBuf,
    source: serde_json::Error,
  },

  #[error("invalid configuration: {0}")]
  Invalid(String),
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
  /// Custom MPV executable path (None = auto-detect).
  #[serde(default)]
  pub mpv_path: Option<String>,

  /// Additional MPV command-line arguments.
  #[serde(default)]
  pub mpv_args: Vec<String>,

  /// Custom yt-dlp executable path (None = auto-detect).
  #[serde(default)]
  pub yt_dlp_path: Option<String>,

  /// Control loop tick interval in milliseconds.
  #[serde(default = "default_tick_interval_ms")]
  pub tick_interval_ms: u64,

  /// Remaining seconds below which a track counts as finished.
  #[serde(default = "default_end_threshold_secs")]
  pub end_threshold_secs: f64,

  /// Reconnect attempts per tick after the IPC channel breaks.
  #[serde(default = "default_reconnect_attempts")]
  pub reconnect_attempts: u32,

  #[serde(default = "default_reconnect_delay_ms")]
  pub reconnect_delay_ms: u64,

  /// Channel polls after spawning MPV before giving up.
  #[serde(default = "default_spawn_connect_attempts")]
  pub spawn_connect_attempts: u32,

  #[serde(default = "default_spawn_connect_delay_ms")]
  pub spawn_connect_delay_ms: u64,

  /// Deadline for one IPC round trip.
  #[serde(default = "default_ipc_timeout_ms")]
  pub ipc_timeout_ms: u64,

  /// Grace period between SIGTERM and kill.
  #[serde(default = "default_terminate_timeout_ms")]
  pub terminate_timeout_ms: u64,

  #[serde(default = "default_initial_volume")]
  pub initial_volume: u8,

  #[serde(default = "default_volume_step")]
  pub volume_step: u8,

  #[serde(default = "default_seek_step_secs")]
  pub seek_step_secs: f64,

  /// Side length of the cover art matrix.
  #[serde(default = "default_art_size")]
  pub art_size: u32,

  /// How long status messages stay visible.
  #[serde(default = "default_status_ttl_secs")]
  pub status_ttl_secs: f64,

  /// Read volume and mute back from MPV every this many ticks.
  #[serde(default = "default_telemetry_sync_ticks")]
  pub telemetry_sync_ticks: u32,
}

fn default_tick_interval_ms() -> u64 {
  100
}

fn default_end_threshold_secs() -> f64 {
  0.8
}

fn default_reconnect_attempts() -> u32 {
  3
}

fn default_reconnect_delay_ms() -> u64 {
  50
}

fn default_spawn_connect_attempts() -> u32 {
  20
}

fn default_spawn_connect_delay_ms() -> u64 {
  100
}

fn default_ipc_timeout_ms() -> u64 {
  2000
}

fn default_terminate_timeout_ms() -> u64 {
  2000
}

fn default_initial_volume() -> u8 {
  70
}

fn default_volume_step() -> u8 {
  5
}

fn default_seek_step_secs() -> f64 {
  10.0
}

fn default_art_size() -> u32 {
  30
}

fn default_status_ttl_secs() -> f64 {
  3.0
}

fn default_telemetry_sync_ticks() -> u32 {
  10
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      mpv_path: None,
      mpv_args: Vec::new(),
      yt_dlp_path: None,
      tick_interval_ms: default_tick_interval_ms(),
      end_threshold_secs: default_end_threshold_secs(),
      reconnect_attempts: default_reconnect_attempts(),
      reconnect_delay_ms: default_reconnect_delay_ms(),
      spawn_connect_attempts: default_spawn_connect_attempts(),
      spawn_connect_delay_ms: default_spawn_connect_delay_ms(),
      ipc_timeout_ms: default_ipc_timeout_ms(),
      terminate_timeout_ms: default_terminate_timeout_ms(),
      initial_volume: default_initial_volume(),
      volume_step: default_volume_step(),
      seek_step_secs: default_seek_step_secs(),
      art_size: default_art_size(),
      status_ttl_secs: default_status_ttl_secs(),
      telemetry_sync_ticks: default_telemetry_sync_ticks(),
    }
  }
}

impl AppConfig {
  /// `<config_dir>/musicalterm/config.json`, when the platform has one.
  pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("musicalterm").join("config.json"))
  }

  /// Load from `path`. A missing file yields the defaults, which are then
  /// written back so the user has something to edit.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
      Ok(contents) => contents,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        log::info!("No config at {}, writing defaults", path.display());
        let config = Self::default();
        if let Err(e) = config.save(path) {
          log::warn!("Could not write default config: {}", e);
        }
        return Ok(config);
      }
      Err(source) => {
        return Err(ConfigError::Io {
          path: path.to_path_buf(),
          source,
        })
      }
    };

    let config: Self = serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    config.validate().map_err(ConfigError::Invalid)?;
    log::info!("Loaded config from {}", path.display());
    Ok(config)
  }

  /// Write as pretty JSON, creating parent directories.
  pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
    let io_err = |source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    };
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    std::fs::write(path, json).map_err(io_err)
  }

  /// Validate configuration values.
  pub fn validate(&self) -> Result<(), String> {
    if self.tick_interval_ms == 0 {
      return Err("Tick interval must be greater than zero".to_string());
    }
    if !(self.end_threshold_secs > 0.0) {
      return Err("End threshold must be positive".to_string());
    }
    if self.reconnect_attempts == 0 || self.spawn_connect_attempts == 0 {
      return Err("Connection attempts must be at least 1".to_string());
    }
    if self.initial_volume > VOLUME_MAX {
      return Err(format!("Initial volume must be between 0 and {}", VOLUME_MAX));
    }
    if self.art_size == 0 || self.art_size > ART_SIZE_MAX {
      return Err(format!("Art size must be between 1 and {}", ART_SIZE_MAX));
    }
    if !(self.seek_step_secs > 0.0) || !(self.status_ttl_secs >= 0.0) {
      return Err("Seek step and status duration must be positive".to_string());
    }
    Ok(())
  }

  pub fn mpv_path(&self) -> Option<PathBuf> {
    non_empty_path(self.mpv_path.as_deref())
  }

  pub fn yt_dlp_path(&self) -> Option<PathBuf> {
    non_empty_path(self.yt_dlp_path.as_deref())
  }

  pub fn reconnect_delay(&self) -> Duration {
    Duration::from_millis(self.reconnect_delay_ms)
  }

  pub fn supervisor_config(&self) -> SupervisorConfig {
    SupervisorConfig {
      mpv_path: self.mpv_path(),
      extra_args: self.mpv_args.clone(),
      connect_attempts: self.spawn_connect_attempts,
      connect_delay: Duration::from_millis(self.spawn_connect_delay_ms),
      ipc_timeout: Duration::from_millis(self.ipc_timeout_ms),
      terminate_timeout: Duration::from_millis(self.terminate_timeout_ms),
      ..SupervisorConfig::default()
    }
  }

  pub fn loop_policy(&self) -> LoopPolicy {
    LoopPolicy {
      tick: Duration::from_millis(self.tick_interval_ms),
      end_threshold: self.end_threshold_secs,
      volume_step: self.volume_step,
      seek_step: self.seek_step_secs,
      status_ttl: Duration::from_secs_f64(self.status_ttl_secs),
      telemetry_sync_ticks: self.telemetry_sync_ticks,
    }
  }
}

fn non_empty_path(path: Option<&str>) -> Option<PathBuf> {
  path
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(PathBuf::from)
}
