//! File logging. The terminal belongs to the dashboard, so records go to a
//! file instead of stdout.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

/// `<data_dir>/musicalterm/musicalterm.log`, falling back to the temp dir.
pub fn default_log_path() -> PathBuf {
  dirs::data_dir()
    .unwrap_or_else(std::env::temp_dir)
    .join("musicalterm")
    .join("musicalterm.log")
}

/// Install a subscriber appending to `path`. `log` records are bridged.
///
/// The filter comes from `RUST_LOG` and defaults to `info`.
pub fn init_file_logging(path: &Path) -> io::Result<()> {
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent)?;
  }
  let file = OpenOptions::new().create(true).append(true).open(path)?;
  let writer = Arc::new(Mutex::new(file));

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  let _ = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_ansi(false)
    .with_writer(move || FileLogWriter(Arc::clone(&writer)))
    .try_init();
  Ok(())
}

struct FileLogWriter(Arc<Mutex<File>>);

impl Write for FileLogWriter {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    self.0.lock().write_all(buf)?;
    Ok(buf.len())
  }

  fn flush(&mut self) -> io::Result<()> {
    self.0.lock().flush()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_log_path_names_the_app() {
    let path = default_log_path();
    assert!(path.ends_with("musicalterm/musicalterm.log"));
  }

  #[test]
  fn test_init_creates_log_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logs").join("test.log");
    init_file_logging(&path).unwrap();
    assert!(path.exists());
  }
}
