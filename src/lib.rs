use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

mod cli;
pub mod config;
mod logging;
pub mod media;
pub mod mpv;
pub mod player;
mod ui;

pub use cli::Cli;
pub use config::AppConfig;
use media::{HttpThumbnails, MediaResolver, YtDlpResolver};
use mpv::MpvClient;
use player::{ArtFetcher, ControlLoop, PlayerError, Snapshot, TransportState};

/// Upper bound for one yt-dlp invocation.
const RESOLVE_TIMEOUT: Duration = Duration::from_secs(120);

/// Entry point: set up logging and config, then play `cli.url`.
pub async fn run(cli: Cli) -> ExitCode {
  let log_path = cli.log_file.clone().unwrap_or_else(logging::default_log_path);
  if let Err(e) = logging::init_file_logging(&log_path) {
    eprintln!("musicalterm: cannot open log file {}: {}", log_path.display(), e);
  }
  log::info!("musicalterm {} starting", env!("CARGO_PKG_VERSION"));

  let config = match cli.config.clone().or_else(AppConfig::default_path) {
    Some(path) => match AppConfig::load(&path) {
      Ok(config) => config,
      Err(e) => {
        eprintln!("musicalterm: {}", e);
        return ExitCode::FAILURE;
      }
    },
    None => AppConfig::default(),
  };

  let Some(url) = cli.url.clone().or_else(prompt_url) else {
    return ExitCode::SUCCESS;
  };

  match play(&url, &cli, &config).await {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      eprintln!("musicalterm: {}", e);
      ExitCode::FAILURE
    }
  }
}

/// Ask for a URL on stdin. `None` on an empty answer or closed input.
fn prompt_url() -> Option<String> {
  println!("♪  Enter a YouTube / YouTube Music URL  ♪");
  println!("  • Single video   → https://www.youtube.com/watch?v=...");
  println!("  • Playlist       → https://www.youtube.com/playlist?list=...");
  println!("  • YT Music song  → https://music.youtube.com/watch?v=...");
  print!("URL › ");
  io::stdout().flush().ok()?;

  let mut line = String::new();
  io::stdin().lock().read_line(&mut line).ok()?;
  let url = line.trim();
  (!url.is_empty()).then(|| url.to_string())
}

async fn play(url: &str, cli: &Cli, config: &AppConfig) -> Result<(), PlayerError> {
  let resolver = Arc::new(YtDlpResolver::new(config.yt_dlp_path(), RESOLVE_TIMEOUT));

  let mut state = TransportState::new(cli.volume.unwrap_or(config.initial_volume));
  state.set_shuffle(cli.shuffle);
  state.set_repeat(cli.repeat);

  let fetcher = match HttpThumbnails::new(resolver.clone()) {
    Ok(thumbnails) => Some(ArtFetcher::new(
      Arc::new(thumbnails),
      config.art_size,
      std::env::temp_dir(),
    )),
    Err(e) => {
      log::warn!("Cover art disabled: {}", e);
      None
    }
  };
  let art = fetcher.as_ref().map(|f| f.art()).unwrap_or_default();

  let (input_tx, input_rx) = async_channel::bounded(32);
  let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot::default());
  let dashboard = tokio::spawn(ui::run(snapshot_rx, art, input_tx));

  let engine = MpvClient::new(
    config.supervisor_config(),
    config.reconnect_attempts,
    config.reconnect_delay(),
  );
  let mut control = ControlLoop::new(
    engine,
    state,
    config.loop_policy(),
    fetcher,
    input_rx,
    snapshot_tx,
  );

  let result = match control.load_from(resolver.extract_queue(url)).await {
    Ok(()) => control.run().await.map(|phase| {
      log::info!("Control loop finished: {:?}", phase);
    }),
    Err(e) => Err(e),
  };

  match dashboard.await {
    Ok(Ok(())) => {}
    Ok(Err(e)) => {
      log::error!("Dashboard failed: {}", e);
      eprintln!("musicalterm: terminal error: {}", e);
    }
    Err(e) => log::error!("Dashboard task failed: {}", e),
  }
  result
}
